//! # Core Playback
//!
//! Playback and access control for the release player.
//!
//! ## Overview
//!
//! - [`EntitlementResolver`] decides whether the visitor is a supporter
//! - [`SourceResolver`] picks the audio URL for an item
//! - [`PlaybackEngine`] owns the single audio output and sequences source swaps
//! - [`PreviewClamp`] keeps non-supporters inside the preview window
//! - [`PlayerStore`] is the session object the UI talks to
//! - [`ActivityReporter`] sends the one "a play happened" ping
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use core_playback::{MarkerEntitlements, PlayableItem, PlayerConfig, PlayerStore};
//!
//! let store = Arc::new(PlayerStore::new(
//!     PlayerConfig::try_from(&core_config)?,
//!     core_config.audio_output.clone(),
//!     Arc::new(MarkerEntitlements::new(core_config.marker_store.clone())),
//!     event_bus,
//! ));
//! store.spawn_event_pump();
//!
//! let session = store.play(PlayableItem::new("polygamy", "Polygamy", "Caliph")).await;
//! ```

pub mod activity;
pub mod config;
pub mod engine;
pub mod entitlement;
pub mod error;
pub mod preview;
pub mod source;
pub mod store;
pub mod types;

pub use activity::ActivityReporter;
pub use config::PlayerConfig;
pub use engine::{PlayOutcome, PlayRequest, PlaybackEngine, ToggleOutcome};
pub use entitlement::{
    item_supporter_marker, EntitlementResolver, MarkerEntitlements, GLOBAL_SUPPORTER_MARKER,
};
pub use error::{PlaybackError, Result};
pub use preview::{ClampAction, PreviewClamp};
pub use source::SourceResolver;
pub use store::PlayerStore;
pub use types::{PlayableItem, PlaybackSession, PreviewWindow};
