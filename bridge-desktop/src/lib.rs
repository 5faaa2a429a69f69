//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for native hosts
//! (macOS, Windows, Linux, server processes).
//!
//! - `HttpClient` using `reqwest`
//! - `MarkerStore` in memory or on SQLite via `sqlx`
//! - `AudioOutput` as a clock-driven headless output
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_desktop::{HeadlessAudioOutput, MemoryMarkerStore, ReqwestHttpClient};
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! let markers = Arc::new(MemoryMarkerStore::new());
//! let output = Arc::new(HeadlessAudioOutput::new());
//! ```

mod headless;
mod http;
mod markers;

pub use headless::{HeadlessAudioOutput, HeadlessTrack};
pub use http::ReqwestHttpClient;
pub use markers::{MemoryMarkerStore, SqliteMarkerStore};
