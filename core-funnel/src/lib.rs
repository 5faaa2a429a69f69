//! # Core Funnel
//!
//! Server-side services of the release funnel: the song catalog, email
//! capture, the public activity feed, checkout, the visitor gate and file
//! downloads for supporters.
//!
//! Services that read or write per-visitor state take a [`Visitor`], so a web
//! host can hand in a request-scoped cookie jar while a desktop host passes
//! its single marker store.
//!
//! Persistence is SQLite through `sqlx`; schema lives in `migrations/`.

pub mod activity_feed;
pub mod catalog;
pub mod checkout;
pub mod contributions;
pub mod db;
pub mod downloads;
pub mod error;
pub mod gate;
pub mod subscribers;
pub mod visitor;

pub use activity_feed::{
    ActivityFeed, ActivityKind, ActivityRecord, ActivityRepository, FeedItem, GeoHint,
    PlayLogOutcome, SqliteActivityRepository,
};
pub use catalog::{Catalog, ReleaseStatus, SongMeta, DEFAULT_SLUG};
pub use checkout::{CheckoutRequest, CheckoutService};
pub use contributions::{ContributionRepository, NewContribution, SqliteContributionRepository};
pub use db::{create_pool, create_test_pool, DatabaseConfig};
pub use downloads::{Download, DownloadFile, DownloadService};
pub use error::{FunnelError, Result};
pub use gate::{DownloadAccess, ReleaseAccess, VisitorGate};
pub use subscribers::{
    EmailRepository, SqliteEmailRepository, SubscribeStatus, Subscriber, SubscriptionService,
};
pub use visitor::{Destination, Visitor};
