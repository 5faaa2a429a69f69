//! # Host Bridge Traits
//!
//! Capabilities the release-funnel core needs from its host but cannot
//! implement portably.
//!
//! ## Traits
//!
//! - [`AudioOutput`](audio::AudioOutput) - The single audio output handle
//! - [`MarkerStore`](storage::MarkerStore) - Expiring named markers (entitlement, gate, de-dup)
//! - [`HttpClient`](http::HttpClient) - Async HTTP for activity pings
//! - [`PaymentGateway`](payment::PaymentGateway) - Hosted checkout sessions
//! - [`Clock`](time::Clock) - Wall-clock source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! let gateway = config.payment_gateway.clone().ok_or_else(|| Error::CapabilityMissing {
//!     capability: "PaymentGateway".to_string(),
//!     message: "Inject a processor adapter to enable checkout.".to_string(),
//! })?;
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Audio outputs
//! report rejected `play()` calls as `Aborted` or `NotAllowed` so the core can
//! tell them apart from hard failures.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod audio;
pub mod error;
pub mod http;
pub mod payment;
pub mod storage;
pub mod time;

pub use error::BridgeError;

pub use audio::{AudioOutput, OutputEvent, OutputNotice};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use payment::{CheckoutSession, CheckoutSessionRequest, LineItem, PaymentGateway, PaymentStatus};
pub use storage::{is_truthy, MarkerStore, ONE_YEAR};
pub use time::{Clock, ConsoleLogger, LogEntry, LogLevel, LoggerSink, ManualClock, SystemClock};
