//! Marker storage abstraction.
//!
//! Entitlement, gate and de-duplication state is kept as small named markers
//! with an expiry, the way a browser keeps cookies. Hosts choose the backing:
//! request/response cookie jars on a server, SQLite on desktop, or the
//! in-memory store for tests.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// One year, the lifetime used for entitlement and gate markers.
pub const ONE_YEAR: Duration = Duration::from_secs(60 * 60 * 24 * 365);

/// Whether a raw marker value counts as "set" for presence checks.
///
/// Any non-empty value other than `"0"` is truthy.
pub fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "0")
}

/// Named marker persistence.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::{MarkerStore, ONE_YEAR};
///
/// async fn unlock(store: &dyn MarkerStore) -> Result<()> {
///     store.set("supporter", "1", ONE_YEAR).await
/// }
/// ```
#[async_trait]
pub trait MarkerStore: Send + Sync {
    /// Read a marker. Expired markers read as `None`.
    async fn get(&self, name: &str) -> Result<Option<String>>;

    /// Write a marker that expires after `max_age`.
    async fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<()>;

    async fn remove(&self, name: &str) -> Result<()>;

    /// `true` when the marker holds exactly `"1"`.
    async fn is_flag_set(&self, name: &str) -> Result<bool> {
        Ok(self.get(name).await?.as_deref() == Some("1"))
    }
}
