//! A visitor's persisted markers and the places the funnel sends them.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::storage::{is_truthy, MarkerStore};
use core_playback::{EntitlementResolver, MarkerEntitlements};
use core_runtime::events::GrantScope;
use tracing::warn;

use crate::error::Result;

/// Where to send the visitor next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// The email gate at `/`.
    Landing,
    Home,
    Releases,
    Buy,
    BuySong(String),
    Download,
    /// Hosted checkout page.
    External(String),
}

impl Destination {
    pub fn path(&self) -> String {
        match self {
            Destination::Landing => "/".to_string(),
            Destination::Home => "/home".to_string(),
            Destination::Releases => "/releases".to_string(),
            Destination::Buy => "/buy".to_string(),
            Destination::BuySong(slug) => format!("/buy/{}", urlencoding::encode(slug)),
            Destination::Download => "/download".to_string(),
            Destination::External(url) => url.clone(),
        }
    }
}

/// Marker jar of one visitor (a cookie jar on a server, the app's store on
/// desktop).
#[derive(Clone)]
pub struct Visitor {
    markers: Arc<dyn MarkerStore>,
    entitlements: MarkerEntitlements,
}

impl Visitor {
    pub fn new(markers: Arc<dyn MarkerStore>) -> Self {
        Self {
            entitlements: MarkerEntitlements::new(markers.clone()),
            markers,
        }
    }

    pub fn markers(&self) -> &Arc<dyn MarkerStore> {
        &self.markers
    }

    pub async fn is_supporter(&self, slug: Option<&str>) -> bool {
        self.entitlements.is_supporter(slug).await
    }

    pub async fn grant(&self, scope: &GrantScope) -> Result<()> {
        self.entitlements.grant(scope).await?;
        Ok(())
    }

    /// Raw marker value; unreadable markers read as absent.
    pub async fn value(&self, name: &str) -> Option<String> {
        match self.markers.get(name).await {
            Ok(value) => value,
            Err(e) => {
                warn!(marker = name, error = %e, "Marker unreadable");
                None
            }
        }
    }

    /// `true` when the marker holds exactly `"1"`.
    pub async fn flag(&self, name: &str) -> bool {
        self.value(name).await.as_deref() == Some("1")
    }

    /// `true` for any non-empty value other than `"0"`.
    pub async fn is_present(&self, name: &str) -> bool {
        is_truthy(self.value(name).await.as_deref())
    }

    pub async fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<()> {
        self.markers.set(name, value, max_age).await?;
        Ok(())
    }
}
