//! Supporter entitlement resolution.
//!
//! A visitor is a supporter when either the item-scoped marker
//! (`supporter_<id>`) or the global `supporter` marker holds `"1"`. Nothing
//! here ever fails: an unreadable store means "not a supporter".

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::storage::{MarkerStore, ONE_YEAR};
use core_runtime::events::GrantScope;
use tracing::{debug, info, warn};

use crate::error::Result;

/// Name of the global entitlement marker.
pub const GLOBAL_SUPPORTER_MARKER: &str = "supporter";

/// Name of the marker unlocking a single item.
pub fn item_supporter_marker(item_id: &str) -> String {
    format!("supporter_{item_id}")
}

/// Answers "may this visitor hear the full track?".
#[async_trait]
pub trait EntitlementResolver: Send + Sync {
    async fn is_supporter(&self, item_id: Option<&str>) -> bool;
}

/// [`EntitlementResolver`] backed by a [`MarkerStore`].
#[derive(Clone)]
pub struct MarkerEntitlements {
    store: Arc<dyn MarkerStore>,
}

impl MarkerEntitlements {
    pub fn new(store: Arc<dyn MarkerStore>) -> Self {
        Self { store }
    }

    /// Persist a supporter marker for one year.
    pub async fn grant(&self, scope: &GrantScope) -> Result<()> {
        let name = match scope {
            GrantScope::Global => GLOBAL_SUPPORTER_MARKER.to_string(),
            GrantScope::Item(item_id) => item_supporter_marker(item_id),
        };
        self.store.set(&name, "1", ONE_YEAR).await?;
        info!(marker = %name, "Supporter marker granted");
        Ok(())
    }

    async fn flag(&self, name: &str) -> bool {
        match self.store.is_flag_set(name).await {
            Ok(set) => set,
            Err(e) => {
                warn!(marker = name, error = %e, "Entitlement marker unreadable; treating as not set");
                false
            }
        }
    }
}

#[async_trait]
impl EntitlementResolver for MarkerEntitlements {
    async fn is_supporter(&self, item_id: Option<&str>) -> bool {
        if let Some(item_id) = item_id.filter(|id| !id.is_empty()) {
            if self.flag(&item_supporter_marker(item_id)).await {
                debug!(item_id, "Item-scoped supporter marker present");
                return true;
            }
        }
        self.flag(GLOBAL_SUPPORTER_MARKER).await
    }
}
