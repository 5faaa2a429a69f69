//! # Email Subscriptions
//!
//! Sign-ups from the landing form and the campaign magic link. Addresses are
//! trimmed and lowercased before validation; a repeat sign-up is a success
//! with status [`SubscribeStatus::Exists`].

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::storage::ONE_YEAR;
use bridge_traits::time::Clock;
use core_runtime::events::{CoreEvent, EventBus, FunnelEvent};
use core_runtime::logging::redact_email;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use sqlx::{query, query_as, SqlitePool};
use tracing::{info, warn};

use crate::error::{FunnelError, Result};
use crate::visitor::{Destination, Visitor};

static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email regex must compile"));

pub const DEFAULT_SOURCE: &str = "site";
pub const MAGIC_LINK_SOURCE: &str = "magic_link";
pub const CHECKOUT_SOURCE: &str = "checkout";
const MAX_SOURCE_CHARS: usize = 64;

/// Markers set by the magic link.
pub const GATE_MARKER: &str = "gate";
pub const GATE_EMAIL_MARKER: &str = "gate_email";

/// Trim, lowercase and validate an address.
pub fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    EMAIL_REGEX.is_match(&email).then_some(email)
}

pub fn normalize_source(raw: Option<&str>) -> String {
    match raw.filter(|s| !s.is_empty()) {
        Some(source) => source.chars().take(MAX_SOURCE_CHARS).collect(),
        None => DEFAULT_SOURCE.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscribeStatus {
    New,
    Exists,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub source: String,
    /// Unix milliseconds.
    pub created_at: i64,
}

#[async_trait]
pub trait EmailRepository: Send + Sync {
    async fn find(&self, email: &str) -> Result<Option<Subscriber>>;

    /// Insert a new address. Returns `false` if it already exists.
    async fn insert(&self, email: &str, source: &str) -> Result<bool>;

    /// Insert or overwrite the source of an existing address.
    async fn upsert(&self, email: &str, source: &str) -> Result<Subscriber>;

    async fn count(&self) -> Result<i64>;
}

pub struct SqliteEmailRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteEmailRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl EmailRepository for SqliteEmailRepository {
    async fn find(&self, email: &str) -> Result<Option<Subscriber>> {
        let subscriber = query_as::<_, Subscriber>(
            "SELECT id, email, source, created_at FROM emails WHERE email = ? LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(subscriber)
    }

    async fn insert(&self, email: &str, source: &str) -> Result<bool> {
        let result = query(
            "INSERT INTO emails (email, source, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(email) DO NOTHING",
        )
        .bind(email)
        .bind(source)
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn upsert(&self, email: &str, source: &str) -> Result<Subscriber> {
        let subscriber = query_as::<_, Subscriber>(
            "INSERT INTO emails (email, source, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(email) DO UPDATE SET source = excluded.source \
             RETURNING id, email, source, created_at",
        )
        .bind(email)
        .bind(source)
        .bind(self.clock.unix_timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(subscriber)
    }

    async fn count(&self) -> Result<i64> {
        let (count,): (i64,) = query_as("SELECT COUNT(*) FROM emails")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

pub struct SubscriptionService {
    emails: Arc<dyn EmailRepository>,
    events: EventBus,
}

impl SubscriptionService {
    pub fn new(emails: Arc<dyn EmailRepository>, events: EventBus) -> Self {
        Self { emails, events }
    }

    pub async fn subscribe(&self, raw_email: &str, source: Option<&str>) -> Result<SubscribeStatus> {
        let email = normalize_email(raw_email).ok_or(FunnelError::InvalidEmail)?;
        let source = normalize_source(source);

        let status = if self.emails.find(&email).await?.is_some() {
            SubscribeStatus::Exists
        } else if self.emails.insert(&email, &source).await? {
            SubscribeStatus::New
        } else {
            // Lost an insert race.
            SubscribeStatus::Exists
        };

        info!(email = %redact_email(&email), %source, ?status, "Subscription recorded");
        let _ = self.events.emit(CoreEvent::Funnel(FunnelEvent::Subscribed {
            source,
            is_new: status == SubscribeStatus::New,
        }));
        Ok(status)
    }

    pub async fn is_subscribed(&self, raw_email: &str) -> Result<bool> {
        match normalize_email(raw_email) {
            Some(email) => Ok(self.emails.find(&email).await?.is_some()),
            None => Ok(false),
        }
    }

    /// Campaign link: store the address and open the gate for this visitor.
    ///
    /// Any failure sends the visitor back to the landing gate.
    pub async fn redeem_magic_link(&self, raw_email: Option<&str>, visitor: &Visitor) -> Destination {
        let Some(email) = raw_email.and_then(normalize_email) else {
            return Destination::Landing;
        };

        if let Err(e) = self.emails.upsert(&email, MAGIC_LINK_SOURCE).await {
            warn!(email = %redact_email(&email), error = %e, "Magic link upsert failed");
            return Destination::Landing;
        }

        let opened = async {
            visitor.set(GATE_MARKER, "1", ONE_YEAR).await?;
            visitor.set(GATE_EMAIL_MARKER, &email, ONE_YEAR).await
        };
        if let Err(e) = opened.await {
            warn!(error = %e, "Could not persist gate markers");
            return Destination::Landing;
        }

        info!(email = %redact_email(&email), "Magic link redeemed");
        Destination::Releases
    }
}
