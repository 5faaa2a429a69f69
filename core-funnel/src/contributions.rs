//! Paid contributions, one row per checkout session.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::time::Clock;
use sqlx::{query, query_as, SqlitePool};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContribution {
    pub email: String,
    pub amount_cents: i64,
    /// ISO code, uppercase.
    pub currency: String,
    pub checkout_session_id: String,
    pub price_id: Option<String>,
    pub song_slug: Option<String>,
}

#[async_trait]
pub trait ContributionRepository: Send + Sync {
    /// Returns `false` when the session was already recorded.
    async fn record(&self, contribution: &NewContribution) -> Result<bool>;

    async fn exists_for_email(&self, email: &str) -> Result<bool>;
}

pub struct SqliteContributionRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteContributionRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl ContributionRepository for SqliteContributionRepository {
    async fn record(&self, contribution: &NewContribution) -> Result<bool> {
        let result = query(
            r#"
            INSERT INTO contributions
                (email, amount_cents, currency, checkout_session_id, price_id, song_slug, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(checkout_session_id) DO NOTHING
            "#,
        )
        .bind(&contribution.email)
        .bind(contribution.amount_cents)
        .bind(&contribution.currency)
        .bind(&contribution.checkout_session_id)
        .bind(&contribution.price_id)
        .bind(&contribution.song_slug)
        .bind(self.clock.unix_timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn exists_for_email(&self, email: &str) -> Result<bool> {
        let row: Option<(i64,)> = query_as("SELECT id FROM contributions WHERE email = ? LIMIT 1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}
