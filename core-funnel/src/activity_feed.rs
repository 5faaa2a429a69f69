//! # Activity Feed
//!
//! Public "someone listened / someone bought" feed plus the server side of
//! the play ping. Plays are de-duplicated per visitor with a short-lived
//! `played_<slug>` marker.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::time::Clock;
use chrono::{DateTime, Utc};
use core_runtime::events::{CoreEvent, EventBus, FunnelEvent};
use serde::{Deserialize, Serialize};
use sqlx::{query_as, SqlitePool};
use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::error::{FunnelError, Result};
use crate::visitor::Visitor;

pub const FEED_LIMIT: i64 = 100;

/// How long a logged play suppresses further plays of the same song.
pub const PLAY_DEDUP_WINDOW: Duration = Duration::from_secs(6 * 60 * 60);

pub fn played_marker(slug: &str) -> String {
    format!("played_{slug}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Play,
    Purchase,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Play => "play",
            ActivityKind::Purchase => "purchase",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = FunnelError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "play" => Ok(ActivityKind::Play),
            "purchase" => Ok(ActivityKind::Purchase),
            other => Err(FunnelError::CorruptRow(format!("unknown activity kind '{other}'"))),
        }
    }
}

/// Best-effort location of the visitor, as reported by the edge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoHint {
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
}

impl GeoHint {
    /// Build from raw (possibly percent-encoded) header values.
    pub fn from_headers(city: Option<&str>, region: Option<&str>, country: Option<&str>) -> Self {
        Self {
            city: safe_decode(city),
            region: safe_decode(region),
            country: safe_decode(country),
        }
    }
}

/// Percent-decode, keeping the raw value when it is not valid encoding.
pub fn safe_decode(raw: Option<&str>) -> Option<String> {
    let raw = raw.filter(|v| !v.is_empty())?;
    Some(
        urlencoding::decode(raw)
            .map(|decoded| decoded.into_owned())
            .unwrap_or_else(|_| raw.to_string()),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewActivity {
    pub kind: ActivityKind,
    pub song_slug: Option<String>,
    pub amount_cents: Option<i64>,
    pub geo: GeoHint,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityRecord {
    pub id: i64,
    pub kind: ActivityKind,
    pub song_slug: Option<String>,
    pub amount_cents: Option<i64>,
    pub geo: GeoHint,
    pub created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct ActivityRow {
    id: i64,
    kind: String,
    song_slug: Option<String>,
    amount_cents: Option<i64>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    created_at: i64,
}

impl TryFrom<ActivityRow> for ActivityRecord {
    type Error = FunnelError;

    fn try_from(row: ActivityRow) -> Result<Self> {
        let created_at = DateTime::<Utc>::from_timestamp_millis(row.created_at).ok_or_else(|| {
            FunnelError::CorruptRow(format!("activity {} has invalid timestamp", row.id))
        })?;
        Ok(Self {
            id: row.id,
            kind: row.kind.parse()?,
            song_slug: row.song_slug,
            amount_cents: row.amount_cents,
            geo: GeoHint {
                city: row.city,
                region: row.region,
                country: row.country,
            },
            created_at,
        })
    }
}

/// One line of the public feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedItem {
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Whole-dollar amounts print without decimals.
fn format_dollars(cents: i64) -> String {
    let dollars = cents as f64 / 100.0;
    format!("{dollars}")
}

pub fn feed_message(record: &ActivityRecord) -> String {
    match record.kind {
        ActivityKind::Purchase => format!(
            "Someone bought this song for ${}",
            format_dollars(record.amount_cents.unwrap_or(0))
        ),
        ActivityKind::Play => {
            let place: Vec<&str> = [record.geo.city.as_deref(), record.geo.region.as_deref()]
                .into_iter()
                .flatten()
                .filter(|part| !part.is_empty())
                .collect();
            if place.is_empty() {
                "Someone listened".to_string()
            } else {
                format!("Someone listened from {}", place.join(", "))
            }
        }
    }
}

#[async_trait]
pub trait ActivityRepository: Send + Sync {
    async fn insert(&self, activity: &NewActivity) -> Result<i64>;

    /// Newest first.
    async fn recent(&self, limit: i64) -> Result<Vec<ActivityRecord>>;
}

pub struct SqliteActivityRepository {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteActivityRepository {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl ActivityRepository for SqliteActivityRepository {
    async fn insert(&self, activity: &NewActivity) -> Result<i64> {
        let (id,): (i64,) = query_as(
            r#"
            INSERT INTO activity (kind, song_slug, amount_cents, city, region, country, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(activity.kind.as_str())
        .bind(&activity.song_slug)
        .bind(activity.amount_cents)
        .bind(&activity.geo.city)
        .bind(&activity.geo.region)
        .bind(&activity.geo.country)
        .bind(self.clock.unix_timestamp_millis())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<ActivityRecord>> {
        let rows = query_as::<_, ActivityRow>(
            r#"
            SELECT id, kind, song_slug, amount_cents, city, region, country, created_at
            FROM activity
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActivityRecord::try_from).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayLogOutcome {
    Logged,
    Deduplicated,
}

pub struct ActivityFeed {
    repo: Arc<dyn ActivityRepository>,
    catalog: Arc<Catalog>,
    events: EventBus,
}

impl ActivityFeed {
    pub fn new(repo: Arc<dyn ActivityRepository>, catalog: Arc<Catalog>, events: EventBus) -> Self {
        Self {
            repo,
            catalog,
            events,
        }
    }

    pub async fn feed(&self) -> Result<Vec<FeedItem>> {
        let records = self.repo.recent(FEED_LIMIT).await?;
        Ok(records
            .iter()
            .map(|record| FeedItem {
                kind: record.kind,
                message: feed_message(record),
                timestamp: record.created_at,
            })
            .collect())
    }

    /// Record one play of `raw_slug` unless this visitor logged it recently.
    pub async fn log_play(&self, raw_slug: &str, geo: GeoHint, visitor: &Visitor) -> Result<PlayLogOutcome> {
        let slug = raw_slug.trim().to_lowercase();
        let song = self
            .catalog
            .get(&slug)
            .ok_or_else(|| FunnelError::UnknownSong(slug.clone()))?;

        let marker = played_marker(&song.slug);
        if visitor.flag(&marker).await {
            debug!(slug = %song.slug, "Play already logged for this visitor");
            return Ok(PlayLogOutcome::Deduplicated);
        }

        self.repo
            .insert(&NewActivity {
                kind: ActivityKind::Play,
                song_slug: Some(song.slug.clone()),
                amount_cents: None,
                geo,
            })
            .await?;
        visitor.set(&marker, "1", PLAY_DEDUP_WINDOW).await?;

        info!(slug = %song.slug, "Play logged");
        let _ = self.events.emit(CoreEvent::Funnel(FunnelEvent::PlayLogged {
            song_slug: song.slug.clone(),
        }));
        Ok(PlayLogOutcome::Logged)
    }

    pub async fn log_purchase(&self, amount_cents: Option<i64>, song_slug: Option<&str>) -> Result<()> {
        self.repo
            .insert(&NewActivity {
                kind: ActivityKind::Purchase,
                song_slug: song_slug.map(str::to_string),
                amount_cents,
                geo: GeoHint::default(),
            })
            .await?;
        Ok(())
    }
}
