//! Marker stores: in-memory and SQLite-backed.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::MarkerStore,
    time::{Clock, SystemClock},
};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::RwLock;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use tracing::debug;

fn expiry_from(now: DateTime<Utc>, max_age: Duration) -> DateTime<Utc> {
    ChronoDuration::from_std(max_age)
        .ok()
        .and_then(|age| now.checked_add_signed(age))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[derive(Debug, Clone)]
struct StoredMarker {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local marker store. Expiry is evaluated lazily on read.
pub struct MemoryMarkerStore {
    markers: RwLock<HashMap<String, StoredMarker>>,
    clock: Arc<dyn Clock>,
}

impl MemoryMarkerStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            markers: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of markers currently held, expired ones included.
    pub fn len(&self) -> usize {
        self.markers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.read().is_empty()
    }
}

impl Default for MemoryMarkerStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarkerStore for MemoryMarkerStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut markers = self.markers.write();
        match markers.get(name) {
            Some(marker) if marker.expires_at > now => Ok(Some(marker.value.clone())),
            Some(_) => {
                markers.remove(name);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<()> {
        let expires_at = expiry_from(self.clock.now(), max_age);
        self.markers.write().insert(
            name.to_string(),
            StoredMarker {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        self.markers.write().remove(name);
        Ok(())
    }
}

const CREATE_MARKERS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS markers (
        name TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        expires_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )
"#;

/// SQLite-backed marker store for hosts that persist markers across restarts.
pub struct SqliteMarkerStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteMarkerStore {
    pub async fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(BridgeError::Io)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        let store = Self::with_pool(pool, Arc::new(SystemClock)).await?;
        debug!(path = ?db_path, "Initialized marker store");
        Ok(store)
    }

    /// In-memory database on a single connection (for testing).
    pub async fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to connect to DB: {}", e)))?;

        Self::with_pool(pool, clock).await
    }

    pub async fn with_pool(pool: SqlitePool, clock: Arc<dyn Clock>) -> Result<Self> {
        sqlx::query(CREATE_MARKERS_TABLE)
            .execute(&pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to create table: {}", e)))?;

        Ok(Self { pool, clock })
    }
}

#[async_trait]
impl MarkerStore for SqliteMarkerStore {
    async fn get(&self, name: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM markers WHERE name = ? AND expires_at > ?")
            .bind(name)
            .bind(self.clock.unix_timestamp_millis())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to read marker: {}", e)))?;

        Ok(row.map(|row| row.get::<String, _>(0)))
    }

    async fn set(&self, name: &str, value: &str, max_age: Duration) -> Result<()> {
        let now = self.clock.now();
        let expires_at = expiry_from(now, max_age).timestamp_millis();

        sqlx::query(
            r#"
            INSERT INTO markers (name, value, expires_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(value)
        .bind(expires_at)
        .bind(now.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::DatabaseError(format!("Failed to write marker: {}", e)))?;

        debug!(marker = name, "Stored marker");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM markers WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| BridgeError::DatabaseError(format!("Failed to delete marker: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::time::ManualClock;
    use chrono::TimeZone;

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        ))
    }

    #[tokio::test]
    async fn memory_marker_expires_after_max_age() {
        let clock = clock();
        let store = MemoryMarkerStore::with_clock(clock.clone());

        store
            .set("played_polygamy", "1", Duration::from_secs(6 * 3600))
            .await
            .unwrap();
        assert!(store.is_flag_set("played_polygamy").await.unwrap());

        clock.advance(Duration::from_secs(6 * 3600));
        assert_eq!(store.get("played_polygamy").await.unwrap(), None);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn memory_marker_overwrite_and_remove() {
        let store = MemoryMarkerStore::new();
        store.set("gate_email", "a@b.co", Duration::from_secs(60)).await.unwrap();
        store.set("gate_email", "c@d.co", Duration::from_secs(60)).await.unwrap();
        assert_eq!(store.get("gate_email").await.unwrap().as_deref(), Some("c@d.co"));

        store.remove("gate_email").await.unwrap();
        assert_eq!(store.get("gate_email").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sqlite_marker_roundtrip_respects_expiry() {
        let clock = clock();
        let store = SqliteMarkerStore::in_memory(clock.clone()).await.unwrap();

        store.set("supporter", "1", Duration::from_secs(60)).await.unwrap();
        assert!(store.is_flag_set("supporter").await.unwrap());

        clock.advance(Duration::from_secs(61));
        assert!(!store.is_flag_set("supporter").await.unwrap());
    }

    #[tokio::test]
    async fn sqlite_marker_remove() {
        let store = SqliteMarkerStore::in_memory(clock()).await.unwrap();
        store.set("gate", "1", Duration::from_secs(60)).await.unwrap();
        store.remove("gate").await.unwrap();
        assert_eq!(store.get("gate").await.unwrap(), None);
    }
}
