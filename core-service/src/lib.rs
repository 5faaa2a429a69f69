//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridges (audio output, marker store, HTTP,
//! payment gateway) into the player and the funnel services. It owns the one
//! [`PlayerStore`] of the process; every surface of the host shares it through
//! [`CoreService::player`].
//!
//! Desktop hosts typically enable the `desktop-shims` feature and call
//! [`bootstrap_desktop`].

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::time::{Clock, SystemClock};
use core_funnel::{
    create_pool, ActivityFeed, Catalog, CheckoutService, DatabaseConfig, DownloadService,
    FunnelError,
    SqliteActivityRepository, SqliteContributionRepository, SqliteEmailRepository,
    SubscriptionService, Visitor, VisitorGate,
};
use core_playback::{
    ActivityReporter, MarkerEntitlements, PlaybackSession, PlayerConfig, PlayerStore,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, DEFAULT_EVENT_BUFFER_SIZE};
use sqlx::SqlitePool;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Primary façade exposed to host applications.
pub struct CoreService {
    config: CoreConfig,
    events: EventBus,
    catalog: Arc<Catalog>,
    player: Arc<PlayerStore>,
    pump: JoinHandle<()>,
    pool: SqlitePool,
    subscriptions: SubscriptionService,
    feed: Arc<ActivityFeed>,
    gate: VisitorGate,
    checkout: Option<CheckoutService>,
    downloads: Option<DownloadService>,
}

impl CoreService {
    /// Build the service with the built-in catalog.
    ///
    /// Must be called from within a Tokio runtime.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        Self::with_catalog(config, Catalog::default()).await
    }

    pub async fn with_catalog(config: CoreConfig, catalog: Catalog) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let events = EventBus::new(DEFAULT_EVENT_BUFFER_SIZE);
        let catalog = Arc::new(catalog);

        let player_config = PlayerConfig::try_from(&config)?
            .with_fallback_item(catalog.default_song().to_playable());
        player_config
            .validate()
            .map_err(core_playback::PlaybackError::InvalidConfig)?;

        let reporter = match (
            config.features.enable_activity_logging,
            &config.activity_endpoint,
            &config.http_client,
        ) {
            (true, Some(endpoint), Some(http)) => {
                ActivityReporter::new(http.clone(), endpoint.clone(), player_config.activity_timeout)
            }
            _ => ActivityReporter::disabled(),
        };

        let player = Arc::new(
            PlayerStore::new(
                player_config,
                config.audio_output.clone(),
                Arc::new(MarkerEntitlements::new(config.marker_store.clone())),
                events.clone(),
            )
            .with_activity_reporter(reporter),
        );
        let pump = player.spawn_event_pump();

        let emails = Arc::new(SqliteEmailRepository::new(pool.clone(), clock.clone()));
        let contributions = Arc::new(SqliteContributionRepository::new(
            pool.clone(),
            clock.clone(),
        ));
        let activity = Arc::new(SqliteActivityRepository::new(pool.clone(), clock));

        let feed = Arc::new(ActivityFeed::new(activity, catalog.clone(), events.clone()));
        let subscriptions = SubscriptionService::new(emails.clone(), events.clone());
        let gate = VisitorGate::new(catalog.clone(), emails.clone(), contributions.clone());

        let checkout = match (&config.payment_gateway, config.features.enable_checkout) {
            (Some(gateway), true) => Some(CheckoutService::new(
                gateway.clone(),
                catalog.clone(),
                emails,
                contributions,
                feed.clone(),
                config.site_origin.clone(),
                events.clone(),
            )),
            (Some(_), false) => {
                warn!("Payment gateway provided but checkout is disabled");
                None
            }
            _ => None,
        };

        let downloads = config.http_client.as_ref().map(|http| {
            DownloadService::new(http.clone(), catalog.clone(), config.site_origin.clone())
        });

        info!(
            site_origin = %config.site_origin,
            songs = catalog.songs().count(),
            checkout = checkout.is_some(),
            downloads = downloads.is_some(),
            "Core service ready"
        );

        Ok(Self {
            config,
            events,
            catalog,
            player,
            pump,
            pool,
            subscriptions,
            feed,
            gate,
            checkout,
            downloads,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// The process-wide player.
    pub fn player(&self) -> Arc<PlayerStore> {
        Arc::clone(&self.player)
    }

    /// The visitor backed by the configured marker store. Servers build
    /// request-scoped visitors with [`Visitor::new`] instead.
    pub fn visitor(&self) -> Visitor {
        Visitor::new(self.config.marker_store.clone())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn subscriptions(&self) -> &SubscriptionService {
        &self.subscriptions
    }

    pub fn feed(&self) -> &ActivityFeed {
        &self.feed
    }

    pub fn gate(&self) -> &VisitorGate {
        &self.gate
    }

    pub fn checkout(&self) -> Result<&CheckoutService> {
        self.checkout.as_ref().ok_or_else(|| CoreError::CapabilityMissing {
            capability: "PaymentGateway".to_string(),
            message: "Checkout needs a PaymentGateway and the checkout feature enabled."
                .to_string(),
        })
    }

    pub fn downloads(&self) -> Result<&DownloadService> {
        self.downloads.as_ref().ok_or_else(|| CoreError::CapabilityMissing {
            capability: "HttpClient".to_string(),
            message: "Downloads fetch the audio file through an HttpClient.".to_string(),
        })
    }

    /// Play a catalog song by slug.
    pub async fn play_song(&self, slug: &str) -> Result<PlaybackSession> {
        let item = self
            .catalog
            .to_playable(slug)
            .ok_or_else(|| FunnelError::UnknownSong(slug.to_string()))?;
        Ok(self.player.play(item).await)
    }
}

impl Drop for CoreService {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

/// Build a service from the environment with desktop adapters.
///
/// Markers persist in a SQLite file at `markers_path`.
///
/// ```no_run
/// # async fn example() -> core_service::Result<()> {
/// let core = core_service::bootstrap_desktop("markers.db").await?;
/// core.play_song("polygamy").await?;
/// # Ok(())
/// # }
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(markers_path: impl Into<std::path::PathBuf>) -> Result<CoreService> {
    use bridge_desktop::SqliteMarkerStore;
    use core_runtime::config::CoreConfigBuilder;

    let markers = SqliteMarkerStore::new(markers_path.into()).await?;
    let config = CoreConfigBuilder::from_env()?
        .marker_store(Arc::new(markers))
        .build()?;
    CoreService::new(config).await
}
