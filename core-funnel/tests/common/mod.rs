//! Shared fixtures for the funnel integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use bridge_desktop::MemoryMarkerStore;
use bridge_traits::payment::PaymentGateway;
use bridge_traits::time::{Clock, SystemClock};
use core_funnel::{
    create_test_pool, ActivityFeed, Catalog, CheckoutService, ReleaseStatus, SongMeta,
    SqliteActivityRepository, SqliteContributionRepository, SqliteEmailRepository,
    SubscriptionService, Visitor, VisitorGate,
};
use core_runtime::events::{CoreEvent, EventBus};
use sqlx::SqlitePool;
use tokio::sync::broadcast;

pub const SITE_ORIGIN: &str = "https://caliph.example";

fn song(slug: &str, title: &str, status: ReleaseStatus) -> SongMeta {
    SongMeta {
        slug: slug.to_string(),
        title: title.to_string(),
        artist: "Caliph".to_string(),
        cover: format!("/{slug}-cover.png"),
        audio_url: format!("/audio/{slug}-full.mp3"),
        status,
    }
}

pub fn catalog() -> Catalog {
    Catalog::new(
        vec![
            song("polygamy", "Polygamy (Prod. By Caliph)", ReleaseStatus::Live),
            song("paradise", "Paradise", ReleaseStatus::Upcoming),
        ],
        "polygamy",
    )
    .unwrap()
}

pub struct Funnel {
    pub pool: SqlitePool,
    pub bus: EventBus,
    pub catalog: Arc<Catalog>,
    pub emails: Arc<SqliteEmailRepository>,
    pub contributions: Arc<SqliteContributionRepository>,
    pub feed: Arc<ActivityFeed>,
    pub subscriptions: SubscriptionService,
    pub gate: VisitorGate,
}

impl Funnel {
    pub async fn new() -> Self {
        let pool = create_test_pool().await.unwrap();
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let bus = EventBus::new(64);
        let catalog = Arc::new(catalog());

        let emails = Arc::new(SqliteEmailRepository::new(pool.clone(), clock.clone()));
        let contributions = Arc::new(SqliteContributionRepository::new(pool.clone(), clock.clone()));
        let activity = Arc::new(SqliteActivityRepository::new(pool.clone(), clock));

        let feed = Arc::new(ActivityFeed::new(activity, catalog.clone(), bus.clone()));
        let subscriptions = SubscriptionService::new(emails.clone(), bus.clone());
        let gate = VisitorGate::new(catalog.clone(), emails.clone(), contributions.clone());

        Self {
            pool,
            bus,
            catalog,
            emails,
            contributions,
            feed,
            subscriptions,
            gate,
        }
    }

    pub fn checkout(&self, gateway: impl PaymentGateway + 'static) -> CheckoutService {
        CheckoutService::new(
            Arc::new(gateway),
            self.catalog.clone(),
            self.emails.clone(),
            self.contributions.clone(),
            self.feed.clone(),
            SITE_ORIGIN,
            self.bus.clone(),
        )
    }
}

/// A visitor with an empty marker jar.
pub fn visitor() -> (Visitor, Arc<MemoryMarkerStore>) {
    let markers = Arc::new(MemoryMarkerStore::new());
    (Visitor::new(markers.clone()), markers)
}

pub fn drain(rx: &mut broadcast::Receiver<CoreEvent>) -> Vec<CoreEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
