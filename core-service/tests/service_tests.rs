use std::sync::Arc;

use async_trait::async_trait;
use bridge_desktop::{HeadlessAudioOutput, MemoryMarkerStore};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::payment::{CheckoutSession, CheckoutSessionRequest, PaymentGateway};
use bridge_traits::storage::MarkerStore;
use core_funnel::{Download, DownloadAccess, FunnelError, SubscribeStatus};
use core_runtime::config::{CoreConfig, CoreConfigBuilder};
use core_runtime::events::{CoreEvent, FunnelEvent, GrantScope};
use core_service::{CoreError, CoreService};

mockall::mock! {
    Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn create_session(&self, request: CheckoutSessionRequest) -> BridgeResult<CheckoutSession>;
        async fn retrieve_session(&self, session_id: &str) -> BridgeResult<CheckoutSession>;
    }
}

mockall::mock! {
    Http {}

    #[async_trait]
    impl HttpClient for Http {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn execute_with_retry(&self, request: HttpRequest, policy: RetryPolicy) -> BridgeResult<HttpResponse>;
    }
}

fn builder(markers: Arc<MemoryMarkerStore>) -> CoreConfigBuilder {
    CoreConfig::builder()
        .site_origin("https://caliph.example/")
        .database_path(":memory:")
        .marker_store(markers)
        .audio_output(Arc::new(HeadlessAudioOutput::new()))
}

#[tokio::test]
async fn plays_catalog_songs_through_the_shared_player() {
    let core = CoreService::new(builder(Arc::new(MemoryMarkerStore::new())).build().unwrap())
        .await
        .unwrap();

    let session = core.play_song("Polygamy").await.unwrap();
    assert_eq!(session.current_item_id(), Some("polygamy"));
    assert!(session.is_playing);
    assert!(session.is_mini_player_visible);

    // Every handle observes the same session.
    assert_eq!(core.player().snapshot().current_item_id(), Some("polygamy"));
    assert_eq!(core.player().subscribe().borrow().current_item_id(), Some("polygamy"));

    let err = core.play_song("bootleg").await.unwrap_err();
    assert!(matches!(err, CoreError::Funnel(FunnelError::UnknownSong(_))));
}

#[tokio::test]
async fn checkout_requires_a_gateway() {
    let core = CoreService::new(builder(Arc::new(MemoryMarkerStore::new())).build().unwrap())
        .await
        .unwrap();

    assert!(matches!(
        core.checkout(),
        Err(CoreError::CapabilityMissing { .. })
    ));
}

#[tokio::test]
async fn checkout_available_when_enabled() {
    let config = builder(Arc::new(MemoryMarkerStore::new()))
        .payment_gateway(Arc::new(MockGateway::new()))
        .enable_checkout(true)
        .build()
        .unwrap();
    let core = CoreService::new(config).await.unwrap();

    assert!(core.checkout().is_ok());
}

#[tokio::test]
async fn funnel_and_player_share_marker_store() {
    let markers = Arc::new(MemoryMarkerStore::new());
    let core = CoreService::new(builder(markers.clone()).build().unwrap())
        .await
        .unwrap();
    let visitor = core.visitor();

    assert_eq!(
        core.gate().download_access(Some("polygamy"), &visitor).await.unwrap(),
        DownloadAccess::RedirectToBuy(core_funnel::Destination::BuySong("polygamy".into()))
    );

    visitor
        .grant(&GrantScope::Item("polygamy".to_string()))
        .await
        .unwrap();

    assert!(markers.is_flag_set("supporter_polygamy").await.unwrap());
    assert_eq!(
        core.gate().download_access(Some("polygamy"), &visitor).await.unwrap(),
        DownloadAccess::Allowed
    );
}

#[tokio::test]
async fn funnel_events_arrive_on_the_service_bus() {
    let core = CoreService::new(builder(Arc::new(MemoryMarkerStore::new())).build().unwrap())
        .await
        .unwrap();
    let mut rx = core.events().subscribe();

    let status = core
        .subscriptions()
        .subscribe("fan@example.com", Some("desktop"))
        .await
        .unwrap();

    assert_eq!(status, SubscribeStatus::New);
    assert_eq!(
        rx.recv().await.unwrap(),
        CoreEvent::Funnel(FunnelEvent::Subscribed {
            source: "desktop".to_string(),
            is_new: true,
        })
    );
}

#[tokio::test]
async fn supporters_download_through_the_configured_client() {
    let mut http = MockHttp::new();
    http.expect_execute()
        .withf(|request| request.url == "https://caliph.example/audio/polygamy-full.mp3")
        .times(1)
        .returning(|_| {
            Ok(HttpResponse {
                status: 200,
                headers: Default::default(),
                body: "ID3".into(),
            })
        });
    let config = builder(Arc::new(MemoryMarkerStore::new()))
        .http_client(Arc::new(http))
        .build()
        .unwrap();
    let core = CoreService::new(config).await.unwrap();
    let visitor = core.visitor();
    visitor.grant(&GrantScope::Global).await.unwrap();

    let download = core
        .downloads()
        .unwrap()
        .download(Some("polygamy"), &visitor)
        .await
        .unwrap();

    let Download::File(file) = download else {
        panic!("expected a file");
    };
    assert_eq!(file.filename, "Caliph-Polygamy.mp3");
    assert_eq!(file.content_type, "audio/mpeg");
}
