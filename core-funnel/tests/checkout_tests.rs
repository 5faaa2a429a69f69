//! Checkout against a mocked payment gateway.

mod common;

use std::collections::HashMap;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::payment::{
    CheckoutSession, CheckoutSessionRequest, LineItem, PaymentGateway, PaymentStatus,
};
use bridge_traits::storage::MarkerStore;
use common::{drain, visitor, Funnel, SITE_ORIGIN};
use core_funnel::contributions::ContributionRepository;
use core_funnel::subscribers::EmailRepository;
use core_funnel::{CheckoutRequest, Destination, FunnelError};
use core_runtime::events::{CoreEvent, FunnelEvent, GrantScope};

mockall::mock! {
    Gateway {}

    #[async_trait]
    impl PaymentGateway for Gateway {
        async fn create_session(&self, request: CheckoutSessionRequest) -> BridgeResult<CheckoutSession>;
        async fn retrieve_session(&self, session_id: &str) -> BridgeResult<CheckoutSession>;
    }
}

fn session(id: &str, status: PaymentStatus) -> CheckoutSession {
    CheckoutSession {
        id: id.to_string(),
        url: Some(format!("https://pay.example/{id}")),
        payment_status: status,
        customer_email: Some("Fan@Example.com".to_string()),
        amount_total_cents: Some(1500),
        currency: Some("usd".to_string()),
        price_id: None,
        metadata: HashMap::from([("song_slug".to_string(), "polygamy".to_string())]),
    }
}

#[tokio::test]
async fn custom_amount_opens_session_with_return_urls() {
    let funnel = Funnel::new().await;
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_session()
        .withf(|request| {
            request.success_url
                == format!("{SITE_ORIGIN}/api/checkout/success?session_id={{CHECKOUT_SESSION_ID}}&song=polygamy")
                && request.cancel_url == format!("{SITE_ORIGIN}/buy/polygamy")
                && request.line_item
                    == LineItem::Custom {
                        amount_cents: 1235,
                        currency: "usd".to_string(),
                        product_name: "Support Contribution".to_string(),
                    }
                && request.metadata.get("kind").map(String::as_str) == Some("custom")
                && request.metadata.get("source").map(String::as_str) == Some("buy-page")
                && request.customer_email.as_deref() == Some("fan@example.com")
        })
        .times(1)
        .returning(|_| Ok(session("cs_new", PaymentStatus::Unpaid)));

    let checkout = funnel.checkout(gateway);
    let destination = checkout
        .begin(CheckoutRequest {
            song: Some("POLYGAMY".to_string()),
            amount_dollars: Some(12.345),
            email: Some("fan@example.com".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(
        destination,
        Destination::External("https://pay.example/cs_new".to_string())
    );
}

#[tokio::test]
async fn preset_price_wins_and_unknown_song_uses_default() {
    let funnel = Funnel::new().await;
    let mut gateway = MockGateway::new();
    gateway
        .expect_create_session()
        .withf(|request| {
            request.line_item
                == LineItem::Preset {
                    price_id: "price_25".to_string(),
                }
                && request.metadata.get("song_slug").map(String::as_str) == Some("polygamy")
                && request.metadata.get("kind").map(String::as_str) == Some("preset")
                && request.success_url.starts_with(&format!("{SITE_ORIGIN}/thanks?"))
        })
        .times(1)
        .returning(|_| Ok(session("cs_preset", PaymentStatus::Unpaid)));

    let checkout = funnel.checkout(gateway);
    checkout
        .begin(CheckoutRequest {
            song: Some("bootleg".to_string()),
            price_id: Some("price_25".to_string()),
            amount_dollars: Some(0.5),
            return_to: Some("/thanks".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn out_of_range_amount_never_reaches_gateway() {
    let funnel = Funnel::new().await;
    let mut gateway = MockGateway::new();
    gateway.expect_create_session().never();

    let checkout = funnel.checkout(gateway);
    for amount_dollars in [None, Some(0.5), Some(100_000.5), Some(f64::NAN)] {
        let err = checkout
            .begin(CheckoutRequest {
                amount_dollars,
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(matches!(err, FunnelError::InvalidAmount(_)));
    }
}

#[tokio::test]
async fn session_without_redirect_is_an_error() {
    let funnel = Funnel::new().await;
    let mut gateway = MockGateway::new();
    gateway.expect_create_session().returning(|_| {
        let mut created = session("cs_nourl", PaymentStatus::Unpaid);
        created.url = None;
        Ok(created)
    });

    let err = funnel
        .checkout(gateway)
        .begin(CheckoutRequest {
            amount_dollars: Some(10.0),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, FunnelError::Bridge(_)));
}

#[tokio::test]
async fn paid_session_unlocks_and_records_once() {
    let funnel = Funnel::new().await;
    let mut rx = funnel.bus.subscribe();
    let mut gateway = MockGateway::new();
    gateway
        .expect_retrieve_session()
        .times(2)
        .returning(|id: &str| Ok(session(id, PaymentStatus::Paid)));

    let checkout = funnel.checkout(gateway);
    let (visitor, markers) = visitor();

    let destination = checkout
        .complete(Some("cs_paid"), Some("polygamy"), &visitor)
        .await;
    assert_eq!(destination, Destination::Download);
    assert!(markers.is_flag_set("supporter").await.unwrap());
    assert!(markers.is_flag_set("supporter_polygamy").await.unwrap());

    let buyer = funnel.emails.find("fan@example.com").await.unwrap().unwrap();
    assert_eq!(buyer.source, "checkout");
    assert!(funnel
        .contributions
        .exists_for_email("fan@example.com")
        .await
        .unwrap());

    let events = drain(&mut rx);
    assert!(events.contains(&CoreEvent::Funnel(FunnelEvent::ContributionRecorded {
        song_slug: "polygamy".to_string(),
        amount_cents: 1500,
        currency: "USD".to_string(),
    })));
    assert!(events.contains(&CoreEvent::Funnel(FunnelEvent::SupporterGranted {
        scope: GrantScope::Item("polygamy".to_string()),
    })));

    // Reloading the success page must not log a second purchase.
    let again = checkout
        .complete(Some("cs_paid"), Some("polygamy"), &visitor)
        .await;
    assert_eq!(again, Destination::Download);

    let feed = funnel.feed.feed().await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].message, "Someone bought this song for $15");
}

#[tokio::test]
async fn unpaid_or_missing_sessions_go_back_to_buy() {
    let funnel = Funnel::new().await;
    let mut gateway = MockGateway::new();
    gateway
        .expect_retrieve_session()
        .returning(|id: &str| match id {
            "cs_unpaid" => Ok(session(id, PaymentStatus::Unpaid)),
            _ => Err(BridgeError::OperationFailed("no such session".to_string())),
        });

    let checkout = funnel.checkout(gateway);
    let (visitor, markers) = visitor();

    for session_id in [None, Some("  "), Some("cs_unpaid"), Some("cs_gone")] {
        let destination = checkout.complete(session_id, None, &visitor).await;
        assert_eq!(destination, Destination::Buy);
    }

    assert!(markers.is_empty());
    assert!(!funnel
        .contributions
        .exists_for_email("fan@example.com")
        .await
        .unwrap());
    assert!(funnel.feed.feed().await.unwrap().is_empty());
}

#[tokio::test]
async fn paid_session_without_song_grants_global_only() {
    let funnel = Funnel::new().await;
    let mut gateway = MockGateway::new();
    gateway.expect_retrieve_session().returning(|id: &str| {
        let mut paid = session(id, PaymentStatus::Paid);
        paid.metadata.clear();
        paid.customer_email = None;
        Ok(paid)
    });

    let checkout = funnel.checkout(gateway);
    let (visitor, markers) = visitor();

    let destination = checkout.complete(Some("cs_anon"), None, &visitor).await;

    assert_eq!(destination, Destination::Download);
    assert!(markers.is_flag_set("supporter").await.unwrap());
    assert_eq!(markers.len(), 1);
    assert_eq!(funnel.emails.count().await.unwrap(), 0);
    assert_eq!(funnel.feed.feed().await.unwrap().len(), 1);
}
