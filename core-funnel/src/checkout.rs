//! # Checkout
//!
//! Opens hosted checkout sessions for a song and handles the return from the
//! payment page: record the contribution, unlock the song, send the buyer to
//! the download page.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_traits::payment::{CheckoutSession, CheckoutSessionRequest, LineItem, PaymentGateway};
use core_runtime::events::{CoreEvent, EventBus, FunnelEvent, GrantScope};
use core_runtime::logging::redact_email;
use tracing::{info, warn};

use crate::activity_feed::ActivityFeed;
use crate::catalog::Catalog;
use crate::contributions::{ContributionRepository, NewContribution};
use crate::error::{FunnelError, Result};
use crate::subscribers::{EmailRepository, CHECKOUT_SOURCE};
use crate::visitor::{Destination, Visitor};

pub const MIN_AMOUNT_DOLLARS: f64 = 1.0;
pub const MAX_AMOUNT_DOLLARS: f64 = 100_000.0;
pub const DEFAULT_PRODUCT_NAME: &str = "Support Contribution";
pub const DEFAULT_SUCCESS_PATH: &str = "/api/checkout/success";
const CHECKOUT_CURRENCY: &str = "usd";

/// Parameters of a "buy" link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CheckoutRequest {
    pub song: Option<String>,
    /// Preset processor price; wins over `amount_dollars`.
    pub price_id: Option<String>,
    pub amount_dollars: Option<f64>,
    pub email: Option<String>,
    pub label: Option<String>,
    pub return_to: Option<String>,
}

impl CheckoutRequest {
    /// Read the request from query parameters. An unparsable amount is kept
    /// as NaN so validation rejects it.
    pub fn from_query(params: &HashMap<String, String>) -> Self {
        let get = |key: &str| params.get(key).filter(|v| !v.is_empty()).cloned();
        Self {
            song: get("song"),
            price_id: get("price_id"),
            amount_dollars: get("amount").map(|raw| raw.trim().parse().unwrap_or(f64::NAN)),
            email: get("email"),
            label: get("label"),
            return_to: get("return_to"),
        }
    }
}

pub fn dollars_to_cents(dollars: f64) -> Result<i64> {
    if !dollars.is_finite() || !(MIN_AMOUNT_DOLLARS..=MAX_AMOUNT_DOLLARS).contains(&dollars) {
        return Err(FunnelError::InvalidAmount(format!(
            "{dollars} is outside {MIN_AMOUNT_DOLLARS}..={MAX_AMOUNT_DOLLARS} dollars"
        )));
    }
    Ok((dollars * 100.0).round() as i64)
}

pub struct CheckoutService {
    gateway: Arc<dyn PaymentGateway>,
    catalog: Arc<Catalog>,
    emails: Arc<dyn EmailRepository>,
    contributions: Arc<dyn ContributionRepository>,
    feed: Arc<ActivityFeed>,
    site_origin: String,
    events: EventBus,
}

impl CheckoutService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        catalog: Arc<Catalog>,
        emails: Arc<dyn EmailRepository>,
        contributions: Arc<dyn ContributionRepository>,
        feed: Arc<ActivityFeed>,
        site_origin: impl Into<String>,
        events: EventBus,
    ) -> Self {
        Self {
            gateway,
            catalog,
            emails,
            contributions,
            feed,
            site_origin: site_origin.into().trim_end_matches('/').to_string(),
            events,
        }
    }

    /// Open a checkout session and return where to send the buyer.
    pub async fn begin(&self, request: CheckoutRequest) -> Result<Destination> {
        let song = self.catalog.resolve_or_default(request.song.as_deref());
        let slug = urlencoding::encode(&song.slug).into_owned();

        let return_to = request.return_to.as_deref().unwrap_or(DEFAULT_SUCCESS_PATH);
        let success_url = format!(
            "{}{}?session_id={{CHECKOUT_SESSION_ID}}&song={}",
            self.site_origin, return_to, slug
        );
        let cancel_url = format!("{}/buy/{}", self.site_origin, slug);

        let mut metadata = HashMap::from([
            ("source".to_string(), "buy-page".to_string()),
            ("song_slug".to_string(), song.slug.clone()),
        ]);

        let line_item = match request.price_id.filter(|id| !id.trim().is_empty()) {
            Some(price_id) => {
                metadata.insert("kind".to_string(), "preset".to_string());
                LineItem::Preset { price_id }
            }
            None => {
                let dollars = request.amount_dollars.unwrap_or(f64::NAN);
                let amount_cents = dollars_to_cents(dollars)?;
                metadata.insert("kind".to_string(), "custom".to_string());
                metadata.insert("amount_dollars".to_string(), dollars.to_string());
                LineItem::Custom {
                    amount_cents,
                    currency: CHECKOUT_CURRENCY.to_string(),
                    product_name: request
                        .label
                        .unwrap_or_else(|| DEFAULT_PRODUCT_NAME.to_string()),
                }
            }
        };

        let session = self
            .gateway
            .create_session(CheckoutSessionRequest {
                line_item,
                success_url,
                cancel_url,
                customer_email: request.email,
                metadata,
            })
            .await?;

        let url = session.url.ok_or_else(|| {
            FunnelError::Bridge(bridge_traits::BridgeError::OperationFailed(format!(
                "checkout session {} has no redirect url",
                session.id
            )))
        })?;

        info!(slug = %song.slug, session_id = %session.id, "Checkout session opened");
        Ok(Destination::External(url))
    }

    /// Handle the return from the payment page.
    ///
    /// Unpaid, missing or unreadable sessions go back to `/buy` with nothing
    /// unlocked.
    pub async fn complete(&self, session_id: Option<&str>, song: Option<&str>, visitor: &Visitor) -> Destination {
        match self.try_complete(session_id, song, visitor).await {
            Ok(destination) => destination,
            Err(e) if e.is_client_error() => {
                info!(error = %e, "Checkout not completed");
                Destination::Buy
            }
            Err(e) => {
                warn!(error = %e, "Checkout completion failed");
                Destination::Buy
            }
        }
    }

    async fn try_complete(&self, session_id: Option<&str>, song: Option<&str>, visitor: &Visitor) -> Result<Destination> {
        let session_id = session_id
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(FunnelError::MissingSession)?;

        let session = self.gateway.retrieve_session(session_id).await?;
        if !session.is_paid() {
            return Err(FunnelError::PaymentNotCompleted {
                session_id: session.id,
            });
        }

        let slug = song
            .or_else(|| session.metadata.get("song_slug").map(String::as_str))
            .and_then(|raw| self.catalog.get(raw))
            .map(|song| song.slug.clone());

        let newly_recorded = self.record(&session, slug.as_deref()).await;

        if newly_recorded {
            if let Err(e) = self
                .feed
                .log_purchase(session.amount_total_cents, slug.as_deref())
                .await
            {
                warn!(error = %e, "Purchase activity not logged");
            }
        }

        visitor.grant(&GrantScope::Global).await?;
        let _ = self.events.emit(CoreEvent::Funnel(FunnelEvent::SupporterGranted {
            scope: GrantScope::Global,
        }));
        if let Some(slug) = &slug {
            let scope = GrantScope::Item(slug.clone());
            visitor.grant(&scope).await?;
            let _ = self
                .events
                .emit(CoreEvent::Funnel(FunnelEvent::SupporterGranted { scope }));
        }

        Ok(Destination::Download)
    }

    /// Best-effort bookkeeping. Returns `false` for a replayed session.
    async fn record(&self, session: &CheckoutSession, slug: Option<&str>) -> bool {
        let Some(email) = session
            .customer_email
            .as_deref()
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty())
        else {
            return true;
        };

        let amount_cents = session.amount_total_cents.unwrap_or(0);
        let currency = session
            .currency
            .as_deref()
            .unwrap_or("usd")
            .to_uppercase();

        let recorded = self
            .contributions
            .record(&NewContribution {
                email: email.clone(),
                amount_cents,
                currency: currency.clone(),
                checkout_session_id: session.id.clone(),
                price_id: session.price_id.clone(),
                song_slug: slug.map(str::to_string),
            })
            .await;

        let newly_recorded = match recorded {
            Ok(inserted) => inserted,
            Err(e) => {
                warn!(session_id = %session.id, error = %e, "Contribution not recorded");
                true
            }
        };

        if let Err(e) = self.emails.upsert(&email, CHECKOUT_SOURCE).await {
            warn!(email = %redact_email(&email), error = %e, "Buyer email not stored");
        }

        if newly_recorded {
            info!(session_id = %session.id, amount_cents, %currency, "Contribution recorded");
            let _ = self
                .events
                .emit(CoreEvent::Funnel(FunnelEvent::ContributionRecorded {
                    song_slug: slug.unwrap_or_default().to_string(),
                    amount_cents,
                    currency,
                }));
        }
        newly_recorded
    }
}
