//! Payment processor bridge.
//!
//! Checkout is delegated to a hosted payment page. The core only needs to
//! open a session and later read back whether it was paid.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What the buyer is paying for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LineItem {
    /// A price configured on the processor side.
    Preset { price_id: String },
    /// A pay-what-you-want amount.
    Custom {
        amount_cents: i64,
        currency: String,
        product_name: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSessionRequest {
    pub line_item: LineItem,
    pub success_url: String,
    pub cancel_url: String,
    /// Prefills the hosted page.
    #[serde(default)]
    pub customer_email: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

/// Processor-side view of a checkout session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    /// Hosted page to redirect the buyer to.
    pub url: Option<String>,
    pub payment_status: PaymentStatus,
    pub customer_email: Option<String>,
    pub amount_total_cents: Option<i64>,
    pub currency: Option<String>,
    pub price_id: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(&self, request: CheckoutSessionRequest) -> Result<CheckoutSession>;

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession>;
}
