use std::fmt::Display;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::db_types::{Investment, Project};

/// The uniform capability the engine consumes from any payment provider: opening payment
/// sessions, verifying webhook authenticity, and issuing refunds.
#[allow(async_fn_in_trait)]
pub trait PaymentGateway: Clone + Send + Sync {
    /// Opens a charge/checkout session for the pledge. The returned `external_ref` becomes the
    /// investment's dedup key for webhook replay.
    async fn open_payment_session(
        &self,
        investment: &Investment,
        project: &Project,
    ) -> Result<PaymentSession, GatewayError>;

    /// Verifies the signature on a raw webhook payload and parses the envelope. Must be called
    /// before any ledger state is touched; a failure has no side effects.
    fn verify_webhook(&self, raw_payload: &[u8], signature_header: &str) -> Result<WebhookEvent, SignatureError>;

    /// Requests a refund for the given gateway session reference.
    async fn refund(&self, external_ref: &str) -> Result<RefundResult, GatewayError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSession {
    pub external_ref: String,
    /// Where to send the investor to complete payment. `None` for out-of-band methods.
    pub redirect_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundResult {
    pub refund_ref: String,
}

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("The gateway rejected the request: {0}")]
    Rejected(String),
    #[error("The gateway is unavailable: {0}")]
    Unavailable(String),
}

/// An unauthenticated or unreadable webhook. Rejected immediately with no retry and no side
/// effects; alertable if frequent.
#[derive(Debug, Clone, Error)]
pub enum SignatureError {
    #[error("Webhook signature verification failed")]
    InvalidSignature,
    #[error("Webhook payload could not be parsed: {0}")]
    MalformedPayload(String),
}

//--------------------------------------    WebhookEvent    ----------------------------------------------------------
/// The verified envelope of an inbound gateway event. Transient; only its id is persisted, for
/// at-most-once processing per event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// The gateway's unique event id. The dedup key for redelivery.
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: WebhookEventType,
    /// The investment this event applies to, carried through session metadata.
    pub investment_id: Option<i64>,
    /// The gateway session/intent reference.
    pub external_ref: Option<String>,
    pub failure_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WebhookEventType {
    #[serde(rename = "checkout-completed")]
    CheckoutCompleted,
    #[serde(rename = "payment-succeeded")]
    PaymentSucceeded,
    #[serde(rename = "payment-failed")]
    PaymentFailed,
    /// Anything else. Logged and acknowledged so the gateway stops redelivering.
    #[serde(other)]
    Unknown,
}

impl Display for WebhookEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookEventType::CheckoutCompleted => write!(f, "checkout-completed"),
            WebhookEventType::PaymentSucceeded => write!(f, "payment-succeeded"),
            WebhookEventType::PaymentFailed => write!(f, "payment-failed"),
            WebhookEventType::Unknown => write!(f, "unknown"),
        }
    }
}
