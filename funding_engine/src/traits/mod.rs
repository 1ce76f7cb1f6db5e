//! Capability traits for the settlement engine.
//!
//! Backends implement [`SettlementDatabase`] (mutations, each one a single transaction) and
//! [`FundingRead`] (aggregation reads, always recomputed at call time). Payment providers are
//! abstracted behind [`PaymentGateway`]; the engine never depends on a gateway-specific payload
//! shape beyond that surface.
mod payment_gateway;
mod settlement_database;

pub use payment_gateway::{
    GatewayError,
    PaymentGateway,
    PaymentSession,
    RefundResult,
    SignatureError,
    WebhookEvent,
    WebhookEventType,
};
pub use settlement_database::{FundingRead, SettlementDatabase, SettlementError, SettlementOutcome, SettlementReport};
