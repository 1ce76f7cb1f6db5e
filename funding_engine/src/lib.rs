//! Funding Settlement Engine
//!
//! The engine funds development projects through pledges collected via payment gateways, reconciles
//! asynchronous payment confirmations, aggregates funding totals, and releases escrowed funds to
//! project owners minus a platform fee. It is provider-agnostic: everything a concrete payment
//! gateway must supply is captured by the [`traits::PaymentGateway`] capability.
//!
//! The library is divided into three main sections:
//! 1. Storage ([`SqliteDatabase`]). All mutations go through the [`traits::SettlementDatabase`]
//!    trait so that each state transition happens inside a single transaction; reads go through
//!    [`traits::FundingRead`] and are always recomputed from confirmed investments rather than
//!    cached.
//! 2. The engine API ([`mod@api`]): the investment ledger, the funding aggregator and the escrow
//!    settlement operation, plus the webhook reconciler ([`reconciler`]) and the background job
//!    machinery ([`mod@jobs`]).
//! 3. Events ([`mod@events`]): a small mpsc pub-sub used to carry notification side effects
//!    (confirmation mails, escrow-release notices) out of the transactional core, so that a
//!    delivery failure can never roll back committed financial state.
pub mod api;
pub mod db_types;
pub mod events;
pub mod fees;
pub mod helpers;
pub mod jobs;
pub mod reconciler;
pub mod traits;

#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;

pub use api::{
    aggregator_api::FundingAggregatorApi,
    ledger_api::InvestmentLedgerApi,
    project_api::ProjectApi,
    settlement_api::EscrowSettlementApi,
};
pub use traits::{FundingRead, PaymentGateway, SettlementDatabase, SettlementError};
