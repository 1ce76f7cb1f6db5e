use fsp_common::Cents;
use serde::{Deserialize, Serialize};

use crate::db_types::{Investment, Project};

/// A pledge reached `Confirmed`. Fired exactly once per investment, after the confirming
/// transaction commits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentConfirmedEvent {
    pub investment: Investment,
}

impl InvestmentConfirmedEvent {
    pub fn new(investment: Investment) -> Self {
        Self { investment }
    }
}

/// Asynchronous processing of a pledge failed permanently and the pledge was cancelled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentProcessingFailedEvent {
    pub investment: Investment,
    pub reason: String,
}

/// Escrow for a fully funded project was released; the project is now `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowReleasedEvent {
    pub project: Project,
    pub total: Cents,
    pub platform_fee: Cents,
    pub net: Cents,
}

/// Per-investor companion to [`EscrowReleasedEvent`], fired once per released investment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestmentEscrowReleasedEvent {
    pub investment_id: i64,
    pub project_id: i64,
}

/// A settlement exhausted its retry budget and needs manual intervention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementDeadLetterEvent {
    pub project_id: i64,
    pub attempts: u32,
    pub error: String,
}
