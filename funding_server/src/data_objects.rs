use std::fmt::Display;

use chrono::{DateTime, Utc};
use fsp_common::Cents;
use funding_engine::{
    api::objects::FundingSnapshot,
    db_types::{Investment, NewInvestment, NewProject, PaymentMethod},
    traits::PaymentSession,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProjectRequest {
    pub title: String,
    /// The funding goal in integer cents.
    pub funding_goal: Cents,
    pub funding_deadline: DateTime<Utc>,
}

impl From<NewProjectRequest> for NewProject {
    fn from(req: NewProjectRequest) -> Self {
        NewProject::new(req.title, req.funding_goal, req.funding_deadline)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPledgeRequest {
    pub user_id: i64,
    pub project_id: i64,
    /// The pledge amount in integer cents.
    pub amount: Cents,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub metadata: Option<String>,
}

impl From<NewPledgeRequest> for NewInvestment {
    fn from(req: NewPledgeRequest) -> Self {
        let pledge = NewInvestment::new(req.user_id, req.project_id, req.amount, req.payment_method);
        match req.metadata {
            Some(metadata) => pledge.with_metadata(metadata),
            None => pledge,
        }
    }
}

/// What the client gets back after creating a pledge: the ledger record plus the payment session
/// to complete it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PledgeResponse {
    pub investment: Investment,
    pub payment: PaymentSession,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingResponse {
    pub snapshot: FundingSnapshot,
    pub project_status: String,
    pub currency: String,
}
