use fsp_common::Cents;
use thiserror::Error;

use crate::{
    api::objects::FundingSnapshot,
    db_types::{Investment, NewInvestment, NewProject, Project},
};

/// Read-side aggregation over the funding store.
///
/// Every call re-reads confirmed investments at call time. Backends must not keep a long-lived
/// cache of funding totals; the ledger offers no invalidation signal.
#[allow(async_fn_in_trait)]
pub trait FundingRead: Clone {
    async fn fetch_project(&self, project_id: i64) -> Result<Option<Project>, SettlementError>;

    async fn fetch_investment(&self, investment_id: i64) -> Result<Option<Investment>, SettlementError>;

    async fn fetch_investment_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Investment>, SettlementError>;

    /// All confirmed investments for the project, ordered by creation time.
    async fn confirmed_investments(&self, project_id: i64) -> Result<Vec<Investment>, SettlementError>;

    /// Recomputes the funding snapshot from confirmed investments. Never mutates anything.
    async fn funding_snapshot(&self, project_id: i64) -> Result<FundingSnapshot, SettlementError>;
}

/// The highest level of behaviour for backends supporting the settlement engine.
///
/// Each method is a single transactional unit: either the whole state change applies, or none of
/// it does. Per-investment mutations are serialized by guarding the status column in the write
/// itself; a conflicting concurrent write loses with [`SettlementError::WriteConflict`] instead of
/// silently overwriting.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone + FundingRead {
    /// The URL of the backing store.
    fn url(&self) -> &str;

    async fn insert_project(&self, project: NewProject) -> Result<Project, SettlementError>;

    /// Moves a project from `Draft` to `Published` so it can receive pledges.
    async fn publish_project(&self, project_id: i64) -> Result<Project, SettlementError>;

    /// Inserts a pending investment. The amount and project fundability have already been
    /// validated by the ledger; the backend enforces the uniqueness of `external_ref`.
    async fn insert_investment(
        &self,
        pledge: NewInvestment,
        external_ref: Option<&str>,
    ) -> Result<Investment, SettlementError>;

    /// Records the gateway session reference on a pending investment.
    async fn attach_external_ref(&self, investment_id: i64, external_ref: &str) -> Result<Investment, SettlementError>;

    /// Confirms an investment. Idempotent and terminal-dominant:
    /// * already confirmed with the same `external_ref` → returns `(investment, false)` with no
    ///   side effects;
    /// * pending → sets status, `confirmed_at` and `external_ref` in one guarded write and
    ///   returns `(investment, true)`;
    /// * cancelled or refunded → [`SettlementError::InvalidStateTransition`]; the event is
    ///   rejected and logged, never applied.
    async fn confirm_investment(
        &self,
        investment_id: i64,
        external_ref: &str,
    ) -> Result<(Investment, bool), SettlementError>;

    /// Cancels a pending investment with the given failure reason. Confirmation wins over a late
    /// failure event: if the investment is already confirmed this is a no-op returning
    /// `(investment, false)`, logged as an anomaly by the caller. Cancelling an already cancelled
    /// or refunded investment is also a no-op.
    async fn cancel_investment(&self, investment_id: i64, reason: &str) -> Result<(Investment, bool), SettlementError>;

    /// Refunds a confirmed investment. Any other starting state fails with
    /// [`SettlementError::InvalidStateTransition`].
    async fn refund_investment(&self, investment_id: i64) -> Result<Investment, SettlementError>;

    /// Transitions the project to `Funded` iff the goal is reached (recomputed inside the
    /// transaction) and the current status is fundable. Idempotent; returns the updated project
    /// when a transition happened.
    async fn advance_project_if_funded(&self, project_id: i64) -> Result<Option<Project>, SettlementError>;

    /// Reverts a `Funded` project to `Published` when its total has dropped below goal, but only
    /// while escrow has not been released. Returns the reverted project, if any.
    async fn revert_funding_if_unreleased(&self, project_id: i64) -> Result<Option<Project>, SettlementError>;

    /// Settles escrow for a fully funded project in one atomic step: marks every confirmed,
    /// not-yet-released investment as released and completes the project with
    /// `escrow_amount = total - fee`. Eligibility is recomputed inside the transaction, never
    /// trusted from enqueue time. Any failure leaves state fully unchanged.
    async fn settle_escrow(&self, project_id: i64, fee_bps: i64) -> Result<SettlementOutcome, SettlementError>;

    /// Whether the event id has already been claimed by a fully processed delivery.
    async fn webhook_event_seen(&self, event_id: &str) -> Result<bool, SettlementError>;

    /// Claims a webhook event id. Returns `false` if the event was already claimed. Callers must
    /// claim only after the event's transition has committed; an id claimed for an unapplied
    /// event would make the gateway's redelivery a no-op and lose the event for good.
    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool, SettlementError>;

    /// Closes the backing store.
    async fn close(&mut self) -> Result<(), SettlementError> {
        Ok(())
    }
}

//--------------------------------------  SettlementOutcome  ---------------------------------------------------------
#[derive(Debug, Clone)]
pub enum SettlementOutcome {
    Settled(SettlementReport),
    /// The project no longer meets the release criteria at fire time. Not an error.
    NotEligible { reason: String },
}

#[derive(Debug, Clone)]
pub struct SettlementReport {
    pub project: Project,
    pub investment_ids: Vec<i64>,
    pub total: Cents,
    pub platform_fee: Cents,
    pub net: Cents,
}

//--------------------------------------   SettlementError   ---------------------------------------------------------
#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    /// Bad input, rejected at creation and never retried.
    #[error("Invalid pledge: {0}")]
    Validation(String),
    #[error("Project {0} cannot receive funding")]
    ProjectNotFundable(i64),
    #[error("The requested project {0} does not exist")]
    ProjectNotFound(i64),
    #[error("The requested investment {0} does not exist")]
    InvestmentNotFound(i64),
    #[error("A pledge already exists for gateway session {0}")]
    DuplicatePledge(String),
    /// A concurrent write collided on the same investment. Re-read state and retry the operation.
    #[error("Conflicting concurrent write on investment {0}")]
    WriteConflict(i64),
    /// The requested transition is not in the status transition table.
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),
    /// Store/network unavailability. Retryable with backoff.
    #[error("Internal database error: {0}")]
    DatabaseError(String),
}

impl SettlementError {
    /// Whether a job hitting this error should be retried (with backoff) rather than dead-lettered
    /// immediately.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SettlementError::DatabaseError(_) | SettlementError::WriteConflict(_))
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        SettlementError::DatabaseError(e.to_string())
    }
}
