use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{Investment, NewInvestment},
    events::{EventProducers, InvestmentConfirmedEvent, InvestmentProcessingFailedEvent},
    fees,
    traits::{FundingRead, SettlementDatabase, SettlementError},
};

/// `InvestmentLedgerApi` owns the investment state machine. It is the only component (besides
/// escrow settlement) that writes investment state; the funding aggregator only reads it.
pub struct InvestmentLedgerApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for InvestmentLedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "InvestmentLedgerApi")
    }
}

impl<B: Clone> Clone for InvestmentLedgerApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone() }
    }
}

impl<B> InvestmentLedgerApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> InvestmentLedgerApi<B>
where B: SettlementDatabase
{
    /// Creates a pending pledge. Fails with a validation error if the amount is not positive, the
    /// project does not exist or cannot receive funding, or (method-specific) the gateway session
    /// reference is already pledged against.
    pub async fn create_pledge(&self, pledge: NewInvestment) -> Result<Investment, SettlementError> {
        if !pledge.amount.is_positive() {
            return Err(SettlementError::Validation(format!(
                "Pledge amount must be positive, got {}",
                pledge.amount
            )));
        }
        let project = self
            .db
            .fetch_project(pledge.project_id)
            .await?
            .ok_or(SettlementError::ProjectNotFound(pledge.project_id))?;
        if !project.can_receive_funding(Utc::now()) {
            info!("🔄️💰️ Rejecting pledge: project #{} is {} with deadline {}", project.id, project.status, project.funding_deadline);
            return Err(SettlementError::ProjectNotFundable(project.id));
        }
        let investment = self.db.insert_investment(pledge, None).await?;
        debug!("🔄️💰️ Pledge #{} of {} created for project #{}", investment.id, investment.amount, investment.project_id);
        Ok(investment)
    }

    /// Applies a verified payment success to the ledger. Idempotent: replaying the same
    /// `external_ref` returns the existing record and fires no further side effects. The second
    /// element of the pair reports whether this call performed the transition.
    pub async fn confirm(&self, investment_id: i64, external_ref: &str) -> Result<(Investment, bool), SettlementError> {
        let (investment, applied) = self.db.confirm_investment(investment_id, external_ref).await?;
        if applied {
            debug!("🔄️✅️ Investment #{investment_id} confirmed against session {external_ref}");
            self.call_confirmed_hook(&investment).await;
        } else {
            debug!("🔄️✅️ Investment #{investment_id} was already confirmed; replay acknowledged without effect");
        }
        Ok((investment, applied))
    }

    /// Applies a verified payment failure. Confirmation always wins over a late failure event:
    /// if the investment is already confirmed, nothing changes and the anomaly is logged.
    pub async fn fail(&self, investment_id: i64, reason: &str) -> Result<(Investment, bool), SettlementError> {
        let (investment, applied) = self.db.cancel_investment(investment_id, reason).await?;
        if applied {
            debug!("🔄️❌️ Investment #{investment_id} cancelled: {reason}");
        } else if investment.status == crate::db_types::InvestmentStatus::Confirmed {
            warn!(
                "🔄️❌️ Anomaly: failure event for already-confirmed investment #{investment_id} ignored ({reason})"
            );
        }
        Ok((investment, applied))
    }

    /// Permanent processing failure: cancels the pledge and dispatches the failure notification.
    pub async fn fail_with_notification(
        &self,
        investment_id: i64,
        reason: &str,
    ) -> Result<(Investment, bool), SettlementError> {
        let (investment, applied) = self.fail(investment_id, reason).await?;
        if applied {
            for emitter in &self.producers.investment_failed {
                emitter
                    .publish_event(InvestmentProcessingFailedEvent {
                        investment: investment.clone(),
                        reason: reason.to_string(),
                    })
                    .await;
            }
        }
        Ok((investment, applied))
    }

    /// Refunds a confirmed investment in full. Gateway processing fees are not returned by the
    /// provider; the unrecovered fee is logged for the books. Only valid from `Confirmed`.
    pub async fn refund(&self, investment_id: i64) -> Result<Investment, SettlementError> {
        let investment = self.db.refund_investment(investment_id).await?;
        let fee = fees::investment_processing_fee(&investment);
        if fee.is_positive() {
            info!(
                "🔄️↩️ Investment #{investment_id} refunded in full ({}); only {} was banked, so {fee} of processing \
                 fees is not recovered",
                investment.amount,
                fees::investment_net_amount(&investment)
            );
        } else {
            info!("🔄️↩️ Investment #{investment_id} refunded in full ({})", investment.amount);
        }
        Ok(investment)
    }

    pub async fn fetch_investment(&self, investment_id: i64) -> Result<Option<Investment>, SettlementError> {
        self.db.fetch_investment(investment_id).await
    }

    async fn call_confirmed_hook(&self, investment: &Investment) {
        for emitter in &self.producers.investment_confirmed {
            trace!("🔄️📬️ Notifying investment-confirmed subscribers");
            emitter.publish_event(InvestmentConfirmedEvent::new(investment.clone())).await;
        }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}
