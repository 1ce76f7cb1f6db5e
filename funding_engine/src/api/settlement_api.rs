use std::fmt::Debug;

use log::*;

use crate::{
    events::{EscrowReleasedEvent, EventProducers, InvestmentEscrowReleasedEvent},
    traits::{SettlementDatabase, SettlementError, SettlementOutcome},
};

/// Releases escrow for fully funded projects. The actual money movement is a single atomic
/// transaction in the backend; this API re-checks nothing itself, publishes notifications only
/// after the transaction has committed.
pub struct EscrowSettlementApi<B> {
    db: B,
    producers: EventProducers,
    fee_bps: i64,
}

impl<B> Debug for EscrowSettlementApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "EscrowSettlementApi")
    }
}

impl<B: Clone> Clone for EscrowSettlementApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), producers: self.producers.clone(), fee_bps: self.fee_bps }
    }
}

impl<B> EscrowSettlementApi<B> {
    /// `fee_bps` is the platform fee in basis points, e.g. 500 for 5%.
    pub fn new(db: B, producers: EventProducers, fee_bps: i64) -> Self {
        Self { db, producers, fee_bps }
    }
}

impl<B> EscrowSettlementApi<B>
where B: SettlementDatabase
{
    /// Settles escrow for the project. Eligibility (status `Funded`, goal still met, escrow not
    /// already released) is rechecked inside the transaction, so a stale trigger degrades to
    /// [`SettlementOutcome::NotEligible`] rather than a double release.
    pub async fn settle(&self, project_id: i64) -> Result<SettlementOutcome, SettlementError> {
        let outcome = self.db.settle_escrow(project_id, self.fee_bps).await?;
        match &outcome {
            SettlementOutcome::Settled(report) => {
                info!(
                    "🕰️💰️ Escrow released for project #{}: {} raised, {} platform fee, {} to the project",
                    project_id, report.total, report.platform_fee, report.net
                );
                for emitter in &self.producers.escrow_released {
                    emitter
                        .publish_event(EscrowReleasedEvent {
                            project: report.project.clone(),
                            total: report.total,
                            platform_fee: report.platform_fee,
                            net: report.net,
                        })
                        .await;
                }
                for &investment_id in &report.investment_ids {
                    for emitter in &self.producers.investment_escrow_released {
                        emitter.publish_event(InvestmentEscrowReleasedEvent { investment_id, project_id }).await;
                    }
                }
            },
            SettlementOutcome::NotEligible { reason } => {
                info!("🕰️💰️ Settlement for project #{project_id} skipped: {reason}");
            },
        }
        Ok(outcome)
    }
}
