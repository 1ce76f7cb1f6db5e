use std::fmt::Debug;

use log::*;

use crate::{
    api::objects::FundingSnapshot,
    db_types::{Investment, Project},
    traits::{FundingRead, SettlementDatabase, SettlementError},
};

/// Read-mostly view over the ledger. Totals are recomputed from confirmed investments on every
/// call; nothing here caches.
pub struct FundingAggregatorApi<B> {
    db: B,
}

impl<B> Debug for FundingAggregatorApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "FundingAggregatorApi")
    }
}

impl<B: Clone> Clone for FundingAggregatorApi<B> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<B> FundingAggregatorApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> FundingAggregatorApi<B>
where B: FundingRead
{
    pub async fn fetch_project(&self, project_id: i64) -> Result<Option<Project>, SettlementError> {
        self.db.fetch_project(project_id).await
    }

    pub async fn confirmed_investments(&self, project_id: i64) -> Result<Vec<Investment>, SettlementError> {
        self.db.confirmed_investments(project_id).await
    }

    /// Current funding state, recomputed from the ledger.
    pub async fn funding_snapshot(&self, project_id: i64) -> Result<FundingSnapshot, SettlementError> {
        self.db.funding_snapshot(project_id).await
    }
}

impl<B> FundingAggregatorApi<B>
where B: SettlementDatabase
{
    /// Promotes the project to `Funded` if the recomputed total meets the goal. Safe to call after
    /// every confirmation; the transition only happens once.
    pub async fn advance_status_if_funded(&self, project_id: i64) -> Result<Option<Project>, SettlementError> {
        let advanced = self.db.advance_project_if_funded(project_id).await?;
        if let Some(project) = &advanced {
            info!("💰️🎉️ Project #{} \"{}\" has reached its funding goal of {}", project.id, project.title, project.funding_goal);
        }
        Ok(advanced)
    }

    /// Re-evaluates funding after a refund. A `Funded` project whose total dropped below goal
    /// reverts to `Published`, unless escrow was already released (then the money has moved and
    /// the status stays).
    pub async fn recompute_after_refund(&self, project_id: i64) -> Result<Option<Project>, SettlementError> {
        let reverted = self.db.revert_funding_if_unreleased(project_id).await?;
        if let Some(project) = &reverted {
            info!(
                "💰️↩️ Project #{} dropped below its funding goal after a refund and has reverted to {}",
                project.id, project.status
            );
        }
        Ok(reverted)
    }
}
