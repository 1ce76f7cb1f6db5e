//! `SqliteDatabase` is a concrete implementation of a funding settlement engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements the traits defined in the
//! [`crate::traits`] module. Every mutation runs inside one transaction; the guarded UPDATEs in
//! the low-level [`super::db`] functions turn lost races into [`SettlementError::WriteConflict`]
//! instead of silent overwrites.
use std::fmt::Debug;

use chrono::Utc;
use log::*;
use sqlx::SqlitePool;

use super::db::{db_url, investments, new_pool, projects, webhook_events};
use crate::{
    api::objects::FundingSnapshot,
    db_types::{Investment, InvestmentStatus, NewInvestment, NewProject, Project, ProjectStatus},
    fees,
    traits::{FundingRead, SettlementDatabase, SettlementError, SettlementOutcome, SettlementReport},
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new connection pool using the URL from the `FSP_DATABASE_URL` environment
    /// variable, or the default.
    pub async fn new(max_connections: u32) -> Result<Self, SettlementError> {
        let url = db_url();
        Self::new_with_url(&url, max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, SettlementError> {
        let pool = new_pool(url, max_connections).await?;
        debug!("🗃️ Connected to database {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Applies any pending embedded migrations.
    pub async fn migrate(&self) -> Result<(), SettlementError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SettlementError::DatabaseError(e.to_string()))?;
        info!("🗃️ Database migrations are up to date");
        Ok(())
    }
}

impl FundingRead for SqliteDatabase {
    async fn fetch_project(&self, project_id: i64) -> Result<Option<Project>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let project = projects::fetch_project(project_id, &mut conn).await?;
        Ok(project)
    }

    async fn fetch_investment(&self, investment_id: i64) -> Result<Option<Investment>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let investment = investments::fetch_investment(investment_id, &mut conn).await?;
        Ok(investment)
    }

    async fn fetch_investment_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Investment>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let investment = investments::fetch_investment_by_external_ref(external_ref, &mut conn).await?;
        Ok(investment)
    }

    async fn confirmed_investments(&self, project_id: i64) -> Result<Vec<Investment>, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let result = investments::confirmed_for_project(project_id, &mut conn).await?;
        Ok(result)
    }

    async fn funding_snapshot(&self, project_id: i64) -> Result<FundingSnapshot, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let project = projects::fetch_project(project_id, &mut conn)
            .await?
            .ok_or(SettlementError::ProjectNotFound(project_id))?;
        let total = investments::confirmed_total(project_id, &mut conn).await?;
        Ok(FundingSnapshot::compute(project_id, total, project.funding_goal, project.funding_deadline, Utc::now()))
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_project(&self, project: NewProject) -> Result<Project, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        projects::insert_project(project, &mut conn).await
    }

    async fn publish_project(&self, project_id: i64) -> Result<Project, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let result = match projects::publish_project(project_id, &mut *tx).await? {
            Some(project) => project,
            None => {
                let project = projects::fetch_project(project_id, &mut *tx)
                    .await?
                    .ok_or(SettlementError::ProjectNotFound(project_id))?;
                return Err(SettlementError::InvalidStateTransition(format!(
                    "Project #{project_id}: {} -> Published",
                    project.status
                )));
            },
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn insert_investment(
        &self,
        pledge: NewInvestment,
        external_ref: Option<&str>,
    ) -> Result<Investment, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        investments::insert_investment(pledge, external_ref, &mut conn).await
    }

    async fn attach_external_ref(
        &self,
        investment_id: i64,
        external_ref: &str,
    ) -> Result<Investment, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        investments::attach_external_ref(investment_id, external_ref, &mut conn)
            .await?
            .ok_or(SettlementError::InvestmentNotFound(investment_id))
    }

    async fn confirm_investment(
        &self,
        investment_id: i64,
        external_ref: &str,
    ) -> Result<(Investment, bool), SettlementError> {
        let mut tx = self.pool.begin().await?;
        let investment = investments::fetch_investment(investment_id, &mut *tx)
            .await?
            .ok_or(SettlementError::InvestmentNotFound(investment_id))?;
        let result = match investment.status {
            InvestmentStatus::Confirmed => (investment, false),
            InvestmentStatus::Pending => {
                let confirmed = investments::confirm(investment_id, external_ref, &mut *tx)
                    .await?
                    .ok_or(SettlementError::WriteConflict(investment_id))?;
                (confirmed, true)
            },
            status => {
                return Err(SettlementError::InvalidStateTransition(format!(
                    "Investment #{investment_id}: {status} -> Confirmed"
                )))
            },
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn cancel_investment(
        &self,
        investment_id: i64,
        reason: &str,
    ) -> Result<(Investment, bool), SettlementError> {
        let mut tx = self.pool.begin().await?;
        let investment = investments::fetch_investment(investment_id, &mut *tx)
            .await?
            .ok_or(SettlementError::InvestmentNotFound(investment_id))?;
        // Terminal states win. The caller decides whether this is an anomaly worth logging.
        let result = if investment.status.is_terminal() {
            (investment, false)
        } else {
            let cancelled = investments::cancel(investment_id, reason, &mut *tx)
                .await?
                .ok_or(SettlementError::WriteConflict(investment_id))?;
            (cancelled, true)
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn refund_investment(&self, investment_id: i64) -> Result<Investment, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let investment = investments::fetch_investment(investment_id, &mut *tx)
            .await?
            .ok_or(SettlementError::InvestmentNotFound(investment_id))?;
        if investment.status != InvestmentStatus::Confirmed {
            return Err(SettlementError::InvalidStateTransition(format!(
                "Investment #{investment_id}: {} -> Refunded",
                investment.status
            )));
        }
        let refunded = investments::refund(investment_id, &mut *tx)
            .await?
            .ok_or(SettlementError::WriteConflict(investment_id))?;
        tx.commit().await?;
        Ok(refunded)
    }

    async fn advance_project_if_funded(&self, project_id: i64) -> Result<Option<Project>, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let project = projects::fetch_project(project_id, &mut *tx)
            .await?
            .ok_or(SettlementError::ProjectNotFound(project_id))?;
        if !project.status.is_fundable() {
            return Ok(None);
        }
        let total = investments::confirmed_total(project_id, &mut *tx).await?;
        if total < project.funding_goal {
            return Ok(None);
        }
        let advanced = projects::mark_funded(project_id, &mut *tx).await?;
        tx.commit().await?;
        Ok(advanced)
    }

    async fn revert_funding_if_unreleased(&self, project_id: i64) -> Result<Option<Project>, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let project = projects::fetch_project(project_id, &mut *tx)
            .await?
            .ok_or(SettlementError::ProjectNotFound(project_id))?;
        if project.status != ProjectStatus::Funded || project.escrow_released() {
            return Ok(None);
        }
        let total = investments::confirmed_total(project_id, &mut *tx).await?;
        if total >= project.funding_goal {
            return Ok(None);
        }
        let reverted = projects::revert_funded(project_id, &mut *tx).await?;
        tx.commit().await?;
        Ok(reverted)
    }

    async fn settle_escrow(&self, project_id: i64, fee_bps: i64) -> Result<SettlementOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let project = projects::fetch_project(project_id, &mut *tx)
            .await?
            .ok_or(SettlementError::ProjectNotFound(project_id))?;
        if project.escrow_released() {
            return Ok(SettlementOutcome::NotEligible { reason: "escrow has already been released".into() });
        }
        if project.status != ProjectStatus::Funded {
            return Ok(SettlementOutcome::NotEligible {
                reason: format!("project is {}, not Funded", project.status),
            });
        }
        let pledges = investments::confirmed_unreleased(project_id, &mut *tx).await?;
        let total: fsp_common::Cents = pledges.iter().map(|i| i.amount).sum();
        if total < project.funding_goal {
            return Ok(SettlementOutcome::NotEligible {
                reason: format!("confirmed total {total} is below the goal of {}", project.funding_goal),
            });
        }
        let platform_fee = fees::platform_fee(total, fee_bps);
        let net = total - platform_fee;
        let investment_ids = investments::release_escrow(project_id, &mut *tx).await?;
        let project = projects::complete_with_escrow(project_id, net, &mut *tx)
            .await?
            .ok_or(SettlementError::WriteConflict(project_id))?;
        tx.commit().await?;
        debug!("🗃️💰️ Escrow for project #{project_id} settled: {} investments released", investment_ids.len());
        Ok(SettlementOutcome::Settled(SettlementReport { project, investment_ids, total, platform_fee, net }))
    }

    async fn webhook_event_seen(&self, event_id: &str) -> Result<bool, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let seen = webhook_events::event_seen(event_id, &mut conn).await?;
        Ok(seen)
    }

    async fn record_webhook_event(&self, event_id: &str, event_type: &str) -> Result<bool, SettlementError> {
        let mut conn = self.pool.acquire().await?;
        let first_delivery = webhook_events::record_event(event_id, event_type, &mut conn).await?;
        Ok(first_delivery)
    }

    async fn close(&mut self) -> Result<(), SettlementError> {
        self.pool.close().await;
        Ok(())
    }
}
