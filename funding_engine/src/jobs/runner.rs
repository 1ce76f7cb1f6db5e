use std::time::Duration;

use log::*;
use tokio::sync::mpsc;

use crate::{
    api::{aggregator_api::FundingAggregatorApi, ledger_api::InvestmentLedgerApi, settlement_api::EscrowSettlementApi},
    events::{EventProducers, SettlementDeadLetterEvent},
    jobs::{Job, JobScheduler},
    traits::{SettlementDatabase, SettlementError},
};

/// Retry and scheduling knobs for the background jobs.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Delay between attempts of an investment processing job.
    pub job_retry: Duration,
    /// Attempts before a processing job gives up and cancels the pledge.
    pub job_max_attempts: u32,
    /// Delay between attempts of a settlement job.
    pub settlement_retry: Duration,
    /// Attempts before a settlement job is dead-lettered.
    pub settlement_max_attempts: u32,
    /// How long escrow stays held after a project reaches its goal.
    pub dispute_window: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            job_retry: Duration::from_secs(60),
            job_max_attempts: 3,
            settlement_retry: Duration::from_secs(3600),
            settlement_max_attempts: 5,
            dispute_window: Duration::from_secs(24 * 3600),
        }
    }
}

/// Drains the job queue and executes each job against the engine APIs.
///
/// Retryable failures go back on the queue with a delay until the attempt budget runs out;
/// exhausted processing jobs cancel the pledge, exhausted settlement jobs raise a dead-letter
/// notification for manual intervention. Non-retryable failures are never re-enqueued.
pub struct JobRunner<B, S> {
    ledger: InvestmentLedgerApi<B>,
    aggregator: FundingAggregatorApi<B>,
    settlement: EscrowSettlementApi<B>,
    scheduler: S,
    policy: RetryPolicy,
    producers: EventProducers,
}

impl<B, S> JobRunner<B, S>
where
    B: SettlementDatabase + Send + Sync + 'static,
    S: JobScheduler,
{
    pub fn new(
        ledger: InvestmentLedgerApi<B>,
        aggregator: FundingAggregatorApi<B>,
        settlement: EscrowSettlementApi<B>,
        scheduler: S,
        policy: RetryPolicy,
        producers: EventProducers,
    ) -> Self {
        Self { ledger, aggregator, settlement, scheduler, policy, producers }
    }

    /// Runs until the last scheduler handle is dropped and the queue drains.
    pub async fn run(self, mut jobs: mpsc::Receiver<Job>) {
        info!("🕰️ Job runner started");
        while let Some(job) = jobs.recv().await {
            debug!("🕰️ Executing {job}");
            self.execute(job).await;
        }
        info!("🕰️ Job runner has shut down");
    }

    async fn execute(&self, job: Job) {
        match &job {
            Job::ProcessInvestment { investment_id, external_ref, attempt } => {
                match self.process_investment(*investment_id, external_ref).await {
                    Ok(()) => {},
                    Err(e) if e.is_retryable() && *attempt < self.policy.job_max_attempts => {
                        warn!("🕰️ {job} failed ({e}), retrying in {}s", self.policy.job_retry.as_secs());
                        self.scheduler.enqueue_after(job.next_attempt(), self.policy.job_retry);
                    },
                    Err(e) if e.is_retryable() => {
                        error!("🕰️ {job} exhausted its {} attempts: {e}", self.policy.job_max_attempts);
                        let reason = format!("Payment processing failed after {attempt} attempts: {e}");
                        if let Err(e) = self.ledger.fail_with_notification(*investment_id, &reason).await {
                            error!("🕰️ Could not cancel investment #{investment_id} after exhausted retries: {e}");
                        }
                    },
                    Err(e) => {
                        warn!("🕰️ {job} dropped: {e}");
                    },
                }
            },
            Job::SettleEscrow { project_id, attempt } => match self.settlement.settle(*project_id).await {
                Ok(_) => {},
                Err(e) if e.is_retryable() && *attempt < self.policy.settlement_max_attempts => {
                    warn!("🕰️ {job} failed ({e}), retrying in {}s", self.policy.settlement_retry.as_secs());
                    self.scheduler.enqueue_after(job.next_attempt(), self.policy.settlement_retry);
                },
                Err(e) => {
                    error!("🕰️ {job} dead-lettered: {e}");
                    for emitter in &self.producers.settlement_dead_letter {
                        emitter
                            .publish_event(SettlementDeadLetterEvent {
                                project_id: *project_id,
                                attempts: *attempt,
                                error: e.to_string(),
                            })
                            .await;
                    }
                },
            },
        }
    }

    /// Confirms the pledge against its gateway session, then re-aggregates project funding. If the
    /// project just reached its goal, escrow settlement is scheduled for after the dispute window.
    async fn process_investment(&self, investment_id: i64, external_ref: &str) -> Result<(), SettlementError> {
        let (investment, applied) = self.ledger.confirm(investment_id, external_ref).await?;
        if !applied {
            return Ok(());
        }
        if let Some(project) = self.aggregator.advance_status_if_funded(investment.project_id).await? {
            self.scheduler
                .enqueue_after(Job::SettleEscrow { project_id: project.id, attempt: 1 }, self.policy.dispute_window);
        }
        Ok(())
    }
}
