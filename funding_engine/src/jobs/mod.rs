//! Background job machinery.
//!
//! Jobs carry only ids and an attempt counter; all state is re-read from the store when the job
//! fires, so a job enqueued against stale state degrades to a no-op instead of a bad write.
mod runner;
mod scheduler;

pub use runner::{JobRunner, RetryPolicy};
pub use scheduler::{DelayedJobQueue, JobScheduler};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Job {
    /// Asynchronous post-checkout processing of a pledge: confirm it against the gateway session
    /// and re-aggregate project funding.
    ProcessInvestment {
        investment_id: i64,
        external_ref: String,
        attempt: u32,
    },
    /// Release escrow for a fully funded project once the dispute window has passed.
    SettleEscrow { project_id: i64, attempt: u32 },
}

impl Job {
    pub fn attempt(&self) -> u32 {
        match self {
            Job::ProcessInvestment { attempt, .. } => *attempt,
            Job::SettleEscrow { attempt, .. } => *attempt,
        }
    }

    /// The same job, one attempt later.
    pub fn next_attempt(&self) -> Job {
        match self {
            Job::ProcessInvestment { investment_id, external_ref, attempt } => Job::ProcessInvestment {
                investment_id: *investment_id,
                external_ref: external_ref.clone(),
                attempt: attempt + 1,
            },
            Job::SettleEscrow { project_id, attempt } => {
                Job::SettleEscrow { project_id: *project_id, attempt: attempt + 1 }
            },
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Job::ProcessInvestment { investment_id, attempt, .. } => {
                write!(f, "ProcessInvestment(#{investment_id}, attempt {attempt})")
            },
            Job::SettleEscrow { project_id, attempt } => {
                write!(f, "SettleEscrow(project #{project_id}, attempt {attempt})")
            },
        }
    }
}
