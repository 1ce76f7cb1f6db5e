use chrono::{DateTime, Utc};
use fsp_common::Cents;
use serde::{Deserialize, Serialize};

//--------------------------------------   FundingSnapshot   ---------------------------------------------------------
/// The derived funding state of a project. Never stored; recomputed from confirmed investments on
/// every call so that concurrent confirmations can never leave a stale total behind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingSnapshot {
    pub project_id: i64,
    pub total_raised: Cents,
    pub funding_goal: Cents,
    /// `total_raised / funding_goal`, as a percentage with two decimals of precision.
    pub percentage: f64,
    pub fully_funded: bool,
    /// Whole days until the funding deadline, clamped at zero.
    pub days_remaining: i64,
}

impl FundingSnapshot {
    pub fn compute(
        project_id: i64,
        total_raised: Cents,
        funding_goal: Cents,
        funding_deadline: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let percentage = if funding_goal.value() == 0 {
            0.0
        } else {
            // Integer math first so that round percentages come out exact.
            (total_raised.value() * 10_000 / funding_goal.value()) as f64 / 100.0
        };
        let fully_funded = total_raised >= funding_goal;
        let days_remaining = (funding_deadline.date_naive() - now.date_naive()).num_days().max(0);
        Self { project_id, total_raised, funding_goal, percentage, fully_funded, days_remaining }
    }
}

#[cfg(test)]
mod test {
    use chrono::Duration;

    use super::*;

    #[test]
    fn snapshot_over_goal() {
        let now = Utc::now();
        let snap =
            FundingSnapshot::compute(1, Cents::from_dollars(1100), Cents::from_dollars(1000), now + Duration::days(10), now);
        assert_eq!(snap.percentage, 110.0);
        assert!(snap.fully_funded);
        assert_eq!(snap.days_remaining, 10);
    }

    #[test]
    fn snapshot_under_goal() {
        let now = Utc::now();
        let snap =
            FundingSnapshot::compute(1, Cents::from_dollars(600), Cents::from_dollars(1000), now - Duration::days(1), now);
        assert_eq!(snap.percentage, 60.0);
        assert!(!snap.fully_funded);
        assert_eq!(snap.days_remaining, 0);
    }

    #[test]
    fn exactly_at_goal_is_fully_funded() {
        let now = Utc::now();
        let snap =
            FundingSnapshot::compute(1, Cents::from_dollars(1000), Cents::from_dollars(1000), now + Duration::days(1), now);
        assert!(snap.fully_funded);
        assert_eq!(snap.percentage, 100.0);
    }
}
