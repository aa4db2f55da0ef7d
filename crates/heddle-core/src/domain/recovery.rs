//! Stale-claim reclaim and reap thresholds, and what a sweep did.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{CoordinationError, Result};
use super::ids::{InstanceToken, TaskId};

/// Heartbeat-age thresholds driving the recovery sweep.
///
/// `reclaim_after` must be strictly shorter than `reap_after`: a slow worker
/// loses its claims before its registration is ever removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryPolicy {
    pub reclaim_after: Duration,
    pub reap_after: Duration,
    /// Activity entries older than this are pruned by the sweep.
    pub activity_retention: Duration,
}

impl RecoveryPolicy {
    pub fn new(reclaim_after: Duration, reap_after: Duration) -> Result<Self> {
        let policy = Self {
            reclaim_after,
            reap_after,
            ..Self::default()
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.reclaim_after <= Duration::zero() {
            return Err(CoordinationError::validation("reclaim threshold must be positive"));
        }
        if self.reclaim_after >= self.reap_after {
            return Err(CoordinationError::validation(format!(
                "reclaim threshold ({}s) must be shorter than reap threshold ({}s)",
                self.reclaim_after.num_seconds(),
                self.reap_after.num_seconds()
            )));
        }
        if self.activity_retention <= Duration::zero() {
            return Err(CoordinationError::validation("activity retention must be positive"));
        }
        Ok(())
    }

    pub fn with_activity_retention(mut self, retention: Duration) -> Result<Self> {
        self.activity_retention = retention;
        self.validate()?;
        Ok(self)
    }

    pub fn cutoffs(&self, now: DateTime<Utc>) -> SweepCutoffs {
        SweepCutoffs {
            now,
            reclaim_before: now - self.reclaim_after,
            reap_before: now - self.reap_after,
            prune_activity_before: now - self.activity_retention,
        }
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            reclaim_after: Duration::minutes(5),
            reap_after: Duration::hours(2),
            activity_retention: Duration::days(7),
        }
    }
}

/// Absolute cut-off times for one sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepCutoffs {
    pub now: DateTime<Utc>,
    /// Claims held by instances whose heartbeat is older than this are reset.
    pub reclaim_before: DateTime<Utc>,
    /// Instances whose heartbeat is older than this are deleted.
    pub reap_before: DateTime<Utc>,
    pub prune_activity_before: DateTime<Utc>,
}

impl SweepCutoffs {
    /// Note appended to the result of a reclaimed task.
    pub fn reclaim_note(&self, previous: &InstanceToken) -> String {
        format!(
            "[reclaimed at {}: holder {} had no heartbeat since {}]",
            self.now.to_rfc3339(),
            previous,
            self.reclaim_before.to_rfc3339()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReclaimedTask {
    pub task_id: TaskId,
    pub previous_instance: InstanceToken,
}

/// What one sweep changed. Empty when nothing was stale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub reclaimed: Vec<ReclaimedTask>,
    pub reaped: Vec<InstanceToken>,
    pub purged_messages: u64,
    pub pruned_activity: u64,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.reclaimed.is_empty()
            && self.reaped.is_empty()
            && self.purged_messages == 0
            && self.pruned_activity == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn thresholds_must_be_ordered() {
        assert!(RecoveryPolicy::new(Duration::minutes(5), Duration::hours(2)).is_ok());
        assert!(RecoveryPolicy::new(Duration::hours(2), Duration::hours(2)).is_err());
        assert!(RecoveryPolicy::new(Duration::hours(3), Duration::hours(2)).is_err());
        assert!(RecoveryPolicy::new(Duration::zero(), Duration::hours(2)).is_err());
    }

    #[test]
    fn cutoffs_are_relative_to_now() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let cutoffs = RecoveryPolicy::default().cutoffs(now);
        assert_eq!(cutoffs.reclaim_before, now - Duration::minutes(5));
        assert_eq!(cutoffs.reap_before, now - Duration::hours(2));
        assert_eq!(cutoffs.prune_activity_before, now - Duration::days(7));
        assert!(cutoffs.reclaim_note(&InstanceToken::new("inst-x")).contains("inst-x"));
    }

    #[test]
    fn activity_retention_must_be_positive() {
        let policy = RecoveryPolicy::default();
        assert!(policy.with_activity_retention(Duration::zero()).is_err());
        let policy = policy.with_activity_retention(Duration::days(1)).unwrap();
        assert_eq!(policy.activity_retention, Duration::days(1));
    }
}
