//! State - タスクとインスタンスの状態
//!
//! Statuses are closed sum types. Text coming from the store or a caller is
//! parsed with `FromStr`; anything outside the set is a validation error.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::CoordinationError;

/// TaskStatus はタスクの状態を表現
///
/// # 状態遷移
/// - Pending -> Claimed (claim)
/// - Claimed -> InProgress (start, optional)
/// - Claimed | InProgress -> Done | Failed (complete)
/// - Claimed | InProgress -> Pending (stale reclaim)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Claimed,
    InProgress,
    Done,
    Failed,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 5] = [
        TaskStatus::Pending,
        TaskStatus::Claimed,
        TaskStatus::InProgress,
        TaskStatus::Done,
        TaskStatus::Failed,
    ];

    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Done | TaskStatus::Failed)
    }

    /// Does a task in this state carry an assigned instance?
    pub fn holds_claim(self) -> bool {
        matches!(self, TaskStatus::Claimed | TaskStatus::InProgress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Claimed => "claimed",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoordinationError::validation(format!("unknown task status '{s}'")))
    }
}

/// Coarse self-reported status of an instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    Active,
    Idle,
    Busy,
    ShuttingDown,
}

impl InstanceStatus {
    pub const ALL: [InstanceStatus; 4] = [
        InstanceStatus::Active,
        InstanceStatus::Idle,
        InstanceStatus::Busy,
        InstanceStatus::ShuttingDown,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InstanceStatus::Active => "active",
            InstanceStatus::Idle => "idle",
            InstanceStatus::Busy => "busy",
            InstanceStatus::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstanceStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| CoordinationError::validation(format!("unknown instance status '{s}'")))
    }
}

/// How a claim holder finishes a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Done,
    Failed,
}

impl Outcome {
    pub fn status(self) -> TaskStatus {
        match self {
            Outcome::Done => TaskStatus::Done,
            Outcome::Failed => TaskStatus::Failed,
        }
    }
}

impl FromStr for Outcome {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "done" => Ok(Outcome::Done),
            "failed" => Ok(Outcome::Failed),
            other => Err(CoordinationError::validation(format!(
                "unknown outcome '{other}' (expected done or failed)"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(TaskStatus::Pending, false, false)]
    #[case(TaskStatus::Claimed, false, true)]
    #[case(TaskStatus::InProgress, false, true)]
    #[case(TaskStatus::Done, true, false)]
    #[case(TaskStatus::Failed, true, false)]
    fn task_status_classification(
        #[case] status: TaskStatus,
        #[case] terminal: bool,
        #[case] holds_claim: bool,
    ) {
        assert_eq!(status.is_terminal(), terminal);
        assert_eq!(status.holds_claim(), holds_claim);
        assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
    }

    #[test]
    fn unknown_status_is_a_validation_error() {
        let err = "running".parse::<TaskStatus>().unwrap_err();
        assert!(matches!(err, CoordinationError::Validation(_)));

        let err = "asleep".parse::<InstanceStatus>().unwrap_err();
        assert!(matches!(err, CoordinationError::Validation(_)));
    }

    #[test]
    fn instance_status_uses_snake_case() {
        assert_eq!(InstanceStatus::ShuttingDown.to_string(), "shutting_down");
        assert_eq!(
            serde_json::to_string(&InstanceStatus::ShuttingDown).unwrap(),
            "\"shutting_down\""
        );
    }

    #[test]
    fn outcome_maps_to_terminal_status() {
        assert_eq!("done".parse::<Outcome>().unwrap().status(), TaskStatus::Done);
        assert_eq!("failed".parse::<Outcome>().unwrap().status(), TaskStatus::Failed);
        assert!("pending".parse::<Outcome>().is_err());
    }
}
