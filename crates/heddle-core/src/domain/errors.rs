//! Errors - エラー型と分類
//!
//! Every coordination operation fails fast with a `CoordinationError`.
//! Nothing here retries; `ErrorKind` tells the caller's worker loop which
//! next step makes sense.

use std::fmt;

use thiserror::Error;

use super::ids::{InstanceToken, MessageId, TaskId};
use super::state::TaskStatus;

/// ErrorKind は実行エラーの分類
///
/// - Transient: pick another task / try again later
/// - Permanent: stop asking about this entity
/// - Infrastructure: the store is unhealthy, back off
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Permanent,
    Infrastructure,
}

/// Which entity a NotFound refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    Instance(InstanceToken),
    Task(TaskId),
    Message(MessageId),
    Role(String),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entity::Instance(token) => write!(f, "instance {token}"),
            Entity::Task(id) => write!(f, "{id}"),
            Entity::Message(id) => write!(f, "{id}"),
            Entity::Role(name) => write!(f, "role '{name}'"),
        }
    }
}

/// Why a state transition lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Another instance claimed the task first (or it is otherwise not pending).
    NotPending(TaskStatus),
    /// `start` on a task that is not in the claimed state.
    NotClaimed(TaskStatus),
    /// The task is pending but at least one dependency is not done yet.
    DependenciesPending,
    /// The task already reached done/failed.
    Terminal(TaskStatus),
}

impl fmt::Display for ConflictReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictReason::NotPending(status) => write!(f, "task is {status}, not pending"),
            ConflictReason::NotClaimed(status) => write!(f, "task is {status}, not claimed"),
            ConflictReason::DependenciesPending => f.write_str("dependencies are not done"),
            ConflictReason::Terminal(status) => write!(f, "task is already {status}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error("{0} not found")]
    NotFound(Entity),

    #[error("conflict on {task}: {reason}")]
    Conflict { task: TaskId, reason: ConflictReason },

    #[error("{caller} does not hold the claim on {task}")]
    Unauthorized { task: TaskId, caller: InstanceToken },

    #[error("dependencies reference unknown tasks: {missing:?}")]
    InvalidDependency { missing: Vec<TaskId> },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("store unreachable: {0}")]
    Connectivity(String),

    #[error("store error: {0}")]
    Storage(String),
}

impl CoordinationError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinationError::Conflict { .. } => ErrorKind::Transient,
            CoordinationError::NotFound(_)
            | CoordinationError::Unauthorized { .. }
            | CoordinationError::InvalidDependency { .. }
            | CoordinationError::Validation(_) => ErrorKind::Permanent,
            CoordinationError::Connectivity(_) | CoordinationError::Storage(_) => {
                ErrorKind::Infrastructure
            }
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, CoordinationError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoordinationError::NotFound(_))
    }
}

pub type Result<T, E = CoordinationError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_claim_and_missing_task_are_distinguishable() {
        let lost = CoordinationError::Conflict {
            task: TaskId::new(1),
            reason: ConflictReason::NotPending(TaskStatus::Claimed),
        };
        let missing = CoordinationError::NotFound(Entity::Task(TaskId::new(1)));

        assert!(lost.is_conflict());
        assert!(!lost.is_not_found());
        assert!(missing.is_not_found());
        assert_eq!(lost.kind(), ErrorKind::Transient);
        assert_eq!(missing.kind(), ErrorKind::Permanent);
    }

    #[test]
    fn messages_name_the_entity() {
        let err = CoordinationError::NotFound(Entity::Instance(InstanceToken::new("inst-1")));
        assert_eq!(err.to_string(), "instance inst-1 not found");

        let err = CoordinationError::Conflict {
            task: TaskId::new(4),
            reason: ConflictReason::Terminal(TaskStatus::Done),
        };
        assert_eq!(err.to_string(), "conflict on task-4: task is already done");
    }

    #[test]
    fn connectivity_is_infrastructure() {
        let err = CoordinationError::Connectivity("pool timed out".into());
        assert_eq!(err.kind(), ErrorKind::Infrastructure);
    }
}
