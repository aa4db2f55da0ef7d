//! Task records and their state machine.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{ConflictReason, CoordinationError, Result};
use super::ids::{InstanceToken, TaskId};
use super::state::{Outcome, TaskStatus};

/// Creator recorded when no instance token is available.
pub const HUMAN_CREATOR: &str = "human";

/// Request to create a task. Every id in `depends_on` must already exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub project: String,
    pub priority: i32,
    pub assigned_role: Option<String>,
    pub file_scope: BTreeSet<String>,
    pub depends_on: BTreeSet<TaskId>,
    pub created_by: String,
}

impl NewTask {
    pub fn new(project: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            project: project.into(),
            priority: 0,
            assigned_role: None,
            file_scope: BTreeSet::new(),
            depends_on: BTreeSet::new(),
            created_by: HUMAN_CREATOR.to_string(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.assigned_role = Some(role.into());
        self
    }

    pub fn file_scope<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.file_scope.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn depends_on(mut self, ids: impl IntoIterator<Item = TaskId>) -> Self {
        self.depends_on.extend(ids);
        self
    }

    pub fn created_by(mut self, creator: impl Into<String>) -> Self {
        self.created_by = creator.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.title.trim().is_empty() {
            return Err(CoordinationError::validation("task title must not be empty"));
        }
        if self.project.trim().is_empty() {
            return Err(CoordinationError::validation("task project must not be empty"));
        }
        Ok(())
    }
}

/// Durable record of one dispatchable work item.
///
/// Invariant: `assigned_instance.is_some()` iff `status.holds_claim()`.
/// All transitions go through the methods below so the invariant holds in
/// every store implementation that uses them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub description: Option<String>,
    pub project: String,
    pub priority: i32,
    pub status: TaskStatus,
    pub assigned_role: Option<String>,
    pub assigned_instance: Option<InstanceToken>,
    pub file_scope: BTreeSet<String>,
    pub depends_on: BTreeSet<TaskId>,
    pub result: Option<String>,
    pub created_by: String,
    pub completed_by: Option<InstanceToken>,
    pub created_at: DateTime<Utc>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn from_new(id: TaskId, new: NewTask, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: new.title,
            description: new.description,
            project: new.project,
            priority: new.priority,
            status: TaskStatus::Pending,
            assigned_role: new.assigned_role,
            assigned_instance: None,
            file_scope: new.file_scope,
            depends_on: new.depends_on,
            result: None,
            created_by: new.created_by,
            completed_by: None,
            created_at: now,
            claimed_at: None,
            completed_at: None,
        }
    }

    pub fn is_held_by(&self, token: &InstanceToken) -> bool {
        self.status.holds_claim() && self.assigned_instance.as_ref() == Some(token)
    }

    /// Pending -> Claimed.
    pub fn mark_claimed(&mut self, token: InstanceToken, now: DateTime<Utc>) {
        self.status = TaskStatus::Claimed;
        self.assigned_instance = Some(token);
        self.claimed_at = Some(now);
    }

    /// Claimed -> InProgress.
    pub fn mark_in_progress(&mut self) {
        self.status = TaskStatus::InProgress;
    }

    /// Claimed | InProgress -> Done | Failed.
    pub fn mark_finished(&mut self, outcome: Outcome, result: Option<String>, now: DateTime<Utc>) {
        self.status = outcome.status();
        self.completed_by = self.assigned_instance.take();
        if result.is_some() {
            self.result = result;
        }
        self.completed_at = Some(now);
    }

    /// Can this task be claimed right now? `deps_done` is whether every
    /// dependency is done.
    pub fn check_claimable(&self, deps_done: bool) -> Result<()> {
        if self.status != TaskStatus::Pending {
            return Err(self.conflict(ConflictReason::NotPending(self.status)));
        }
        if !deps_done {
            return Err(self.conflict(ConflictReason::DependenciesPending));
        }
        Ok(())
    }

    /// May `token` finish this task? Terminal wins over holder mismatch so a
    /// repeated completion reads as a conflict, not a lost claim.
    pub fn check_holder(&self, token: &InstanceToken) -> Result<()> {
        if self.status.is_terminal() {
            return Err(self.conflict(ConflictReason::Terminal(self.status)));
        }
        if !self.is_held_by(token) {
            return Err(CoordinationError::Unauthorized {
                task: self.id,
                caller: token.clone(),
            });
        }
        Ok(())
    }

    /// May `token` move this task to in_progress?
    pub fn check_startable(&self, token: &InstanceToken) -> Result<()> {
        self.check_holder(token)?;
        if self.status != TaskStatus::Claimed {
            return Err(self.conflict(ConflictReason::NotClaimed(self.status)));
        }
        Ok(())
    }

    fn conflict(&self, reason: ConflictReason) -> CoordinationError {
        CoordinationError::Conflict {
            task: self.id,
            reason,
        }
    }

    /// Claimed | InProgress -> Pending, keeping a note of who lost it.
    pub fn mark_reclaimed(&mut self, note: &str) {
        self.status = TaskStatus::Pending;
        self.assigned_instance = None;
        self.claimed_at = None;
        self.result = Some(annotate(self.result.take(), note));
    }
}

/// Append a line to an optional result text.
pub fn annotate(result: Option<String>, note: &str) -> String {
    match result {
        Some(existing) if !existing.is_empty() => format!("{existing}\n{note}"),
        _ => note.to_string(),
    }
}

/// Filter for listing tasks. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFilter {
    pub project: Option<String>,
    pub status: Option<TaskStatus>,
    pub role: Option<String>,
}

impl TaskFilter {
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        self.project.as_ref().is_none_or(|p| &task.project == p)
            && self.status.is_none_or(|s| task.status == s)
            && self
                .role
                .as_ref()
                .is_none_or(|r| task.assigned_role.as_ref() == Some(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn task() -> Task {
        Task::from_new(TaskId::new(1), NewTask::new("alpha", "write parser"), now())
    }

    #[test]
    fn new_task_is_pending_and_unassigned() {
        let t = task();
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.assigned_instance.is_none());
        assert_eq!(t.created_by, HUMAN_CREATOR);
    }

    #[test]
    fn assignment_tracks_claim_holding_states() {
        let token = InstanceToken::new("inst-a");
        let mut t = task();

        t.mark_claimed(token.clone(), now());
        assert!(t.is_held_by(&token));

        t.mark_in_progress();
        assert!(t.is_held_by(&token));

        t.mark_finished(Outcome::Done, Some("ok".into()), now());
        assert_eq!(t.status, TaskStatus::Done);
        assert!(t.assigned_instance.is_none());
        assert_eq!(t.completed_by, Some(token.clone()));
        assert!(!t.is_held_by(&token));
    }

    #[test]
    fn reclaim_resets_and_annotates() {
        let mut t = task();
        t.result = Some("partial notes".into());
        t.mark_claimed(InstanceToken::new("inst-a"), now());
        t.mark_reclaimed("reclaimed from inst-a");

        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.assigned_instance.is_none());
        assert!(t.claimed_at.is_none());
        assert_eq!(t.result.as_deref(), Some("partial notes\nreclaimed from inst-a"));
    }

    #[test]
    fn filter_matches_on_all_given_fields() {
        let mut t = task();
        t.assigned_role = Some("coder".into());

        assert!(TaskFilter::default().matches(&t));
        assert!(TaskFilter::default().project("alpha").role("coder").matches(&t));
        assert!(!TaskFilter::default().project("beta").matches(&t));
        assert!(!TaskFilter::default().status(TaskStatus::Done).matches(&t));
        assert!(!TaskFilter::default().role("qa").matches(&t));
    }

    #[test]
    fn guards_classify_refusals() {
        let holder = InstanceToken::new("inst-a");
        let other = InstanceToken::new("inst-b");
        let mut t = task();

        assert!(t.check_claimable(true).is_ok());
        assert!(matches!(
            t.check_claimable(false),
            Err(CoordinationError::Conflict { reason: ConflictReason::DependenciesPending, .. })
        ));
        assert!(matches!(t.check_holder(&holder), Err(CoordinationError::Unauthorized { .. })));

        t.mark_claimed(holder.clone(), now());
        assert!(t.check_claimable(true).unwrap_err().is_conflict());
        assert!(t.check_startable(&holder).is_ok());
        assert!(matches!(t.check_holder(&other), Err(CoordinationError::Unauthorized { .. })));

        t.mark_in_progress();
        assert!(t.check_startable(&holder).unwrap_err().is_conflict());

        t.mark_finished(Outcome::Failed, None, now());
        assert!(matches!(
            t.check_holder(&holder),
            Err(CoordinationError::Conflict { reason: ConflictReason::Terminal(TaskStatus::Failed), .. })
        ));
    }

    #[test]
    fn blank_title_is_rejected() {
        assert!(NewTask::new("alpha", "").validate().is_err());
        assert!(NewTask::new("", "title").validate().is_err());
        assert!(NewTask::new("alpha", "title").validate().is_ok());
    }
}
