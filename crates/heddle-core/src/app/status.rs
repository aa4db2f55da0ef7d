//! Status - ステータスクエリ
//!
//! 詰まり理由の調査用スナップショット（誰が生きていて、何が溜まっているか）。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ActivityEntry, InstanceView, Message, Task, TaskStatus};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskCounts {
    pub pending: usize,
    pub claimed: usize,
    pub in_progress: usize,
    pub done: usize,
    pub failed: usize,
}

impl TaskCounts {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut counts = Self::default();
        for task in tasks {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Claimed => counts.claimed += 1,
                TaskStatus::InProgress => counts.in_progress += 1,
                TaskStatus::Done => counts.done += 1,
                TaskStatus::Failed => counts.failed += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.pending + self.claimed + self.in_progress + self.done + self.failed
    }
}

/// Status は詰まり理由などを説明
///
/// ```ignore
/// let status = coordinator.status().await?;
/// println!("{}", serde_json::to_string_pretty(&status)?);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub generated_at: DateTime<Utc>,
    pub instances: Vec<InstanceView>,
    pub tasks: TaskCounts,
    pub messages: Vec<Message>,
    pub activity: Vec<ActivityEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{InstanceToken, NewTask, Outcome, TaskId};
    use chrono::TimeZone;

    #[test]
    fn counts_every_status() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mk = |id| Task::from_new(TaskId::new(id), NewTask::new("p", "t"), now);
        let pending = mk(1);
        let mut claimed = mk(2);
        claimed.mark_claimed(InstanceToken::new("inst-a"), now);
        let mut done = mk(3);
        done.mark_claimed(InstanceToken::new("inst-a"), now);
        done.mark_finished(Outcome::Done, None, now);

        let counts = TaskCounts::from_tasks([&pending, &claimed, &done]);
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.claimed, 1);
        assert_eq!(counts.done, 1);
        assert_eq!(counts.total(), 3);
    }
}
