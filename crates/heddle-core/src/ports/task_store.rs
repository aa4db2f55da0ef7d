//! TaskStore port - タスクの正本（source of truth）
//!
//! # 設計原則
//! - claim / start / complete は単一の条件付き更新（compare-and-set）
//! - 負けた側は `Conflict`、他人の claim を触ろうとした側は `Unauthorized`
//! - 失敗時に内部でリトライしない

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{InstanceToken, NewTask, Outcome, Result, Task, TaskFilter, TaskId};
use crate::resolver::AvailableQuery;

#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a pending task. Fails with `InvalidDependency` when any id in
    /// `depends_on` does not exist; nothing is written in that case.
    async fn create_task(&self, new: NewTask, now: DateTime<Utc>) -> Result<Task>;

    async fn get_task(&self, id: TaskId) -> Result<Task>;

    /// Matching tasks, priority descending then oldest first.
    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>>;

    /// Claimable tasks in dispatch order. Reads only.
    async fn list_available(&self, query: &AvailableQuery) -> Result<Vec<Task>>;

    /// Atomically move a pending task whose dependencies are all done to
    /// claimed by `token`, and mark the instance busy with it.
    ///
    /// Of any number of concurrent claims on one task exactly one succeeds;
    /// the others get `Conflict`.
    async fn claim_task(&self, id: TaskId, token: &InstanceToken, now: DateTime<Utc>)
    -> Result<Task>;

    /// claimed -> in_progress, for the holder only.
    async fn start_task(&self, id: TaskId, token: &InstanceToken, now: DateTime<Utc>)
    -> Result<Task>;

    /// claimed | in_progress -> done | failed, for the holder only. The
    /// holder instance goes back to active with no current task.
    async fn complete_task(
        &self,
        id: TaskId,
        token: &InstanceToken,
        outcome: Outcome,
        result: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Task>;
}
