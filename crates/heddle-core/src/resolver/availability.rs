use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::DependencyGraph;
use crate::domain::{Task, TaskId, TaskStatus};

/// Parameters of `list_available`. `None` means "any".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableQuery {
    pub project: Option<String>,
    pub role: Option<String>,
}

impl AvailableQuery {
    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    fn matches(&self, task: &Task) -> bool {
        self.project.as_ref().is_none_or(|p| &task.project == p)
            && self
                .role
                .as_ref()
                .is_none_or(|r| task.assigned_role.as_ref() == Some(r))
    }
}

/// Pending and every dependency done. Unknown dependencies count as not done.
pub fn is_available<F>(task: &Task, status_of: F) -> bool
where
    F: Fn(TaskId) -> Option<TaskStatus>,
{
    task.status == TaskStatus::Pending
        && task
            .depends_on
            .iter()
            .all(|dep| status_of(*dep) == Some(TaskStatus::Done))
}

/// Dependencies of `task` that are not done yet (including unknown ids).
pub fn outstanding_dependencies<F>(task: &Task, status_of: F) -> Vec<TaskId>
where
    F: Fn(TaskId) -> Option<TaskStatus>,
{
    task.depends_on
        .iter()
        .copied()
        .filter(|dep| status_of(*dep) != Some(TaskStatus::Done))
        .collect()
}

/// Priority descending, then FIFO by creation time, then by id.
pub fn dispatch_order(a: &Task, b: &Task) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Claimable subset of `tasks`, in dispatch order.
pub fn available<'a, I>(tasks: I, query: &AvailableQuery) -> Vec<&'a Task>
where
    I: IntoIterator<Item = &'a Task>,
{
    let tasks: Vec<&Task> = tasks.into_iter().collect();
    let statuses: HashMap<TaskId, TaskStatus> = tasks.iter().map(|t| (t.id, t.status)).collect();

    let mut out: Vec<&Task> = tasks
        .into_iter()
        .filter(|t| query.matches(t))
        .filter(|t| is_available(t, |id| statuses.get(&id).copied()))
        .collect();
    out.sort_by(|a, b| dispatch_order(a, b));
    out
}

/// A pending task that is not claimable, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedTask {
    pub task_id: TaskId,
    pub title: String,
    /// Dependencies that exist but are not done.
    pub waiting_on: Vec<TaskId>,
    /// Dependencies that reference no stored task.
    pub missing: Vec<TaskId>,
    /// Tasks that list this one as a dependency.
    pub blocking: Vec<TaskId>,
    /// The task can reach itself through its dependencies.
    pub cyclic: bool,
}

/// Pending tasks held back by dependencies, in dispatch order.
pub fn blocked_tasks<'a, I>(tasks: I, project: Option<&str>) -> Vec<BlockedTask>
where
    I: IntoIterator<Item = &'a Task>,
{
    let tasks: Vec<&Task> = tasks.into_iter().collect();
    let statuses: HashMap<TaskId, TaskStatus> = tasks.iter().map(|t| (t.id, t.status)).collect();

    let graph = DependencyGraph::from_tasks(tasks.iter().copied());

    let mut pending: Vec<&Task> = tasks
        .into_iter()
        .filter(|t| t.status == TaskStatus::Pending)
        .filter(|t| project.is_none_or(|p| t.project == p))
        .filter(|t| !is_available(t, |id| statuses.get(&id).copied()))
        .collect();
    pending.sort_by(|a, b| dispatch_order(a, b));

    pending
        .into_iter()
        .map(|task| {
            let outstanding = outstanding_dependencies(task, |id| statuses.get(&id).copied());
            let (waiting_on, missing): (Vec<TaskId>, Vec<TaskId>) = outstanding
                .into_iter()
                .partition(|id| statuses.contains_key(id));
            let blocking = graph.dependents_of(task.id);
            BlockedTask {
                task_id: task.id,
                title: task.title.clone(),
                waiting_on,
                missing,
                blocking,
                cyclic: graph.is_on_cycle(task.id),
            }
        })
        .collect()
}
