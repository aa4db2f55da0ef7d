//! Dependency graph snapshot used by the blocked-task diagnostic.
//!
//! Built once from the stored rows and then only read. Edges point from a
//! task to the tasks it waits for; `dependents` is the same relation reversed.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::domain::{Task, TaskId};

#[derive(Debug, Default)]
pub struct DependencyGraph {
    waits_for: BTreeMap<TaskId, BTreeSet<TaskId>>,
    dependents: BTreeMap<TaskId, BTreeSet<TaskId>>,
}

impl DependencyGraph {
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut graph = Self::default();
        for task in tasks {
            for dep in &task.depends_on {
                graph.link(task.id, *dep);
            }
        }
        graph
    }

    fn link(&mut self, task: TaskId, waits_for: TaskId) {
        self.waits_for.entry(task).or_default().insert(waits_for);
        self.dependents.entry(waits_for).or_default().insert(task);
    }

    /// Ascending ids of the tasks `task` waits for.
    pub fn dependencies_of(&self, task: TaskId) -> Vec<TaskId> {
        self.waits_for
            .get(&task)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Ascending ids of the tasks that list `task` as a dependency.
    pub fn dependents_of(&self, task: TaskId) -> Vec<TaskId> {
        self.dependents
            .get(&task)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default()
    }

    /// `task` can reach itself by following dependency edges.
    pub fn is_on_cycle(&self, task: TaskId) -> bool {
        let mut seen = HashSet::new();
        let mut frontier = self.dependencies_of(task);
        while let Some(node) = frontier.pop() {
            if node == task {
                return true;
            }
            if seen.insert(node) {
                frontier.extend(self.dependencies_of(node));
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewTask;
    use chrono::Utc;
    use rstest::rstest;

    /// (id, depends_on) の組からグラフを作る
    fn graph(edges: &[(i64, &[i64])]) -> DependencyGraph {
        let tasks: Vec<Task> = edges
            .iter()
            .map(|(id, deps)| {
                let new = NewTask::new("p", format!("t{id}"))
                    .depends_on(deps.iter().map(|d| TaskId::new(*d)));
                Task::from_new(TaskId::new(*id), new, Utc::now())
            })
            .collect();
        DependencyGraph::from_tasks(&tasks)
    }

    #[test]
    fn edges_go_both_ways() {
        let g = graph(&[(1, &[]), (2, &[1]), (3, &[1])]);
        assert_eq!(g.dependencies_of(TaskId::new(2)), vec![TaskId::new(1)]);
        assert_eq!(g.dependents_of(TaskId::new(1)), vec![TaskId::new(2), TaskId::new(3)]);
        assert!(g.dependents_of(TaskId::new(2)).is_empty());
    }

    #[rstest]
    #[case::two_cycle(&[(1, &[2][..]), (2, &[1][..])], &[1, 2], &[])]
    #[case::self_loop(&[(1, &[1][..])], &[1], &[])]
    // 1 は 2->3->4->2 に流れ込むだけ
    #[case::feeder(&[(1, &[2][..]), (2, &[3][..]), (3, &[4][..]), (4, &[2][..])], &[2, 3, 4], &[1])]
    #[case::diamond(&[(1, &[][..]), (2, &[1][..]), (3, &[1][..]), (4, &[2, 3][..])], &[], &[1, 2, 3, 4])]
    fn cycle_membership(
        #[case] edges: &[(i64, &[i64])],
        #[case] on_cycle: &[i64],
        #[case] off_cycle: &[i64],
    ) {
        let g = graph(edges);
        for id in on_cycle {
            assert!(g.is_on_cycle(TaskId::new(*id)), "{id} should be on a cycle");
        }
        for id in off_cycle {
            assert!(!g.is_on_cycle(TaskId::new(*id)), "{id} should not be on a cycle");
        }
    }

    #[test]
    fn unknown_task_has_no_edges() {
        let g = DependencyGraph::default();
        assert!(g.dependencies_of(TaskId::new(9)).is_empty());
        assert!(!g.is_on_cycle(TaskId::new(9)));
    }
}
