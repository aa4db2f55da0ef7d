//! Advisory file-scope overlap between tasks.
//!
//! Scopes are path strings. Two paths overlap when they are equal after
//! normalisation or one is a directory prefix of the other
//! (`src/store` overlaps `src/store/db.rs`, not `src/storage`).

use serde::{Deserialize, Serialize};

use crate::domain::{InstanceToken, Task, TaskId};

/// An in-flight task whose scope touches the scope being checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeOverlap {
    pub task_id: TaskId,
    pub title: String,
    pub holder: Option<InstanceToken>,
    /// Paths of the other task that overlap.
    pub paths: Vec<String>,
}

fn normalize(path: &str) -> &str {
    let path = path.trim();
    let path = path.strip_prefix("./").unwrap_or(path);
    path.trim_end_matches('/')
}

pub fn paths_overlap(a: &str, b: &str) -> bool {
    let (a, b) = (normalize(a), normalize(b));
    if a.is_empty() || b.is_empty() {
        return false;
    }
    let under = |child: &str, parent: &str| {
        child
            .strip_prefix(parent)
            .is_some_and(|rest| rest.starts_with('/'))
    };
    a == b || under(a, b) || under(b, a)
}

/// Claimed or in-progress tasks (other than `task`) whose scope overlaps it.
pub fn scope_overlaps<'a, I>(task: &Task, others: I) -> Vec<ScopeOverlap>
where
    I: IntoIterator<Item = &'a Task>,
{
    if task.file_scope.is_empty() {
        return Vec::new();
    }
    others
        .into_iter()
        .filter(|other| other.id != task.id && other.status.holds_claim())
        .filter_map(|other| {
            let paths: Vec<String> = other
                .file_scope
                .iter()
                .filter(|p| task.file_scope.iter().any(|mine| paths_overlap(mine, p)))
                .cloned()
                .collect();
            (!paths.is_empty()).then(|| ScopeOverlap {
                task_id: other.id,
                title: other.title.clone(),
                holder: other.assigned_instance.clone(),
                paths,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::NewTask;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    #[rstest]
    #[case("src/store", "src/store/db.rs", true)]
    #[case("src/store/", "src/store", true)]
    #[case("./src/lib.rs", "src/lib.rs", true)]
    #[case("src/store", "src/storage", false)]
    #[case("src/a.rs", "src/b.rs", false)]
    #[case("", "src", false)]
    fn overlap_is_prefix_based(#[case] a: &str, #[case] b: &str, #[case] expected: bool) {
        assert_eq!(paths_overlap(a, b), expected);
        assert_eq!(paths_overlap(b, a), expected);
    }

    #[test]
    fn only_in_flight_tasks_are_reported() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let mine = Task::from_new(
            TaskId::new(1),
            NewTask::new("p", "mine").file_scope(["src/store"]),
            now,
        );
        let mut held = Task::from_new(
            TaskId::new(2),
            NewTask::new("p", "held").file_scope(["src/store/db.rs", "README.md"]),
            now,
        );
        held.mark_claimed(InstanceToken::new("inst-b"), now);
        let idle = Task::from_new(
            TaskId::new(3),
            NewTask::new("p", "idle").file_scope(["src/store/mod.rs"]),
            now,
        );

        let overlaps = scope_overlaps(&mine, [&mine, &held, &idle]);
        assert_eq!(overlaps.len(), 1);
        assert_eq!(overlaps[0].task_id, TaskId::new(2));
        assert_eq!(overlaps[0].paths, vec!["src/store/db.rs".to_string()]);
        assert_eq!(overlaps[0].holder, Some(InstanceToken::new("inst-b")));
    }
}
