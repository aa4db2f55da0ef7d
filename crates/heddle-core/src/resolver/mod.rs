//! Dependency resolver: pure queries over task rows.
//!
//! A pending task is available iff every id in its dependency set refers to
//! a task whose status is `done`. The check is a flat membership test per
//! task; it never walks the graph, so a cyclic or self-referential
//! dependency set simply leaves the task unavailable forever.
//!
//! `graph` builds the full dependency graph, but only for diagnostics
//! (`blocked_tasks`); availability never depends on it. `scope` reports
//! file-scope overlap and is advisory in the same way.

mod availability;
mod graph;
mod scope;

pub use self::availability::{
    AvailableQuery, BlockedTask, available, blocked_tasks, dispatch_order, is_available,
    outstanding_dependencies,
};
pub use self::graph::DependencyGraph;
pub use self::scope::{ScopeOverlap, paths_overlap, scope_overlaps};
