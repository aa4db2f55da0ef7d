//! Agent roles: read-mostly reference data handed out with a claimed task.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{CoordinationError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRole {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub capabilities: BTreeSet<String>,
    pub updated_at: DateTime<Utc>,
}

/// Role definition as written by `upsert_role`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    pub description: String,
    pub system_prompt: String,
    pub capabilities: BTreeSet<String>,
}

impl RoleDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        system_prompt: impl Into<String>,
        capabilities: &[&str],
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            system_prompt: system_prompt.into(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CoordinationError::validation("role name must not be empty"));
        }
        Ok(())
    }

    pub fn into_role(self, now: DateTime<Utc>) -> AgentRole {
        AgentRole {
            name: self.name,
            description: self.description,
            system_prompt: self.system_prompt,
            capabilities: self.capabilities,
            updated_at: now,
        }
    }
}

/// The four roles a fresh deployment starts with.
pub fn default_roles() -> Vec<RoleDefinition> {
    vec![
        RoleDefinition::new(
            "planner",
            "Designs the work and splits it into tasks. Writes no code.",
            "Study the codebase, then break the goal into small tasks with \
             non-overlapping file scopes and explicit dependencies.",
            &["read_code", "write_specs", "create_tasks"],
        ),
        RoleDefinition::new(
            "coder",
            "Implements the task description within its file scope.",
            "Treat the task description as the brief. Touch only files in the \
             task's file scope and report what you built when completing it.",
            &["read_code", "write_code"],
        ),
        RoleDefinition::new(
            "qa",
            "Writes and runs tests, files bugs as new tasks.",
            "Verify the acceptance criteria of the task under test. File a new \
             task for every defect instead of fixing it yourself.",
            &["read_code", "write_tests", "run_tests", "create_tasks"],
        ),
        RoleDefinition::new(
            "reviewer",
            "Reviews finished work and approves or rejects it.",
            "Check correctness, security and consistency. Complete the task as \
             done to approve or as failed with concrete feedback to reject.",
            &["read_code", "review"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roles_have_unique_names() {
        let roles = default_roles();
        let names: BTreeSet<_> = roles.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names.len(), roles.len());
        assert!(names.contains("coder"));
        assert!(roles.iter().all(|r| r.validate().is_ok()));
    }
}
