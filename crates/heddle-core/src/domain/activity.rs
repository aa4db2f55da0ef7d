//! Activity log: append-only trail of what instances did.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{CoordinationError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Registered,
    Shutdown,
    Claimed,
    Completed,
    Failed,
    Reclaimed,
    Reaped,
    Note,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 8] = [
        ActivityKind::Registered,
        ActivityKind::Shutdown,
        ActivityKind::Claimed,
        ActivityKind::Completed,
        ActivityKind::Failed,
        ActivityKind::Reclaimed,
        ActivityKind::Reaped,
        ActivityKind::Note,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Registered => "registered",
            ActivityKind::Shutdown => "shutdown",
            ActivityKind::Claimed => "claimed",
            ActivityKind::Completed => "completed",
            ActivityKind::Failed => "failed",
            ActivityKind::Reclaimed => "reclaimed",
            ActivityKind::Reaped => "reaped",
            ActivityKind::Note => "note",
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActivityKind {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self> {
        ActivityKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoordinationError::validation(format!("unknown activity kind '{s}'")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewActivity {
    /// Token of the acting instance; `None` for sweeps and humans.
    pub instance: Option<String>,
    pub project: Option<String>,
    pub kind: ActivityKind,
    pub summary: String,
    pub files: Vec<String>,
}

impl NewActivity {
    pub fn new(kind: ActivityKind, summary: impl Into<String>) -> Self {
        Self {
            instance: None,
            project: None,
            kind,
            summary: summary.into(),
            files: Vec::new(),
        }
    }

    pub fn by(mut self, instance: impl Into<String>, project: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self.project = Some(project.into());
        self
    }

    pub fn files(mut self, files: Vec<String>) -> Self {
        self.files = files;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: i64,
    pub instance: Option<String>,
    pub project: Option<String>,
    pub kind: ActivityKind,
    pub summary: String,
    pub files: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn from_new(id: i64, new: NewActivity, now: DateTime<Utc>) -> Self {
        Self {
            id,
            instance: new.instance,
            project: new.project,
            kind: new.kind,
            summary: new.summary,
            files: new.files,
            created_at: now,
        }
    }
}
