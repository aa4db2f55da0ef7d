//! Instance liveness records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{CoordinationError, Result};
use super::ids::InstanceToken;
use super::state::InstanceStatus;

/// Registration request for a new instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewInstance {
    pub token: InstanceToken,
    pub project: String,
    pub working_dir: String,
    pub model: String,
}

impl NewInstance {
    pub fn new(
        token: InstanceToken,
        project: impl Into<String>,
        working_dir: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            token,
            project: project.into(),
            working_dir: working_dir.into(),
            model: model.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.token.as_str().trim().is_empty() {
            return Err(CoordinationError::validation("instance token must not be empty"));
        }
        if self.project.trim().is_empty() {
            return Err(CoordinationError::validation("project must not be empty"));
        }
        Ok(())
    }
}

/// Optional fields a heartbeat may update alongside the timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatUpdate {
    pub current_task: Option<String>,
    pub status: Option<InstanceStatus>,
}

impl HeartbeatUpdate {
    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.current_task = Some(task.into());
        self
    }

    pub fn with_status(mut self, status: InstanceStatus) -> Self {
        self.status = Some(status);
        self
    }
}

/// Liveness record of one registered instance.
///
/// Created by register, mutated by heartbeat (and by claim/complete, which
/// also prove liveness), destroyed by deregister or the reap sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub token: InstanceToken,
    pub project: String,
    pub working_dir: String,
    pub current_task: Option<String>,
    pub model: String,
    pub status: InstanceStatus,
    pub started_at: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
}

impl Instance {
    pub fn register(new: NewInstance, now: DateTime<Utc>) -> Self {
        Self {
            token: new.token,
            project: new.project,
            working_dir: new.working_dir,
            current_task: None,
            model: new.model,
            status: InstanceStatus::Active,
            started_at: now,
            last_heartbeat: now,
        }
    }

    /// Advance the heartbeat. The timestamp never moves backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_heartbeat = self.last_heartbeat.max(now);
    }

    pub fn apply_heartbeat(&mut self, update: &HeartbeatUpdate, now: DateTime<Utc>) {
        self.touch(now);
        if let Some(task) = &update.current_task {
            self.current_task = Some(task.clone());
        }
        if let Some(status) = update.status {
            self.status = status;
        }
    }

    pub fn mark_busy(&mut self, task_title: &str, now: DateTime<Utc>) {
        self.touch(now);
        self.current_task = Some(task_title.to_string());
        self.status = InstanceStatus::Busy;
    }

    pub fn mark_available(&mut self, now: DateTime<Utc>) {
        self.touch(now);
        self.current_task = None;
        self.status = InstanceStatus::Active;
    }

    pub fn heartbeat_age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_heartbeat
    }

    /// Last heartbeat strictly before `cutoff`.
    pub fn heartbeat_before(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_heartbeat < cutoff
    }
}

/// An instance as shown in status views.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceView {
    #[serde(flatten)]
    pub instance: Instance,
    pub seconds_since_heartbeat: i64,
}

impl InstanceView {
    pub fn new(instance: Instance, now: DateTime<Utc>) -> Self {
        let seconds_since_heartbeat = instance.heartbeat_age(now).num_seconds().max(0);
        Self {
            instance,
            seconds_since_heartbeat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn instance() -> Instance {
        Instance::register(
            NewInstance::new(InstanceToken::new("inst-a"), "alpha", "/work/alpha", "opus"),
            t0(),
        )
    }

    #[test]
    fn register_starts_active_with_fresh_heartbeat() {
        let inst = instance();
        assert_eq!(inst.status, InstanceStatus::Active);
        assert_eq!(inst.started_at, t0());
        assert_eq!(inst.last_heartbeat, t0());
        assert!(inst.current_task.is_none());
    }

    #[test]
    fn heartbeat_never_moves_backwards() {
        let mut inst = instance();
        inst.touch(t0() + Duration::minutes(5));
        inst.touch(t0() + Duration::minutes(1));
        assert_eq!(inst.last_heartbeat, t0() + Duration::minutes(5));
    }

    #[test]
    fn heartbeat_updates_optional_fields() {
        let mut inst = instance();
        let update = HeartbeatUpdate::default()
            .with_task("writing docs")
            .with_status(InstanceStatus::Busy);
        inst.apply_heartbeat(&update, t0() + Duration::seconds(30));

        assert_eq!(inst.current_task.as_deref(), Some("writing docs"));
        assert_eq!(inst.status, InstanceStatus::Busy);

        // Fields left out keep their value.
        inst.apply_heartbeat(&HeartbeatUpdate::default(), t0() + Duration::seconds(60));
        assert_eq!(inst.current_task.as_deref(), Some("writing docs"));
    }

    #[test]
    fn heartbeat_cutoff_is_strict() {
        let inst = instance();
        assert!(!inst.heartbeat_before(t0()));
        assert!(inst.heartbeat_before(t0() + Duration::seconds(1)));
    }

    #[test]
    fn empty_project_is_rejected() {
        let new = NewInstance::new(InstanceToken::new("inst-a"), " ", "/", "m");
        assert!(matches!(new.validate(), Err(CoordinationError::Validation(_))));
    }
}
