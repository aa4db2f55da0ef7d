//! Coordinator - 操作の表面（facade）
//!
//! Wraps a `CoordinationStore` with the engine's clock and configuration.
//! Store calls decide every outcome; the coordinator adds timestamps,
//! logging, the activity trail and the advisory diagnostics.
//!
//! # 設計原則
//! - 失敗はそのまま呼び出し側へ（内部リトライなし）
//! - activity の記録失敗は操作の失敗にしない（warn のみ）

use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, HeddleConfig};
use crate::domain::{
    ActivityEntry, ActivityKind, AgentRole, CoordinationError, Entity, HeartbeatUpdate,
    InboxQuery, Instance, InstanceToken, InstanceView, Message, MessageId, NewActivity,
    NewInstance, NewMessage, NewTask, Outcome, RecoveryPolicy, Result, RoleDefinition,
    SweepReport, Task, TaskFilter, TaskId, default_roles,
};
use crate::ports::{Clock, CoordinationStore, TokenGenerator, UlidTokenGenerator};
use crate::resolver::{self, AvailableQuery, BlockedTask, ScopeOverlap};

use super::status::{StatusSnapshot, TaskCounts};

/// How many messages / activity entries a status snapshot carries.
const STATUS_RECENT: usize = 20;

/// Successful claim: the task plus what a worker needs to start on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub task: Task,
    /// Role record named by the task, if it names one that exists.
    pub role: Option<AgentRole>,
    /// In-flight tasks whose file scope overlaps. Informational only.
    pub overlaps: Vec<ScopeOverlap>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Settings {
    policy: RecoveryPolicy,
    active_window: Duration,
    message_ttl: Duration,
    inbox_limit: usize,
}

pub struct Coordinator<S: ?Sized, C> {
    store: Arc<S>,
    clock: C,
    tokens: Arc<dyn TokenGenerator>,
    settings: Settings,
}

impl<S, C> Coordinator<S, C>
where
    S: CoordinationStore + ?Sized,
    C: Clock + Clone + 'static,
{
    pub fn new(store: Arc<S>, clock: C, config: &HeddleConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let settings = Settings {
            policy: config.recovery_policy()?,
            active_window: config.active_window_chrono()?,
            message_ttl: config.message_ttl_chrono()?,
            inbox_limit: config.inbox_limit,
        };
        Ok(Self {
            store,
            tokens: Arc::new(UlidTokenGenerator::new(clock.clone())),
            clock,
            settings,
        })
    }
}

impl<S, C> Coordinator<S, C>
where
    S: CoordinationStore + ?Sized,
    C: Clock,
{
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn recovery_policy(&self) -> RecoveryPolicy {
        self.settings.policy
    }

    // ========================================
    // Instance registry
    // ========================================

    /// Register under a freshly generated token.
    pub async fn register(
        &self,
        project: impl Into<String>,
        working_dir: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Instance> {
        let token = self.tokens.generate();
        self.register_as(NewInstance::new(token, project, working_dir, model))
            .await
    }

    /// Register under a caller-supplied token.
    pub async fn register_as(&self, new: NewInstance) -> Result<Instance> {
        let instance = self.store.register(new, self.clock.now()).await?;
        info!(
            instance = %instance.token,
            project = %instance.project,
            model = %instance.model,
            "instance registered"
        );
        self.note(
            NewActivity::new(
                ActivityKind::Registered,
                format!("registered in {}", instance.working_dir),
            )
            .by(instance.token.as_str(), &instance.project),
        )
        .await;
        Ok(instance)
    }

    pub async fn heartbeat(
        &self,
        token: &InstanceToken,
        update: &HeartbeatUpdate,
    ) -> Result<Instance> {
        let instance = self.store.heartbeat(token, update, self.clock.now()).await?;
        debug!(instance = %token, status = %instance.status, "heartbeat");
        Ok(instance)
    }

    pub async fn deregister(&self, token: &InstanceToken) -> Result<Instance> {
        let instance = self.store.deregister(token).await?;
        info!(instance = %token, "instance deregistered");
        self.note(
            NewActivity::new(ActivityKind::Shutdown, "deregistered")
                .by(token.as_str(), &instance.project),
        )
        .await;
        Ok(instance)
    }

    pub async fn get_instance(&self, token: &InstanceToken) -> Result<Instance> {
        self.store.get_instance(token).await
    }

    /// Instances seen within the active window. Display only; claiming never
    /// looks at this.
    pub async fn active_instances(&self) -> Result<Vec<InstanceView>> {
        let now = self.clock.now();
        let instances = self
            .store
            .instances_since(now - self.settings.active_window)
            .await?;
        Ok(instances
            .into_iter()
            .map(|i| InstanceView::new(i, now))
            .collect())
    }

    // ========================================
    // Tasks
    // ========================================

    pub async fn create_task(&self, new: NewTask) -> Result<Task> {
        let task = self.store.create_task(new, self.clock.now()).await?;
        info!(
            task = %task.id,
            project = %task.project,
            priority = task.priority,
            deps = task.depends_on.len(),
            "task created"
        );
        Ok(task)
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.store.get_task(id).await
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        self.store.list_tasks(filter).await
    }

    pub async fn list_available(&self, query: &AvailableQuery) -> Result<Vec<Task>> {
        let tasks = self.store.list_available(query).await?;
        debug!(
            project = ?query.project,
            role = ?query.role,
            count = tasks.len(),
            "available tasks"
        );
        Ok(tasks)
    }

    /// Claim a task for `token`.
    ///
    /// Losing a race is `Conflict`; an unknown task or instance is
    /// `NotFound`. Role and overlap lookups after a successful claim are
    /// best-effort and never undo it.
    pub async fn claim(&self, id: TaskId, token: &InstanceToken) -> Result<Claim> {
        let task = self.store.claim_task(id, token, self.clock.now()).await?;
        info!(task = %task.id, instance = %token, title = %task.title, "task claimed");

        let overlaps = match self.overlaps_for(&task).await {
            Ok(overlaps) => overlaps,
            Err(e) => {
                warn!(task = %task.id, error = %e, "scope overlap check failed");
                Vec::new()
            }
        };
        for overlap in &overlaps {
            warn!(
                task = %task.id,
                other = %overlap.task_id,
                holder = ?overlap.holder.as_ref().map(InstanceToken::as_str),
                paths = ?overlap.paths,
                "file scope overlaps an in-flight task"
            );
        }

        let role = match &task.assigned_role {
            Some(name) => self.store.find_role(name).await.unwrap_or_else(|e| {
                warn!(task = %task.id, role = %name, error = %e, "role lookup failed");
                None
            }),
            None => None,
        };

        self.note(
            NewActivity::new(
                ActivityKind::Claimed,
                format!("claimed {}: {}", task.id, task.title),
            )
            .by(token.as_str(), &task.project)
            .files(task.file_scope.iter().cloned().collect()),
        )
        .await;

        Ok(Claim {
            task,
            role,
            overlaps,
        })
    }

    pub async fn start(&self, id: TaskId, token: &InstanceToken) -> Result<Task> {
        let task = self.store.start_task(id, token, self.clock.now()).await?;
        info!(task = %task.id, instance = %token, "task started");
        Ok(task)
    }

    /// Finish a held task. `Unauthorized` means the claim was lost to a
    /// recovery sweep; the result is not recorded.
    pub async fn complete(
        &self,
        id: TaskId,
        token: &InstanceToken,
        outcome: Outcome,
        result: Option<String>,
    ) -> Result<Task> {
        let task = self
            .store
            .complete_task(id, token, outcome, result, self.clock.now())
            .await
            .inspect_err(|e| {
                if let CoordinationError::Unauthorized { .. } = e {
                    warn!(task = %id, instance = %token, "completion refused: claim no longer held");
                }
            })?;
        info!(task = %task.id, instance = %token, status = %task.status, "task finished");

        let kind = match outcome {
            Outcome::Done => ActivityKind::Completed,
            Outcome::Failed => ActivityKind::Failed,
        };
        self.note(
            NewActivity::new(kind, format!("{} {}: {}", task.status, task.id, task.title))
                .by(token.as_str(), &task.project)
                .files(task.file_scope.iter().cloned().collect()),
        )
        .await;
        Ok(task)
    }

    // ========================================
    // Diagnostics
    // ========================================

    /// Pending tasks held back by dependencies. Never changes state.
    pub async fn blocked_tasks(&self, project: Option<&str>) -> Result<Vec<BlockedTask>> {
        let tasks = self.store.list_tasks(&TaskFilter::default()).await?;
        Ok(resolver::blocked_tasks(&tasks, project))
    }

    /// In-flight tasks of the same project whose scope overlaps task `id`.
    pub async fn scope_overlaps(&self, id: TaskId) -> Result<Vec<ScopeOverlap>> {
        let task = self.store.get_task(id).await?;
        self.overlaps_for(&task).await
    }

    async fn overlaps_for(&self, task: &Task) -> Result<Vec<ScopeOverlap>> {
        if task.file_scope.is_empty() {
            return Ok(Vec::new());
        }
        let siblings = self
            .store
            .list_tasks(&TaskFilter::default().project(&task.project))
            .await?;
        Ok(resolver::scope_overlaps(task, &siblings))
    }

    // ========================================
    // Messages
    // ========================================

    pub async fn send(&self, new: NewMessage) -> Result<Message> {
        let message = self
            .store
            .send(new, self.settings.message_ttl, self.clock.now())
            .await?;
        info!(
            message = %message.id,
            from = %message.from_instance,
            to = %message.target,
            kind = %message.message_type,
            "message sent"
        );
        Ok(message)
    }

    /// Unread messages for the reader, up to the configured limit.
    pub async fn inbox(&self, reader: &InstanceToken, project: &str) -> Result<Vec<Message>> {
        let query = InboxQuery::unread(reader.clone(), project).limit(self.settings.inbox_limit);
        self.inbox_with(&query).await
    }

    pub async fn inbox_with(&self, query: &InboxQuery) -> Result<Vec<Message>> {
        self.store.inbox(query, self.clock.now()).await
    }

    pub async fn mark_read(&self, id: MessageId) -> Result<Message> {
        self.store.mark_read(id, self.clock.now()).await
    }

    // ========================================
    // Roles
    // ========================================

    pub async fn upsert_role(&self, definition: RoleDefinition) -> Result<AgentRole> {
        let role = self.store.upsert_role(definition, self.clock.now()).await?;
        info!(role = %role.name, "role upserted");
        Ok(role)
    }

    pub async fn get_role(&self, name: &str) -> Result<AgentRole> {
        self.store
            .find_role(name)
            .await?
            .ok_or_else(|| CoordinationError::NotFound(Entity::Role(name.to_string())))
    }

    pub async fn list_roles(&self) -> Result<Vec<AgentRole>> {
        self.store.list_roles().await
    }

    /// Upsert planner, coder, qa and reviewer.
    pub async fn seed_default_roles(&self) -> Result<Vec<AgentRole>> {
        let mut seeded = Vec::new();
        for definition in default_roles() {
            seeded.push(self.upsert_role(definition).await?);
        }
        Ok(seeded)
    }

    // ========================================
    // Activity
    // ========================================

    pub async fn log_activity(&self, entry: NewActivity) -> Result<ActivityEntry> {
        self.store.record_activity(entry, self.clock.now()).await
    }

    pub async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        self.store.recent_activity(limit).await
    }

    async fn note(&self, entry: NewActivity) {
        let kind = entry.kind;
        if let Err(e) = self.store.record_activity(entry, self.clock.now()).await {
            warn!(kind = %kind, error = %e, "failed to record activity");
        }
    }

    // ========================================
    // Recovery
    // ========================================

    /// Reclaim stale claims, reap dead instances, purge expired messages.
    /// Idempotent; safe to run from several instances at once.
    pub async fn run_recovery_sweep(&self) -> Result<SweepReport> {
        let cutoffs = self.settings.policy.cutoffs(self.clock.now());
        let report = self.store.sweep(&cutoffs).await?;

        for reclaimed in &report.reclaimed {
            warn!(
                task = %reclaimed.task_id,
                instance = %reclaimed.previous_instance,
                "reclaimed task from stale holder"
            );
            self.note(NewActivity::new(
                ActivityKind::Reclaimed,
                format!(
                    "reclaimed {} from {}",
                    reclaimed.task_id, reclaimed.previous_instance
                ),
            ))
            .await;
        }
        for token in &report.reaped {
            info!(instance = %token, "reaped dead instance");
            self.note(NewActivity::new(ActivityKind::Reaped, format!("reaped {token}")))
                .await;
        }
        if report.purged_messages > 0 {
            debug!(count = report.purged_messages, "purged expired messages");
        }
        if report.pruned_activity > 0 {
            debug!(count = report.pruned_activity, "pruned old activity");
        }
        Ok(report)
    }

    // ========================================
    // Status
    // ========================================

    pub async fn status(&self) -> Result<StatusSnapshot> {
        let now = self.clock.now();
        let instances = self.active_instances().await?;
        let tasks = self.store.list_tasks(&TaskFilter::default()).await?;
        let messages = self.store.recent_messages(STATUS_RECENT, now).await?;
        let activity = self.store.recent_activity(STATUS_RECENT).await?;
        Ok(StatusSnapshot {
            generated_at: now,
            instances,
            tasks: TaskCounts::from_tasks(&tasks),
            messages,
            activity,
        })
    }
}
