//! In-memory coordination store.
//!
//! 開発・テスト用。すべての状態は 1 つの `Mutex` の内側にあり、各操作は
//! ロックを保持したまま完結する（ロック跨ぎ await しない）。そのため claim は
//! PostgreSQL の条件付き UPDATE と同じく 1 回の不可分な遷移になる。

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use crate::domain::{
    ActivityEntry, AgentRole, CoordinationError, Entity, HeartbeatUpdate, InboxQuery, Instance,
    InstanceToken, Message, MessageId, NewActivity, NewInstance, NewMessage, NewTask, Outcome,
    ReclaimedTask, Result, RoleDefinition, SweepCutoffs, SweepReport, Task, TaskFilter, TaskId,
    TaskStatus,
};
use crate::ports::{ActivityLog, InstanceRegistry, MessageBus, RecoveryStore, RoleCatalog, TaskStore};
use crate::resolver::{self, AvailableQuery};

struct MemoryState {
    instances: HashMap<InstanceToken, Instance>,
    tasks: BTreeMap<TaskId, Task>,
    messages: BTreeMap<MessageId, Message>,
    roles: BTreeMap<String, AgentRole>,
    activity: Vec<ActivityEntry>,
    next_task_id: i64,
    next_message_id: i64,
    next_activity_id: i64,
}

impl MemoryState {
    fn new() -> Self {
        Self {
            instances: HashMap::new(),
            tasks: BTreeMap::new(),
            messages: BTreeMap::new(),
            roles: BTreeMap::new(),
            activity: Vec::new(),
            next_task_id: 1,
            next_message_id: 1,
            next_activity_id: 1,
        }
    }

    fn allocate_task_id(&mut self) -> TaskId {
        let id = TaskId::new(self.next_task_id);
        self.next_task_id += 1;
        id
    }

    fn allocate_message_id(&mut self) -> MessageId {
        let id = MessageId::new(self.next_message_id);
        self.next_message_id += 1;
        id
    }

    fn allocate_activity_id(&mut self) -> i64 {
        let id = self.next_activity_id;
        self.next_activity_id += 1;
        id
    }

    fn status_of(&self, id: TaskId) -> Option<TaskStatus> {
        self.tasks.get(&id).map(|t| t.status)
    }

    fn dependencies_done(&self, task: &Task) -> bool {
        resolver::outstanding_dependencies(task, |id| self.status_of(id)).is_empty()
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut Task> {
        self.tasks
            .get_mut(&id)
            .ok_or(CoordinationError::NotFound(Entity::Task(id)))
    }

    fn instance_mut(&mut self, token: &InstanceToken) -> Result<&mut Instance> {
        self.instances
            .get_mut(token)
            .ok_or_else(|| CoordinationError::NotFound(Entity::Instance(token.clone())))
    }
}

/// Store that keeps everything in process memory.
///
/// Only useful within one process: instances in other processes cannot see
/// it. Used by tests and by the demo driver when no database is configured.
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstanceRegistry for InMemoryStore {
    async fn register(&self, new: NewInstance, now: DateTime<Utc>) -> Result<Instance> {
        new.validate()?;
        let mut state = self.state.lock().await;
        if state.instances.contains_key(&new.token) {
            return Err(CoordinationError::validation(format!(
                "instance token {} is already registered",
                new.token
            )));
        }
        let instance = Instance::register(new, now);
        state.instances.insert(instance.token.clone(), instance.clone());
        Ok(instance)
    }

    async fn heartbeat(
        &self,
        token: &InstanceToken,
        update: &HeartbeatUpdate,
        now: DateTime<Utc>,
    ) -> Result<Instance> {
        let mut state = self.state.lock().await;
        let instance = state.instance_mut(token)?;
        instance.apply_heartbeat(update, now);
        Ok(instance.clone())
    }

    async fn deregister(&self, token: &InstanceToken) -> Result<Instance> {
        let mut state = self.state.lock().await;
        state
            .instances
            .remove(token)
            .ok_or_else(|| CoordinationError::NotFound(Entity::Instance(token.clone())))
    }

    async fn get_instance(&self, token: &InstanceToken) -> Result<Instance> {
        let state = self.state.lock().await;
        state
            .instances
            .get(token)
            .cloned()
            .ok_or_else(|| CoordinationError::NotFound(Entity::Instance(token.clone())))
    }

    async fn instances_since(&self, since: DateTime<Utc>) -> Result<Vec<Instance>> {
        let state = self.state.lock().await;
        let mut out: Vec<Instance> = state
            .instances
            .values()
            .filter(|i| i.last_heartbeat >= since)
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            b.last_heartbeat
                .cmp(&a.last_heartbeat)
                .then_with(|| a.token.cmp(&b.token))
        });
        Ok(out)
    }
}

#[async_trait]
impl TaskStore for InMemoryStore {
    async fn create_task(&self, new: NewTask, now: DateTime<Utc>) -> Result<Task> {
        new.validate()?;
        let mut state = self.state.lock().await;
        let missing: Vec<TaskId> = new
            .depends_on
            .iter()
            .copied()
            .filter(|id| !state.tasks.contains_key(id))
            .collect();
        if !missing.is_empty() {
            return Err(CoordinationError::InvalidDependency { missing });
        }
        let id = state.allocate_task_id();
        let task = Task::from_new(id, new, now);
        state.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Task> {
        let state = self.state.lock().await;
        state
            .tasks
            .get(&id)
            .cloned()
            .ok_or(CoordinationError::NotFound(Entity::Task(id)))
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let state = self.state.lock().await;
        let mut out: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| filter.matches(t))
            .cloned()
            .collect();
        out.sort_by(resolver::dispatch_order);
        Ok(out)
    }

    async fn list_available(&self, query: &AvailableQuery) -> Result<Vec<Task>> {
        let state = self.state.lock().await;
        Ok(resolver::available(state.tasks.values(), query)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn claim_task(
        &self,
        id: TaskId,
        token: &InstanceToken,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get(&id)
            .ok_or(CoordinationError::NotFound(Entity::Task(id)))?;
        if !state.instances.contains_key(token) {
            return Err(CoordinationError::NotFound(Entity::Instance(token.clone())));
        }
        task.check_claimable(state.dependencies_done(task))?;

        let task = state.task_mut(id)?;
        task.mark_claimed(token.clone(), now);
        let claimed = task.clone();
        state.instance_mut(token)?.mark_busy(&claimed.title, now);
        Ok(claimed)
    }

    async fn start_task(
        &self,
        id: TaskId,
        token: &InstanceToken,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        task.check_startable(token)?;
        task.mark_in_progress();
        let started = task.clone();
        if let Some(instance) = state.instances.get_mut(token) {
            instance.touch(now);
        }
        Ok(started)
    }

    async fn complete_task(
        &self,
        id: TaskId,
        token: &InstanceToken,
        outcome: Outcome,
        result: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let mut state = self.state.lock().await;
        let task = state.task_mut(id)?;
        task.check_holder(token)?;
        task.mark_finished(outcome, result, now);
        let finished = task.clone();
        if let Some(instance) = state.instances.get_mut(token) {
            instance.mark_available(now);
        }
        Ok(finished)
    }
}

#[async_trait]
impl MessageBus for InMemoryStore {
    async fn send(
        &self,
        new: NewMessage,
        default_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        new.validate()?;
        let expires_at = new.expires_at(default_ttl, now)?;
        let mut state = self.state.lock().await;
        let id = state.allocate_message_id();
        let message = Message::from_new(id, new, expires_at, now);
        state.messages.insert(id, message.clone());
        Ok(message)
    }

    async fn inbox(&self, query: &InboxQuery, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let state = self.state.lock().await;
        // id 順 = 作成順なので逆順で newest-first
        Ok(state
            .messages
            .values()
            .rev()
            .filter(|m| query.matches(m, now))
            .take(query.limit)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: MessageId, now: DateTime<Utc>) -> Result<Message> {
        let mut state = self.state.lock().await;
        match state.messages.get_mut(&id) {
            Some(message) if !message.is_expired(now) => {
                message.is_read = true;
                Ok(message.clone())
            }
            _ => Err(CoordinationError::NotFound(Entity::Message(id))),
        }
    }

    async fn recent_messages(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let state = self.state.lock().await;
        Ok(state
            .messages
            .values()
            .rev()
            .filter(|m| !m.is_expired(now))
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RoleCatalog for InMemoryStore {
    async fn upsert_role(&self, definition: RoleDefinition, now: DateTime<Utc>) -> Result<AgentRole> {
        definition.validate()?;
        let role = definition.into_role(now);
        let mut state = self.state.lock().await;
        state.roles.insert(role.name.clone(), role.clone());
        Ok(role)
    }

    async fn find_role(&self, name: &str) -> Result<Option<AgentRole>> {
        let state = self.state.lock().await;
        Ok(state.roles.get(name).cloned())
    }

    async fn list_roles(&self) -> Result<Vec<AgentRole>> {
        let state = self.state.lock().await;
        Ok(state.roles.values().cloned().collect())
    }
}

#[async_trait]
impl ActivityLog for InMemoryStore {
    async fn record_activity(&self, entry: NewActivity, now: DateTime<Utc>) -> Result<ActivityEntry> {
        let mut state = self.state.lock().await;
        let id = state.allocate_activity_id();
        let entry = ActivityEntry::from_new(id, entry, now);
        state.activity.push(entry.clone());
        Ok(entry)
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        let state = self.state.lock().await;
        Ok(state.activity.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl RecoveryStore for InMemoryStore {
    async fn sweep(&self, cutoffs: &SweepCutoffs) -> Result<SweepReport> {
        let mut state = self.state.lock().await;
        let MemoryState {
            instances,
            tasks,
            messages,
            activity,
            ..
        } = &mut *state;
        let mut report = SweepReport::default();

        // 1. reclaim: holder が stale、または登録が消えている
        for task in tasks.values_mut().filter(|t| t.status.holds_claim()) {
            let Some(holder) = task.assigned_instance.clone() else {
                continue;
            };
            let stale = instances
                .get(&holder)
                .is_none_or(|i| i.heartbeat_before(cutoffs.reclaim_before));
            if stale {
                task.mark_reclaimed(&cutoffs.reclaim_note(&holder));
                report.reclaimed.push(ReclaimedTask {
                    task_id: task.id,
                    previous_instance: holder,
                });
            }
        }

        // 2. reap
        let mut reaped: Vec<InstanceToken> = instances
            .values()
            .filter(|i| i.heartbeat_before(cutoffs.reap_before))
            .map(|i| i.token.clone())
            .collect();
        reaped.sort();
        for token in &reaped {
            instances.remove(token);
        }
        report.reaped = reaped;

        // 3. purge expired messages
        let before = messages.len();
        messages.retain(|_, m| !m.is_expired(cutoffs.now));
        report.purged_messages = (before - messages.len()) as u64;

        // 4. prune old activity
        let before = activity.len();
        activity.retain(|e| e.created_at >= cutoffs.prune_activity_before);
        report.pruned_activity = (before - activity.len()) as u64;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ActivityKind, MessageTarget, MessageType, RecoveryPolicy};
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn token(name: &str) -> InstanceToken {
        InstanceToken::new(format!("inst-{name}"))
    }

    async fn register(store: &InMemoryStore, name: &str, at: DateTime<Utc>) -> InstanceToken {
        let new = NewInstance::new(token(name), "alpha", "/work", "opus");
        store.register(new, at).await.unwrap().token
    }

    #[tokio::test]
    async fn duplicate_token_is_a_validation_error() {
        let store = InMemoryStore::new();
        register(&store, "a", t0()).await;
        let err = store
            .register(NewInstance::new(token("a"), "alpha", "/work", "opus"), t0())
            .await
            .unwrap_err();
        assert!(matches!(err, CoordinationError::Validation(_)));
    }

    #[tokio::test]
    async fn heartbeat_of_unknown_instance_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .heartbeat(&token("ghost"), &HeartbeatUpdate::default(), t0())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_rejects_unknown_dependencies_without_writing() {
        let store = InMemoryStore::new();
        let err = store
            .create_task(NewTask::new("alpha", "t").depends_on([TaskId::new(7)]), t0())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoordinationError::InvalidDependency { ref missing } if missing == &vec![TaskId::new(7)]
        ));
        assert!(store.list_tasks(&TaskFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_claims_have_exactly_one_winner() {
        let store = Arc::new(InMemoryStore::new());
        let task = store.create_task(NewTask::new("alpha", "hot"), t0()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = Arc::clone(&store);
            let name = format!("w{i}");
            handles.push(tokio::spawn(async move {
                let me = register(&store, &name, t0()).await;
                store.claim_task(task.id, &me, t0()).await
            }));
        }

        let mut wins = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => wins += 1,
                Err(e) if e.is_conflict() => conflicts += 1,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(conflicts, 15);
    }

    #[tokio::test]
    async fn claim_distinguishes_missing_task_from_lost_race() {
        let store = InMemoryStore::new();
        let a = register(&store, "a", t0()).await;
        let b = register(&store, "b", t0()).await;
        let task = store.create_task(NewTask::new("alpha", "t"), t0()).await.unwrap();

        store.claim_task(task.id, &a, t0()).await.unwrap();
        assert!(store.claim_task(task.id, &b, t0()).await.unwrap_err().is_conflict());
        assert!(store.claim_task(TaskId::new(99), &b, t0()).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn claim_marks_instance_busy_and_complete_frees_it() {
        let store = InMemoryStore::new();
        let a = register(&store, "a", t0()).await;
        let task = store.create_task(NewTask::new("alpha", "parser"), t0()).await.unwrap();

        store.claim_task(task.id, &a, t0()).await.unwrap();
        let inst = store.get_instance(&a).await.unwrap();
        assert_eq!(inst.status, crate::domain::InstanceStatus::Busy);
        assert_eq!(inst.current_task.as_deref(), Some("parser"));

        let done = store
            .complete_task(task.id, &a, Outcome::Done, Some("ok".into()), t0())
            .await
            .unwrap();
        assert_eq!(done.completed_by, Some(a.clone()));
        let inst = store.get_instance(&a).await.unwrap();
        assert_eq!(inst.status, crate::domain::InstanceStatus::Active);
        assert!(inst.current_task.is_none());
    }

    #[tokio::test]
    async fn sweep_reclaims_tasks_of_deregistered_holders() {
        let store = InMemoryStore::new();
        let a = register(&store, "a", t0()).await;
        let task = store.create_task(NewTask::new("alpha", "t"), t0()).await.unwrap();
        store.claim_task(task.id, &a, t0()).await.unwrap();
        store.deregister(&a).await.unwrap();

        let report = store.sweep(&RecoveryPolicy::default().cutoffs(t0())).await.unwrap();
        assert_eq!(report.reclaimed.len(), 1);
        assert_eq!(report.reclaimed[0].previous_instance, a);
        let task = store.get_task(task.id).await.unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.assigned_instance.is_none());
    }

    #[tokio::test]
    async fn sweep_purges_expired_messages() {
        let store = InMemoryStore::new();
        let a = register(&store, "a", t0()).await;
        let short = NewMessage::new(a.clone(), "alpha", MessageTarget::Broadcast, MessageType::Info, "short")
            .ttl(Duration::minutes(1));
        let long = NewMessage::new(a.clone(), "alpha", MessageTarget::Broadcast, MessageType::Info, "long");
        store.send(short, Duration::hours(24), t0()).await.unwrap();
        store.send(long, Duration::hours(24), t0()).await.unwrap();

        let later = t0() + Duration::minutes(2);
        let report = store.sweep(&RecoveryPolicy::default().cutoffs(later)).await.unwrap();
        assert_eq!(report.purged_messages, 1);
        assert_eq!(store.recent_messages(10, later).await.unwrap().len(), 1);

        // 2 回目は何もしない
        let again = store.sweep(&RecoveryPolicy::default().cutoffs(later)).await.unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn out_of_range_ttl_fails_without_using_an_id() {
        let store = InMemoryStore::new();
        let a = register(&store, "a", t0()).await;
        let huge = NewMessage::new(a.clone(), "alpha", MessageTarget::Broadcast, MessageType::Info, "huge")
            .ttl(Duration::days(100_000_000));
        let err = store.send(huge, Duration::hours(24), t0()).await.unwrap_err();
        assert!(matches!(err, CoordinationError::Validation(_)));

        let ok = NewMessage::new(a, "alpha", MessageTarget::Broadcast, MessageType::Info, "ok");
        let sent = store.send(ok, Duration::hours(24), t0()).await.unwrap();
        assert_eq!(sent.id, MessageId::new(1));
        assert_eq!(store.recent_messages(10, t0()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn sweep_prunes_activity_past_retention() {
        let store = InMemoryStore::new();
        store
            .record_activity(NewActivity::new(ActivityKind::Note, "old"), t0())
            .await
            .unwrap();
        let later = t0() + Duration::days(8);
        store
            .record_activity(NewActivity::new(ActivityKind::Note, "fresh"), later)
            .await
            .unwrap();

        let report = store.sweep(&RecoveryPolicy::default().cutoffs(later)).await.unwrap();
        assert_eq!(report.pruned_activity, 1);
        let left = store.recent_activity(10).await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].summary, "fresh");
    }
}
