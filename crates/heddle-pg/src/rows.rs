//! Row → domain decoding.
//!
//! Column lists are shared between every query that returns the entity so
//! the decoders below always see the same shape.

use chrono::{DateTime, Utc};
use heddle_core::domain::{
    ActivityEntry, AgentRole, Instance, InstanceToken, Message, MessageId, MessageTarget, Task,
    TaskId,
};
use heddle_core::Result;
use sqlx::postgres::PgRow;
use sqlx::{Decode, Postgres, Row, Type};

use crate::error::db_err;

pub(crate) const INSTANCE_COLUMNS: &str =
    "token, project, working_dir, current_task, model, status, started_at, last_heartbeat";

pub(crate) const TASK_COLUMNS: &str = "id, title, description, project, priority, status, \
     assigned_role, assigned_instance, file_scope, depends_on, result, created_by, completed_by, \
     created_at, claimed_at, completed_at";

pub(crate) const MESSAGE_COLUMNS: &str = "id, from_instance, from_project, target_kind, target, \
     message_type, subject, body, is_read, created_at, expires_at";

pub(crate) const ROLE_COLUMNS: &str = "name, description, system_prompt, capabilities, updated_at";

pub(crate) const ACTIVITY_COLUMNS: &str = "id, instance, project, kind, summary, files, created_at";

fn get<'r, T>(row: &'r PgRow, column: &str) -> Result<T>
where
    T: Decode<'r, Postgres> + Type<Postgres>,
{
    row.try_get(column).map_err(db_err)
}

pub(crate) fn instance_from_row(row: &PgRow) -> Result<Instance> {
    let status: String = get(row, "status")?;
    Ok(Instance {
        token: InstanceToken::new(get::<String>(row, "token")?),
        project: get(row, "project")?,
        working_dir: get(row, "working_dir")?,
        current_task: get(row, "current_task")?,
        model: get(row, "model")?,
        status: status.parse()?,
        started_at: get::<DateTime<Utc>>(row, "started_at")?,
        last_heartbeat: get::<DateTime<Utc>>(row, "last_heartbeat")?,
    })
}

pub(crate) fn task_from_row(row: &PgRow) -> Result<Task> {
    let status: String = get(row, "status")?;
    let file_scope: Vec<String> = get(row, "file_scope")?;
    let depends_on: Vec<i64> = get(row, "depends_on")?;
    Ok(Task {
        id: TaskId::new(get(row, "id")?),
        title: get(row, "title")?,
        description: get(row, "description")?,
        project: get(row, "project")?,
        priority: get(row, "priority")?,
        status: status.parse()?,
        assigned_role: get(row, "assigned_role")?,
        assigned_instance: get::<Option<String>>(row, "assigned_instance")?.map(InstanceToken::from),
        file_scope: file_scope.into_iter().collect(),
        depends_on: depends_on.into_iter().map(TaskId::new).collect(),
        result: get(row, "result")?,
        created_by: get(row, "created_by")?,
        completed_by: get::<Option<String>>(row, "completed_by")?.map(InstanceToken::from),
        created_at: get(row, "created_at")?,
        claimed_at: get(row, "claimed_at")?,
        completed_at: get(row, "completed_at")?,
    })
}

pub(crate) fn message_from_row(row: &PgRow) -> Result<Message> {
    let target_kind: String = get(row, "target_kind")?;
    let target: String = get(row, "target")?;
    let message_type: String = get(row, "message_type")?;
    Ok(Message {
        id: MessageId::new(get(row, "id")?),
        from_instance: InstanceToken::new(get::<String>(row, "from_instance")?),
        from_project: get(row, "from_project")?,
        target: MessageTarget::from_parts(&target_kind, &target)?,
        message_type: message_type.parse()?,
        subject: get(row, "subject")?,
        body: get(row, "body")?,
        is_read: get(row, "is_read")?,
        created_at: get(row, "created_at")?,
        expires_at: get(row, "expires_at")?,
    })
}

pub(crate) fn role_from_row(row: &PgRow) -> Result<AgentRole> {
    let capabilities: Vec<String> = get(row, "capabilities")?;
    Ok(AgentRole {
        name: get(row, "name")?,
        description: get(row, "description")?,
        system_prompt: get(row, "system_prompt")?,
        capabilities: capabilities.into_iter().collect(),
        updated_at: get(row, "updated_at")?,
    })
}

pub(crate) fn activity_from_row(row: &PgRow) -> Result<ActivityEntry> {
    let kind: String = get(row, "kind")?;
    Ok(ActivityEntry {
        id: get(row, "id")?,
        instance: get(row, "instance")?,
        project: get(row, "project")?,
        kind: kind.parse()?,
        summary: get(row, "summary")?,
        files: get(row, "files")?,
        created_at: get(row, "created_at")?,
    })
}
