//! Task store and the claim protocol.
//!
//! Claim, start and complete are each one guarded `UPDATE … RETURNING`.
//! Concurrent claimants are serialised by the row lock: the loser's `WHERE`
//! is re-evaluated against the committed row, no longer matches, and the
//! statement returns nothing. Only then is the row re-read to say why.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heddle_core::domain::{
    ConflictReason, CoordinationError, Entity, InstanceToken, NewTask, Outcome, Task, TaskFilter,
    TaskId, TaskStatus,
};
use heddle_core::ports::TaskStore;
use heddle_core::resolver::{self, AvailableQuery};
use heddle_core::Result;
use sqlx::{PgConnection, Row};

use crate::error::db_err;
use crate::rows::{TASK_COLUMNS, task_from_row};
use crate::store::PgStore;

/// True when every dependency of `t` is done. Unknown ids count as not done.
const DEPENDENCIES_DONE: &str = r#"
    NOT EXISTS (
        SELECT 1
          FROM unnest(t.depends_on) AS d(dep_id)
          LEFT JOIN heddle.tasks dep ON dep.id = d.dep_id
         WHERE dep.status IS DISTINCT FROM 'done'
    )"#;

async fn fetch_task(conn: &mut PgConnection, id: TaskId) -> Result<Option<Task>> {
    let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM heddle.tasks WHERE id = $1"))
        .bind(id.get())
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;
    row.as_ref().map(task_from_row).transpose()
}

async fn instance_exists(conn: &mut PgConnection, token: &InstanceToken) -> Result<bool> {
    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM heddle.instances WHERE token = $1)")
        .bind(token.as_str())
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err)
}

async fn dependencies_done(conn: &mut PgConnection, task: &Task) -> Result<bool> {
    if task.depends_on.is_empty() {
        return Ok(true);
    }
    let ids: Vec<i64> = task.depends_on.iter().map(|d| d.get()).collect();
    let rows = sqlx::query("SELECT id, status FROM heddle.tasks WHERE id = ANY($1)")
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err)?;
    let mut statuses = HashMap::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.try_get("id").map_err(db_err)?;
        let status: String = row.try_get("status").map_err(db_err)?;
        statuses.insert(TaskId::new(id), status.parse::<TaskStatus>()?);
    }
    Ok(resolver::outstanding_dependencies(task, |id| statuses.get(&id).copied()).is_empty())
}

/// The row changed between the guarded update and the re-read.
fn raced(task: &Task) -> CoordinationError {
    CoordinationError::Conflict {
        task: task.id,
        reason: ConflictReason::NotPending(task.status),
    }
}

async fn touch_instance(conn: &mut PgConnection, token: &InstanceToken, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE heddle.instances SET last_heartbeat = GREATEST(last_heartbeat, $2) WHERE token = $1",
    )
    .bind(token.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await
    .map_err(db_err)?;
    Ok(())
}

#[async_trait]
impl TaskStore for PgStore {
    async fn create_task(&self, new: NewTask, now: DateTime<Utc>) -> Result<Task> {
        new.validate()?;
        let deps: Vec<i64> = new.depends_on.iter().map(|d| d.get()).collect();
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        if !deps.is_empty() {
            let existing: Vec<i64> =
                sqlx::query_scalar("SELECT id FROM heddle.tasks WHERE id = ANY($1)")
                    .bind(&deps)
                    .fetch_all(&mut *tx)
                    .await
                    .map_err(db_err)?;
            let missing: Vec<TaskId> = new
                .depends_on
                .iter()
                .copied()
                .filter(|d| !existing.contains(&d.get()))
                .collect();
            if !missing.is_empty() {
                return Err(CoordinationError::InvalidDependency { missing });
            }
        }

        let file_scope: Vec<String> = new.file_scope.iter().cloned().collect();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO heddle.tasks
                (title, description, project, priority, status, assigned_role,
                 file_scope, depends_on, created_by, created_at)
            VALUES ($1, $2, $3, $4, 'pending', $5, $6, $7, $8, $9)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(&new.title)
        .bind(new.description.as_deref())
        .bind(&new.project)
        .bind(new.priority)
        .bind(new.assigned_role.as_deref())
        .bind(&file_scope)
        .bind(&deps)
        .bind(&new.created_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;
        let task = task_from_row(&row)?;

        tx.commit().await.map_err(db_err)?;
        Ok(task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Task> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_task(&mut conn, id)
            .await?
            .ok_or(CoordinationError::NotFound(Entity::Task(id)))
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TASK_COLUMNS}
              FROM heddle.tasks
             WHERE ($1::text IS NULL OR project = $1)
               AND ($2::text IS NULL OR status = $2)
               AND ($3::text IS NULL OR assigned_role = $3)
             ORDER BY priority DESC, created_at ASC, id ASC
            "#
        ))
        .bind(filter.project.as_deref())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.role.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(task_from_row).collect()
    }

    async fn list_available(&self, query: &AvailableQuery) -> Result<Vec<Task>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TASK_COLUMNS}
              FROM heddle.tasks t
             WHERE t.status = 'pending'
               AND ($1::text IS NULL OR t.project = $1)
               AND ($2::text IS NULL OR t.assigned_role = $2)
               AND {DEPENDENCIES_DONE}
             ORDER BY t.priority DESC, t.created_at ASC, t.id ASC
            "#
        ))
        .bind(query.project.as_deref())
        .bind(query.role.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(task_from_row).collect()
    }

    async fn claim_task(
        &self,
        id: TaskId,
        token: &InstanceToken,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE heddle.tasks t
               SET status = 'claimed', assigned_instance = $2, claimed_at = $3
             WHERE t.id = $1
               AND t.status = 'pending'
               AND EXISTS (SELECT 1 FROM heddle.instances i WHERE i.token = $2)
               AND {DEPENDENCIES_DONE}
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(token.as_str())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            let task = fetch_task(&mut tx, id)
                .await?
                .ok_or(CoordinationError::NotFound(Entity::Task(id)))?;
            if !instance_exists(&mut tx, token).await? {
                return Err(CoordinationError::NotFound(Entity::Instance(token.clone())));
            }
            let deps_done = dependencies_done(&mut tx, &task).await?;
            task.check_claimable(deps_done)?;
            return Err(raced(&task));
        };
        let task = task_from_row(&row)?;

        sqlx::query(
            r#"
            UPDATE heddle.instances
               SET status = 'busy',
                   current_task = $2,
                   last_heartbeat = GREATEST(last_heartbeat, $3)
             WHERE token = $1
            "#,
        )
        .bind(token.as_str())
        .bind(&task.title)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(task)
    }

    async fn start_task(
        &self,
        id: TaskId,
        token: &InstanceToken,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE heddle.tasks
               SET status = 'in_progress'
             WHERE id = $1 AND status = 'claimed' AND assigned_instance = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(token.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            let task = fetch_task(&mut tx, id)
                .await?
                .ok_or(CoordinationError::NotFound(Entity::Task(id)))?;
            task.check_startable(token)?;
            return Err(raced(&task));
        };
        let task = task_from_row(&row)?;
        touch_instance(&mut tx, token, now).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(task)
    }

    async fn complete_task(
        &self,
        id: TaskId,
        token: &InstanceToken,
        outcome: Outcome,
        result: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Task> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        // SET の右辺はすべて更新前の行を見るので completed_by は元の holder
        let row = sqlx::query(&format!(
            r#"
            UPDATE heddle.tasks
               SET status = $3,
                   result = COALESCE($4, result),
                   completed_at = $5,
                   completed_by = assigned_instance,
                   assigned_instance = NULL
             WHERE id = $1
               AND status IN ('claimed', 'in_progress')
               AND assigned_instance = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id.get())
        .bind(token.as_str())
        .bind(outcome.status().as_str())
        .bind(result.as_deref())
        .bind(now)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            let task = fetch_task(&mut tx, id)
                .await?
                .ok_or(CoordinationError::NotFound(Entity::Task(id)))?;
            task.check_holder(token)?;
            return Err(raced(&task));
        };
        let task = task_from_row(&row)?;

        sqlx::query(
            r#"
            UPDATE heddle.instances
               SET status = 'active',
                   current_task = NULL,
                   last_heartbeat = GREATEST(last_heartbeat, $2)
             WHERE token = $1
            "#,
        )
        .bind(token.as_str())
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(task)
    }
}
