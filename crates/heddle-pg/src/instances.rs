use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heddle_core::domain::{CoordinationError, Entity, HeartbeatUpdate, Instance, InstanceToken, NewInstance};
use heddle_core::ports::InstanceRegistry;
use heddle_core::Result;

use crate::error::db_err;
use crate::rows::{INSTANCE_COLUMNS, instance_from_row};
use crate::store::PgStore;

fn not_found(token: &InstanceToken) -> CoordinationError {
    CoordinationError::NotFound(Entity::Instance(token.clone()))
}

#[async_trait]
impl InstanceRegistry for PgStore {
    async fn register(&self, new: NewInstance, now: DateTime<Utc>) -> Result<Instance> {
        new.validate()?;
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO heddle.instances
                (token, project, working_dir, model, status, started_at, last_heartbeat)
            VALUES ($1, $2, $3, $4, 'active', $5, $5)
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(new.token.as_str())
        .bind(&new.project)
        .bind(&new.working_dir)
        .bind(&new.model)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        instance_from_row(&row)
    }

    async fn heartbeat(
        &self,
        token: &InstanceToken,
        update: &HeartbeatUpdate,
        now: DateTime<Utc>,
    ) -> Result<Instance> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE heddle.instances
               SET last_heartbeat = GREATEST(last_heartbeat, $2),
                   current_task = COALESCE($3, current_task),
                   status = COALESCE($4, status)
             WHERE token = $1
            RETURNING {INSTANCE_COLUMNS}
            "#
        ))
        .bind(token.as_str())
        .bind(now)
        .bind(update.current_task.as_deref())
        .bind(update.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => instance_from_row(&row),
            None => Err(not_found(token)),
        }
    }

    async fn deregister(&self, token: &InstanceToken) -> Result<Instance> {
        let row = sqlx::query(&format!(
            "DELETE FROM heddle.instances WHERE token = $1 RETURNING {INSTANCE_COLUMNS}"
        ))
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => instance_from_row(&row),
            None => Err(not_found(token)),
        }
    }

    async fn get_instance(&self, token: &InstanceToken) -> Result<Instance> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM heddle.instances WHERE token = $1"
        ))
        .bind(token.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => instance_from_row(&row),
            None => Err(not_found(token)),
        }
    }

    async fn instances_since(&self, since: DateTime<Utc>) -> Result<Vec<Instance>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {INSTANCE_COLUMNS}
              FROM heddle.instances
             WHERE last_heartbeat >= $1
             ORDER BY last_heartbeat DESC, token
            "#
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(instance_from_row).collect()
    }
}
