//! Role catalog on `heddle.agent_roles`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heddle_core::domain::{AgentRole, RoleDefinition};
use heddle_core::ports::RoleCatalog;
use heddle_core::Result;

use crate::error::db_err;
use crate::rows::{ROLE_COLUMNS, role_from_row};
use crate::store::PgStore;

#[async_trait]
impl RoleCatalog for PgStore {
    async fn upsert_role(&self, definition: RoleDefinition, now: DateTime<Utc>) -> Result<AgentRole> {
        definition.validate()?;
        let capabilities: Vec<String> = definition.capabilities.into_iter().collect();
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO heddle.agent_roles (name, description, system_prompt, capabilities, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name) DO UPDATE
               SET description = EXCLUDED.description,
                   system_prompt = EXCLUDED.system_prompt,
                   capabilities = EXCLUDED.capabilities,
                   updated_at = EXCLUDED.updated_at
            RETURNING {ROLE_COLUMNS}
            "#
        ))
        .bind(&definition.name)
        .bind(&definition.description)
        .bind(&definition.system_prompt)
        .bind(&capabilities)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        role_from_row(&row)
    }

    async fn find_role(&self, name: &str) -> Result<Option<AgentRole>> {
        let row = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM heddle.agent_roles WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        row.as_ref().map(role_from_row).transpose()
    }

    async fn list_roles(&self) -> Result<Vec<AgentRole>> {
        let rows = sqlx::query(&format!(
            "SELECT {ROLE_COLUMNS} FROM heddle.agent_roles ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(role_from_row).collect()
    }
}
