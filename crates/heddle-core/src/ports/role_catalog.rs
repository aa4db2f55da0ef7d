//! RoleCatalog port

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AgentRole, Result, RoleDefinition};

#[async_trait]
pub trait RoleCatalog: Send + Sync {
    /// Insert or replace by name.
    async fn upsert_role(&self, definition: RoleDefinition, now: DateTime<Utc>) -> Result<AgentRole>;

    async fn find_role(&self, name: &str) -> Result<Option<AgentRole>>;

    /// All roles ordered by name.
    async fn list_roles(&self) -> Result<Vec<AgentRole>>;
}
