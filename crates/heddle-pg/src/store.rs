//! PgStore - PostgreSQL が実装する正本（source of truth）
//!
//! Implements every coordination port. The per-port impls live in sibling
//! modules (`instances`, `tasks`, `messages`, `roles`, `activity`,
//! `recovery`).

use sqlx::postgres::PgPool;

use crate::db::Database;

pub struct PgStore {
    pub(crate) pool: PgPool,
}

impl PgStore {
    pub fn new(database: &Database) -> Self {
        Self {
            pool: database.pool().clone(),
        }
    }
}
