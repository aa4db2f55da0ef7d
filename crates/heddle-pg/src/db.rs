//! Connection pool and settings.
//!
//! Settings come from `HEDDLE_DATABASE_URL` when set, otherwise from the
//! discrete `HEDDLE_DB_HOST/PORT/NAME/USER/PASS` variables.

use std::time::Duration;

use heddle_core::{CoordinationError, Result};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use thiserror::Error;

use crate::error::db_err;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

pub const DATABASE_URL_VAR: &str = "HEDDLE_DATABASE_URL";

#[derive(Debug, Error)]
pub enum PgSettingsError {
    #[error("invalid value for {var}: '{value}'")]
    InvalidVar { var: &'static str, value: String },

    #[error("invalid database url: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgSettings {
    Url(String),
    Parts {
        host: String,
        port: u16,
        database: String,
        user: String,
        password: String,
    },
}

impl PgSettings {
    pub fn from_env() -> Result<Self, PgSettingsError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, PgSettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(DATABASE_URL_VAR).filter(|u| !u.trim().is_empty()) {
            return Ok(Self::Url(url));
        }
        let port = match lookup("HEDDLE_DB_PORT") {
            Some(value) => value.trim().parse().map_err(|_| PgSettingsError::InvalidVar {
                var: "HEDDLE_DB_PORT",
                value,
            })?,
            None => 5432,
        };
        Ok(Self::Parts {
            host: lookup("HEDDLE_DB_HOST").unwrap_or_else(|| "localhost".into()),
            port,
            database: lookup("HEDDLE_DB_NAME").unwrap_or_else(|| "heddle".into()),
            user: lookup("HEDDLE_DB_USER").unwrap_or_else(|| "postgres".into()),
            password: lookup("HEDDLE_DB_PASS").unwrap_or_else(|| "postgres".into()),
        })
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions, PgSettingsError> {
        match self {
            PgSettings::Url(url) => url
                .parse()
                .map_err(|e: sqlx::Error| PgSettingsError::InvalidUrl(e.to_string())),
            PgSettings::Parts {
                host,
                port,
                database,
                user,
                password,
            } => Ok(PgConnectOptions::new()
                .host(host)
                .port(*port)
                .database(database)
                .username(user)
                .password(password)),
        }
    }
}

/// Thin wrapper around the pool shared by every store call.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(settings: &PgSettings) -> Result<Self> {
        let options = settings
            .connect_options()
            .map_err(|e| CoordinationError::Connectivity(e.to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(options)
            .await
            .map_err(db_err)?;
        Ok(Self { pool })
    }

    /// Apply pending schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| CoordinationError::Storage(format!("migration failed: {e}")))?;
        tracing::info!("heddle schema is up to date");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
