//! Append-only activity log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heddle_core::domain::{ActivityEntry, NewActivity};
use heddle_core::ports::ActivityLog;
use heddle_core::Result;

use crate::error::db_err;
use crate::rows::{ACTIVITY_COLUMNS, activity_from_row};
use crate::store::PgStore;

#[async_trait]
impl ActivityLog for PgStore {
    async fn record_activity(&self, entry: NewActivity, now: DateTime<Utc>) -> Result<ActivityEntry> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO heddle.activity_log (instance, project, kind, summary, files, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ACTIVITY_COLUMNS}
            "#
        ))
        .bind(entry.instance.as_deref())
        .bind(entry.project.as_deref())
        .bind(entry.kind.as_str())
        .bind(&entry.summary)
        .bind(&entry.files)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        activity_from_row(&row)
    }

    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACTIVITY_COLUMNS} FROM heddle.activity_log ORDER BY id DESC LIMIT $1"
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(activity_from_row).collect()
    }
}
