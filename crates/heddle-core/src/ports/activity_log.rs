//! ActivityLog port - 作業履歴（append-only）

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{ActivityEntry, NewActivity, Result};

#[async_trait]
pub trait ActivityLog: Send + Sync {
    async fn record_activity(&self, entry: NewActivity, now: DateTime<Utc>) -> Result<ActivityEntry>;

    /// Newest first.
    async fn recent_activity(&self, limit: usize) -> Result<Vec<ActivityEntry>>;
}
