//! InstanceRegistry port - インスタンスの生存管理
//!
//! Heartbeat timestamps are supplied by the caller (from its `Clock`) rather
//! than read from the store's own clock, so every implementation ages
//! instances the same way.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{HeartbeatUpdate, Instance, InstanceToken, NewInstance, Result};

#[async_trait]
pub trait InstanceRegistry: Send + Sync {
    /// Insert a fresh record. Registering a token that already exists fails
    /// with `Validation`.
    async fn register(&self, new: NewInstance, now: DateTime<Utc>) -> Result<Instance>;

    /// Touch `last_heartbeat` (never backwards) and apply the optional fields.
    async fn heartbeat(
        &self,
        token: &InstanceToken,
        update: &HeartbeatUpdate,
        now: DateTime<Utc>,
    ) -> Result<Instance>;

    /// Remove the record. Claims it still holds are left for the sweep.
    async fn deregister(&self, token: &InstanceToken) -> Result<Instance>;

    async fn get_instance(&self, token: &InstanceToken) -> Result<Instance>;

    /// Instances whose heartbeat is at or after `since`, freshest first.
    async fn instances_since(&self, since: DateTime<Utc>) -> Result<Vec<Instance>>;
}
