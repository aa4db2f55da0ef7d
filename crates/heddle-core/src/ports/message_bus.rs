//! MessageBus port - インスタンス間メッセージ

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::domain::{InboxQuery, Message, MessageId, NewMessage, Result};

#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Store a message. `default_ttl` applies when the message carries none.
    async fn send(&self, new: NewMessage, default_ttl: Duration, now: DateTime<Utc>)
    -> Result<Message>;

    /// Unexpired messages addressed to the reader, newest first.
    async fn inbox(&self, query: &InboxQuery, now: DateTime<Utc>) -> Result<Vec<Message>>;

    /// Set the read flag. Unknown or expired ids are `NotFound`.
    async fn mark_read(&self, id: MessageId, now: DateTime<Utc>) -> Result<Message>;

    /// Unexpired messages regardless of target, newest first.
    async fn recent_messages(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Message>>;
}
