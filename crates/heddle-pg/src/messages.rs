//! Message bus on `heddle.messages`.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use heddle_core::domain::{CoordinationError, Entity, InboxQuery, Message, MessageId, NewMessage};
use heddle_core::ports::MessageBus;
use heddle_core::Result;

use crate::error::db_err;
use crate::rows::{MESSAGE_COLUMNS, message_from_row};
use crate::store::PgStore;

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

#[async_trait]
impl MessageBus for PgStore {
    async fn send(
        &self,
        new: NewMessage,
        default_ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Message> {
        new.validate()?;
        let expires_at = new.expires_at(default_ttl, now)?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO heddle.messages
                (from_instance, from_project, target_kind, target, message_type,
                 subject, body, is_read, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, FALSE, $8, $9)
            RETURNING {MESSAGE_COLUMNS}
            "#
        ))
        .bind(new.from_instance.as_str())
        .bind(&new.from_project)
        .bind(new.target.kind())
        .bind(new.target.value())
        .bind(new.message_type.as_str())
        .bind(&new.subject)
        .bind(new.body.as_deref())
        .bind(now)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        message_from_row(&row)
    }

    async fn inbox(&self, query: &InboxQuery, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MESSAGE_COLUMNS}
              FROM heddle.messages
             WHERE expires_at > $1
               AND ($2 OR NOT is_read)
               AND (target_kind = 'broadcast'
                    OR (target_kind = 'instance' AND target = $3)
                    OR (target_kind = 'project' AND target = $4))
             ORDER BY created_at DESC, id DESC
             LIMIT $5
            "#
        ))
        .bind(now)
        .bind(query.include_read)
        .bind(query.reader.as_str())
        .bind(&query.project)
        .bind(sql_limit(query.limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(message_from_row).collect()
    }

    async fn mark_read(&self, id: MessageId, now: DateTime<Utc>) -> Result<Message> {
        let row = sqlx::query(&format!(
            "UPDATE heddle.messages SET is_read = TRUE \
             WHERE id = $1 AND expires_at > $2 RETURNING {MESSAGE_COLUMNS}"
        ))
        .bind(id.get())
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;
        match row {
            Some(row) => message_from_row(&row),
            None => Err(CoordinationError::NotFound(Entity::Message(id))),
        }
    }

    async fn recent_messages(&self, limit: usize, now: DateTime<Utc>) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM heddle.messages \
             WHERE expires_at > $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        ))
        .bind(now)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;
        rows.iter().map(message_from_row).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_saturates() {
        assert_eq!(sql_limit(50), 50);
        assert_eq!(sql_limit(usize::MAX), i64::MAX);
    }
}
