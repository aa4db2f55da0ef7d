//! Addressed, expiring notices between instances.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::{CoordinationError, Result};
use super::ids::{InstanceToken, MessageId};

/// Textual form of the broadcast target.
pub const BROADCAST_MARKER: &str = "@all";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Info,
    Warning,
    Blocker,
    Request,
    Done,
}

impl MessageType {
    pub const ALL: [MessageType; 5] = [
        MessageType::Info,
        MessageType::Warning,
        MessageType::Blocker,
        MessageType::Request,
        MessageType::Done,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Info => "info",
            MessageType::Warning => "warning",
            MessageType::Blocker => "blocker",
            MessageType::Request => "request",
            MessageType::Done => "done",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = CoordinationError;

    fn from_str(s: &str) -> Result<Self> {
        MessageType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CoordinationError::validation(format!("unknown message type '{s}'")))
    }
}

/// Who a message is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum MessageTarget {
    Broadcast,
    Instance(InstanceToken),
    Project(String),
}

impl MessageTarget {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageTarget::Broadcast => "broadcast",
            MessageTarget::Instance(_) => "instance",
            MessageTarget::Project(_) => "project",
        }
    }

    /// The stored address value; the broadcast marker for broadcasts.
    pub fn value(&self) -> &str {
        match self {
            MessageTarget::Broadcast => BROADCAST_MARKER,
            MessageTarget::Instance(token) => token.as_str(),
            MessageTarget::Project(project) => project,
        }
    }

    /// Rebuild a target from its stored `(kind, value)` pair.
    pub fn from_parts(kind: &str, value: &str) -> Result<Self> {
        match kind {
            "broadcast" => Ok(MessageTarget::Broadcast),
            "instance" => Ok(MessageTarget::Instance(InstanceToken::new(value))),
            "project" => Ok(MessageTarget::Project(value.to_string())),
            other => Err(CoordinationError::validation(format!(
                "unknown message target kind '{other}'"
            ))),
        }
    }

    /// Is a reader with this token and project addressed by this target?
    pub fn addresses(&self, token: &InstanceToken, project: &str) -> bool {
        match self {
            MessageTarget::Broadcast => true,
            MessageTarget::Instance(target) => target == token,
            MessageTarget::Project(target) => target == project,
        }
    }
}

impl fmt::Display for MessageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

/// A message as submitted by its sender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub from_instance: InstanceToken,
    pub from_project: String,
    pub target: MessageTarget,
    pub message_type: MessageType,
    pub subject: String,
    pub body: Option<String>,
    /// Time to live; the configured default applies when `None`.
    pub ttl: Option<Duration>,
}

impl NewMessage {
    pub fn new(
        from_instance: InstanceToken,
        from_project: impl Into<String>,
        target: MessageTarget,
        message_type: MessageType,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            from_instance,
            from_project: from_project.into(),
            target,
            message_type,
            subject: subject.into(),
            body: None,
            ttl: None,
        }
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.subject.trim().is_empty() {
            return Err(CoordinationError::validation("message subject must not be empty"));
        }
        if let Some(ttl) = self.ttl
            && ttl <= Duration::zero()
        {
            return Err(CoordinationError::validation("message ttl must be positive"));
        }
        Ok(())
    }

    /// `now + ttl` (or the default). A ttl past the representable range is a
    /// validation error.
    pub fn expires_at(&self, default_ttl: Duration, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
        now.checked_add_signed(self.ttl.unwrap_or(default_ttl))
            .ok_or_else(|| CoordinationError::validation("message ttl out of range"))
    }
}

/// Stored message. Immutable except for `is_read`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub from_instance: InstanceToken,
    pub from_project: String,
    pub target: MessageTarget,
    pub message_type: MessageType,
    pub subject: String,
    pub body: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Message {
    /// `expires_at` comes from [`NewMessage::expires_at`].
    pub fn from_new(
        id: MessageId,
        new: NewMessage,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            from_instance: new.from_instance,
            from_project: new.from_project,
            target: new.target,
            message_type: new.message_type,
            subject: new.subject,
            body: new.body,
            is_read: false,
            created_at: now,
            expires_at,
        }
    }

    /// Expired messages are invisible to every read path.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Inbox read request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxQuery {
    pub reader: InstanceToken,
    pub project: String,
    pub include_read: bool,
    pub limit: usize,
}

impl InboxQuery {
    pub const DEFAULT_LIMIT: usize = 50;

    pub fn unread(reader: InstanceToken, project: impl Into<String>) -> Self {
        Self {
            reader,
            project: project.into(),
            include_read: false,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    pub fn include_read(mut self) -> Self {
        self.include_read = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn matches(&self, message: &Message, now: DateTime<Utc>) -> bool {
        !message.is_expired(now)
            && (self.include_read || !message.is_read)
            && message.target.addresses(&self.reader, &self.project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn message(target: MessageTarget) -> Message {
        let new = NewMessage::new(
            InstanceToken::new("inst-sender"),
            "alpha",
            target,
            MessageType::Warning,
            "schema changed",
        );
        let expires_at = new.expires_at(Duration::hours(24), now()).unwrap();
        Message::from_new(MessageId::new(1), new, expires_at, now())
    }

    #[rstest]
    #[case(MessageTarget::Broadcast, "inst-r", "beta", true)]
    #[case(MessageTarget::Instance("inst-r".into()), "inst-r", "beta", true)]
    #[case(MessageTarget::Instance("inst-x".into()), "inst-r", "beta", false)]
    #[case(MessageTarget::Project("beta".into()), "inst-r", "beta", true)]
    #[case(MessageTarget::Project("alpha".into()), "inst-r", "beta", false)]
    fn addressing(
        #[case] target: MessageTarget,
        #[case] reader: &str,
        #[case] project: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(target.addresses(&InstanceToken::new(reader), project), expected);
    }

    #[test]
    fn default_ttl_applies() {
        let m = message(MessageTarget::Broadcast);
        assert_eq!(m.expires_at, now() + Duration::hours(24));
        assert!(!m.is_expired(now()));
        assert!(m.is_expired(now() + Duration::hours(24)));
    }

    #[test]
    fn expired_messages_never_match_even_with_include_read() {
        let m = message(MessageTarget::Broadcast);
        let query = InboxQuery::unread(InstanceToken::new("inst-r"), "beta").include_read();
        assert!(query.matches(&m, now()));
        assert!(!query.matches(&m, now() + Duration::hours(25)));
    }

    #[test]
    fn read_messages_only_match_with_include_read() {
        let mut m = message(MessageTarget::Broadcast);
        m.is_read = true;
        let reader = InstanceToken::new("inst-r");
        assert!(!InboxQuery::unread(reader.clone(), "beta").matches(&m, now()));
        assert!(InboxQuery::unread(reader, "beta").include_read().matches(&m, now()));
    }

    #[test]
    fn target_round_trips_through_stored_parts() {
        for target in [
            MessageTarget::Broadcast,
            MessageTarget::Instance("inst-1".into()),
            MessageTarget::Project("alpha".into()),
        ] {
            let back = MessageTarget::from_parts(target.kind(), target.value()).unwrap();
            assert_eq!(back, target);
        }
        assert_eq!(MessageTarget::Broadcast.to_string(), BROADCAST_MARKER);
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!("urgent".parse::<MessageType>().is_err());
        assert_eq!("blocker".parse::<MessageType>().unwrap(), MessageType::Blocker);
    }

    #[test]
    fn non_positive_ttl_is_rejected() {
        let new = NewMessage::new(
            InstanceToken::new("inst-a"),
            "alpha",
            MessageTarget::Broadcast,
            MessageType::Info,
            "hi",
        )
        .ttl(Duration::zero());
        assert!(new.validate().is_err());
    }

    #[test]
    fn oversized_ttl_is_rejected_instead_of_overflowing() {
        let new = NewMessage::new(
            InstanceToken::new("inst-a"),
            "alpha",
            MessageTarget::Broadcast,
            MessageType::Info,
            "hi",
        )
        .ttl(Duration::days(100_000_000));
        // 正の値なので形式チェックは通る
        assert!(new.validate().is_ok());
        let err = new.expires_at(Duration::hours(24), now()).unwrap_err();
        assert!(matches!(err, CoordinationError::Validation(_)));
    }
}
