//! Domain identifiers (strongly-typed IDs).
//!
//! Two families of identifiers cross the engine boundary:
//!
//! - **Serial ids** (`TaskId`, `MessageId`): integers assigned by the store.
//!   They share one generic implementation, `SerialId<T>`, where `T` is a
//!   zero-sized marker type. The marker costs nothing at runtime but keeps a
//!   `TaskId` from being passed where a `MessageId` is expected.
//! - **Instance tokens**: opaque strings generated by the caller's
//!   environment. Callers must not parse them.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"task-", "msg-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Store-assigned integer identifier.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SerialId<T: IdMarker> {
    value: i64,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> SerialId<T> {
    pub fn new(value: i64) -> Self {
        Self {
            value,
            _marker: PhantomData,
        }
    }

    pub fn get(&self) -> i64 {
        self.value
    }
}

impl<T: IdMarker> From<i64> for SerialId<T> {
    fn from(value: i64) -> Self {
        Self::new(value)
    }
}

impl<T: IdMarker> fmt::Display for SerialId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.value)
    }
}

impl<T: IdMarker> Serialize for SerialId<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.value)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for SerialId<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        i64::deserialize(deserializer).map(Self::new)
    }
}

// ========================================
// マーカー型の定義
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Message {}

impl IdMarker for Message {
    fn prefix() -> &'static str {
        "msg-"
    }
}

/// Identifier of a dispatchable work item.
pub type TaskId = SerialId<Task>;

/// Identifier of an addressed notice on the message bus.
pub type MessageId = SerialId<Message>;

/// Opaque identity of a registered instance.
///
/// The engine only compares tokens for equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceToken(String);

impl InstanceToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for InstanceToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for InstanceToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for InstanceToken {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_ids_display_with_prefix() {
        assert_eq!(TaskId::new(7).to_string(), "task-7");
        assert_eq!(MessageId::new(3).to_string(), "msg-3");
    }

    #[test]
    fn serial_ids_serialize_as_plain_integers() {
        let id = TaskId::new(42);
        assert_eq!(serde_json::to_string(&id).unwrap(), "42");
        let back: TaskId = serde_json::from_str("42").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn serial_ids_order_by_value() {
        assert!(TaskId::new(1) < TaskId::new(2));
    }

    #[test]
    fn phantom_marker_does_not_consume_memory() {
        assert_eq!(std::mem::size_of::<TaskId>(), std::mem::size_of::<i64>());
    }

    #[test]
    fn instance_token_is_transparent_in_json() {
        let token = InstanceToken::new("inst-abc");
        assert_eq!(serde_json::to_string(&token).unwrap(), "\"inst-abc\"");
    }
}
