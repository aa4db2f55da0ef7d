//! Domain model (ids, records, statuses, errors).
//!
//! Everything here is plain data plus the state-transition methods that keep
//! each record's invariants. No I/O happens in this module.

pub mod activity;
pub mod errors;
pub mod ids;
pub mod instance;
pub mod message;
pub mod recovery;
pub mod role;
pub mod state;
pub mod task;

pub use self::activity::{ActivityEntry, ActivityKind, NewActivity};
pub use self::errors::{ConflictReason, CoordinationError, Entity, ErrorKind, Result};
pub use self::ids::{InstanceToken, MessageId, TaskId};
pub use self::instance::{HeartbeatUpdate, Instance, InstanceView, NewInstance};
pub use self::message::{
    BROADCAST_MARKER, InboxQuery, Message, MessageTarget, MessageType, NewMessage,
};
pub use self::recovery::{ReclaimedTask, RecoveryPolicy, SweepCutoffs, SweepReport};
pub use self::role::{AgentRole, RoleDefinition, default_roles};
pub use self::state::{InstanceStatus, Outcome, TaskStatus};
pub use self::task::{HUMAN_CREATOR, NewTask, Task, TaskFilter, annotate};
