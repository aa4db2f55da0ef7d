//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! ストア系の trait はすべて同じ共有ストア（PostgreSQL など）が実装する前提で、
//! `CoordinationStore` はそれらをまとめた別名です。
//!
//! # 設計原則
//! - 共有ストアが唯一の正本（インスタンス間の直接通信はない）
//! - 時刻は呼び出し側の `Clock` から渡す

pub mod activity_log;
pub mod clock;
pub mod id_generator;
pub mod instance_registry;
pub mod message_bus;
pub mod recovery_store;
pub mod role_catalog;
pub mod task_store;

// 主要な trait を再エクスポート
pub use self::activity_log::ActivityLog;
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{TokenGenerator, UlidTokenGenerator};
pub use self::instance_registry::InstanceRegistry;
pub use self::message_bus::MessageBus;
pub use self::recovery_store::RecoveryStore;
pub use self::role_catalog::RoleCatalog;
pub use self::task_store::TaskStore;

/// Everything the coordinator needs from one shared store.
pub trait CoordinationStore:
    InstanceRegistry + TaskStore + MessageBus + RoleCatalog + ActivityLog + RecoveryStore
{
}

impl<T> CoordinationStore for T where
    T: InstanceRegistry + TaskStore + MessageBus + RoleCatalog + ActivityLog + RecoveryStore
{
}
