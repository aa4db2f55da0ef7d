//! heddle-core
//!
//! Task coordination engine for independent instances that share one
//! transactional store and nothing else.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, instance, task, message, role, activity, state, errors, recovery）
//! - **resolver**: 依存解決（available / blocked）と file scope の重なり判定（純粋関数）
//! - **ports**: 抽象化レイヤー（InstanceRegistry, TaskStore, MessageBus, RoleCatalog, ActivityLog, RecoveryStore, Clock）
//! - **app**: アプリケーション層（Coordinator, ReaperLoop, HeartbeatLoop, Status）
//! - **impls**: 実装（InMemoryStore、開発・テスト用）
//! - **config**: 設定（YAML + `HEDDLE_*` 環境変数）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod resolver;

pub use app::{Claim, Coordinator};
pub use config::{ConfigError, HeddleConfig};
pub use domain::{CoordinationError, ErrorKind, Result};
