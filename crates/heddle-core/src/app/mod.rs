//! App - アプリケーション層
//!
//! このモジュールは、ports を組み合わせてアプリケーションロジックを実装します。
//!
//! # 主要コンポーネント
//! - **Coordinator**: すべての操作の表面（register → claim → complete, messages, sweep）
//! - **ReaperLoop**: 失効 claim の回収・死んだインスタンスの削除
//! - **HeartbeatLoop**: 1 インスタンスの定期 heartbeat
//! - **Status**: スナップショット

pub mod coordinator;
pub mod heartbeat_loop;
pub mod reaper_loop;
pub mod status;

// 主要な型を再エクスポート
pub use self::coordinator::{Claim, Coordinator};
pub use self::heartbeat_loop::HeartbeatLoop;
pub use self::reaper_loop::ReaperLoop;
pub use self::status::{StatusSnapshot, TaskCounts};
