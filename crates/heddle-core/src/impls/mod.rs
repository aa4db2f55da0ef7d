//! Port implementations that live in core.
//!
//! - **memory**: `InMemoryStore`（開発・テスト用）
//!
//! The PostgreSQL store of record lives in the `heddle-pg` crate.

mod memory;

pub use self::memory::InMemoryStore;
