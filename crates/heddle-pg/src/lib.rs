//! heddle-pg
//!
//! PostgreSQL store of record for heddle. Every table lives in the `heddle`
//! schema, created by the embedded migration.
//!
//! # 設計原則
//! - claim / start / complete は 1 本の `UPDATE … WHERE <guard> RETURNING`
//! - 行数で勝敗を判定し、負けた時だけ再読込して NotFound / Conflict / Unauthorized を分類
//! - 時刻はアプリ側の `Clock` からバインドする（DB の `now()` は使わない）

mod db;
mod error;
mod rows;
mod store;

mod activity;
mod instances;
mod messages;
mod recovery;
mod roles;
mod tasks;

pub use db::{Database, PgSettings, PgSettingsError};
pub use store::PgStore;
