//! RecoveryStore port - 失効した claim の回収
//!
//! # フロー
//! 1. holder が stale（または登録なし）の claimed / in_progress を pending に戻す
//! 2. heartbeat が reap 閾値より古いインスタンスを削除
//! 3. 期限切れメッセージを削除
//!
//! 3 ステップは可能なら同一トランザクション内で実行する。

use async_trait::async_trait;

use crate::domain::{Result, SweepCutoffs, SweepReport};

#[async_trait]
pub trait RecoveryStore: Send + Sync {
    async fn sweep(&self, cutoffs: &SweepCutoffs) -> Result<SweepReport>;
}
