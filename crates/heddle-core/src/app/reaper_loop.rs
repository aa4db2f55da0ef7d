//! ReaperLoop - 失効した claim の定期回収
//!
//! # フロー
//! 1. interval ごとに `Coordinator::run_recovery_sweep()` を実行
//! 2. 失敗は warn して次の tick へ（リトライはしない）
//! 3. shutdown が来たら抜ける
//!
//! The sweep is idempotent, so any number of instances may run this loop
//! against the same store.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::Coordinator;
use crate::ports::{Clock, CoordinationStore};

/// Handle of the background sweeper.
/// - `request_shutdown()` で止まる（実行中の sweep は最後まで走る）
/// - `shutdown_and_join()` で終了を待てる
pub struct ReaperLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl ReaperLoop {
    pub fn spawn<S, C>(coordinator: Arc<Coordinator<S, C>>, every: Duration) -> Self
    where
        S: CoordinationStore + ?Sized + 'static,
        C: Clock + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            reaper_loop(coordinator, every, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn reaper_loop<S, C>(
    coordinator: Arc<Coordinator<S, C>>,
    every: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) where
    S: CoordinationStore + ?Sized,
    C: Clock,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!(interval = ?every, "reaper loop started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender が drop されたら終了
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match coordinator.run_recovery_sweep().await {
            Ok(report) if report.is_empty() => debug!("recovery sweep: nothing stale"),
            Ok(report) => info!(
                reclaimed = report.reclaimed.len(),
                reaped = report.reaped.len(),
                purged = report.purged_messages,
                pruned = report.pruned_activity,
                "recovery sweep"
            ),
            Err(e) => warn!(error = %e, kind = ?e.kind(), "recovery sweep failed"),
        }
    }
    info!("reaper loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeddleConfig;
    use crate::domain::{NewTask, TaskStatus};
    use crate::impls::InMemoryStore;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn sweeps_until_shut_down() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let coordinator = Arc::new(
            Coordinator::new(
                Arc::new(InMemoryStore::new()),
                clock.clone(),
                &HeddleConfig::default(),
            )
            .unwrap(),
        );
        let x = coordinator.register("alpha", "/work", "opus").await.unwrap().token;
        let task = coordinator.create_task(NewTask::new("alpha", "t")).await.unwrap();
        coordinator.claim(task.id, &x).await.unwrap();
        clock.advance(chrono::Duration::minutes(6));

        let reaper = ReaperLoop::spawn(Arc::clone(&coordinator), Duration::from_millis(10));

        let reclaimed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let t = coordinator.get_task(task.id).await.unwrap();
                if t.status == TaskStatus::Pending {
                    break t;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task should be reclaimed by the loop");
        assert!(reclaimed.assigned_instance.is_none());

        tokio::time::timeout(Duration::from_secs(5), reaper.shutdown_and_join())
            .await
            .expect("loop should stop on shutdown");
    }
}
