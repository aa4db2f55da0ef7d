//! HeartbeatLoop - 定期 heartbeat
//!
//! Keeps one instance's `last_heartbeat` fresh while the owning process does
//! long-running work. Stops by itself once the registration is gone (reaped
//! or deregistered), since heartbeating a missing token can never succeed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::Coordinator;
use crate::domain::{HeartbeatUpdate, InstanceToken};
use crate::ports::{Clock, CoordinationStore};

pub struct HeartbeatLoop {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl HeartbeatLoop {
    pub fn spawn<S, C>(
        coordinator: Arc<Coordinator<S, C>>,
        token: InstanceToken,
        every: Duration,
    ) -> Self
    where
        S: CoordinationStore + ?Sized + 'static,
        C: Clock + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let join = tokio::spawn(async move {
            heartbeat_loop(coordinator, token, every, &mut shutdown_rx).await;
        });
        Self { shutdown_tx, join }
    }

    pub fn request_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }

    /// The loop ended on its own (registration gone).
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

async fn heartbeat_loop<S, C>(
    coordinator: Arc<Coordinator<S, C>>,
    token: InstanceToken,
    every: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) where
    S: CoordinationStore + ?Sized,
    C: Clock,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let update = HeartbeatUpdate::default();

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            _ = ticker.tick() => {}
        }

        match coordinator.heartbeat(&token, &update).await {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                warn!(instance = %token, "instance no longer registered; heartbeat loop stopping");
                break;
            }
            Err(e) => warn!(instance = %token, error = %e, kind = ?e.kind(), "heartbeat failed"),
        }
    }
    debug!(instance = %token, "heartbeat loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HeddleConfig;
    use crate::impls::InMemoryStore;
    use crate::ports::FixedClock;
    use chrono::{TimeZone, Utc};

    fn coordinator(clock: &FixedClock) -> Arc<Coordinator<InMemoryStore, FixedClock>> {
        Arc::new(
            Coordinator::new(
                Arc::new(InMemoryStore::new()),
                clock.clone(),
                &HeddleConfig::default(),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn keeps_heartbeat_fresh() {
        let t0 = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(t0);
        let c = coordinator(&clock);
        let token = c.register("alpha", "/work", "opus").await.unwrap().token;
        clock.advance(chrono::Duration::minutes(1));

        let beat = HeartbeatLoop::spawn(Arc::clone(&c), token.clone(), Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(5), async {
            while c.get_instance(&token).await.unwrap().last_heartbeat == t0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("heartbeat should advance");
        beat.shutdown_and_join().await;
    }

    #[tokio::test]
    async fn stops_when_registration_is_gone() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap());
        let c = coordinator(&clock);
        let token = c.register("alpha", "/work", "opus").await.unwrap().token;
        c.deregister(&token).await.unwrap();

        let beat = HeartbeatLoop::spawn(Arc::clone(&c), token, Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(5), async {
            while !beat.is_finished() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("loop should stop by itself");
    }
}
