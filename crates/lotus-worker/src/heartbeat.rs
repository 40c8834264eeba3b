//! Periodic liveness publishing.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use lotus_coord::CoordinationStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::WorkerResult;
use crate::state::LocalWorker;

/// Upserts the worker's record on a fixed interval.
///
/// The first heartbeat is sent immediately so the worker becomes
/// schedulable without waiting a full interval.
pub struct HeartbeatPublisher {
    store: Arc<dyn CoordinationStore>,
    worker: Arc<LocalWorker>,
    interval: Duration,
}

impl HeartbeatPublisher {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        worker: Arc<LocalWorker>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            worker,
            interval,
        }
    }

    /// Spawns the publisher loop.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Runs until `cancel` fires. A failed publish is logged and the loop
    /// carries on with the next tick.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            worker_id = %self.worker.id(),
            interval_ms = self.interval.as_millis(),
            "heartbeat publisher started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.publish().await {
                warn!(worker_id = %self.worker.id(), error = %e, "failed to send heartbeat");
            }
        }

        info!(worker_id = %self.worker.id(), "heartbeat publisher stopped");
    }

    /// Publishes one heartbeat. Returns true if it created the record.
    pub async fn publish(&self) -> WorkerResult<bool> {
        let snapshot = self.worker.snapshot(Utc::now());
        let created = self.store.merge_heartbeat(&snapshot).await?;

        if created {
            info!(worker_id = %snapshot.id, max_servers = snapshot.max_servers, "worker record created");
        } else {
            debug!(worker_id = %snapshot.id, running = snapshot.running.len(), "heartbeat sent");
        }

        Ok(created)
    }
}

impl std::fmt::Debug for HeartbeatPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatPublisher")
            .field("worker_id", self.worker.id())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;

    use lotus_coord::{MemoryStore, ServerId};

    use super::*;
    use crate::test_support::{local_worker, schedule};

    #[tokio::test]
    async fn first_publish_creates_then_merges() {
        let store = Arc::new(MemoryStore::new());
        let worker = local_worker("w1", 2);
        let publisher = HeartbeatPublisher::new(store.clone(), worker.clone(), Duration::from_secs(1));

        assert!(publisher.publish().await.unwrap());
        assert!(!publisher.publish().await.unwrap());

        let record = store.get_worker(worker.id()).await.unwrap().unwrap();
        assert_eq!(record.max_servers, 2);
        assert_eq!(record.public_ip, "203.0.113.5");
    }

    #[tokio::test]
    async fn publish_keeps_controller_assignments() {
        let store = Arc::new(MemoryStore::new());
        let worker = local_worker("w1", 3);
        schedule(&store, &worker, &["s1"]).await;
        worker.mark_running(ServerId::new("s0"));

        let publisher = HeartbeatPublisher::new(store.clone(), worker.clone(), Duration::from_secs(1));
        publisher.publish().await.unwrap();

        let record = store.get_worker(worker.id()).await.unwrap().unwrap();
        assert_eq!(record.assigned, BTreeSet::from([ServerId::new("s1")]));
        assert_eq!(record.running, BTreeSet::from([ServerId::new("s0")]));
    }

    #[tokio::test(start_paused = true)]
    async fn first_heartbeat_is_immediate_and_loop_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let worker = local_worker("w1", 1);
        let cancel = CancellationToken::new();
        let handle = HeartbeatPublisher::new(store.clone(), worker.clone(), Duration::from_secs(60))
            .spawn(cancel.clone());

        // Well before the first interval would elapse.
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(store.get_worker(worker.id()).await.unwrap().is_some());

        cancel.cancel();
        handle.await.unwrap();
    }
}
