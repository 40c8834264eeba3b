//! Promotion of controller-reserved servers to running.

use std::sync::Arc;
use std::time::Duration;

use lotus_coord::{CoordinationStore, ServerId, ServerStatus, StoreError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::WorkerResult;
use crate::launcher::ServerLauncher;
use crate::state::LocalWorker;

/// Outcome of processing one assigned server id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// The id moved from `assigned` to `running` on this run.
    Promoted,
    /// Another run already promoted it.
    AlreadyPromoted,
}

/// Polls this worker's record and brings every assigned server up.
///
/// Runs are serialised: the loop awaits each run before the next tick, and
/// a slow run delays the following tick rather than overlapping it.
pub struct AssignmentProcessor {
    store: Arc<dyn CoordinationStore>,
    worker: Arc<LocalWorker>,
    launcher: Arc<dyn ServerLauncher>,
    interval: Duration,
}

impl AssignmentProcessor {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        worker: Arc<LocalWorker>,
        launcher: Arc<dyn ServerLauncher>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            worker,
            launcher,
            interval,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Runs until `cancel` fires. The first run happens one interval after
    /// start so the first heartbeat has created the record.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            worker_id = %self.worker.id(),
            interval_ms = self.interval.as_millis(),
            "assignment processor started"
        );

        let start = tokio::time::Instant::now() + self.interval;
        let mut ticker = tokio::time::interval_at(start, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_once().await {
                Ok(0) => {}
                Ok(promoted) => debug!(worker_id = %self.worker.id(), promoted, "assignment run complete"),
                Err(e) => warn!(worker_id = %self.worker.id(), error = %e, "failed to process assignments"),
            }
        }

        info!(worker_id = %self.worker.id(), "assignment processor stopped");
    }

    /// Processes every id in the worker's `assigned` set once.
    ///
    /// A failure on one id is logged and leaves that id assigned for the
    /// next run; the remaining ids are still processed. Returns the number
    /// of ids promoted by this run.
    pub async fn run_once(&self) -> WorkerResult<usize> {
        let worker_id = self.worker.id();
        let record = self
            .store
            .get_worker(worker_id)
            .await?
            .ok_or_else(|| StoreError::WorkerNotFound(worker_id.clone()))?;

        let mut promoted = 0;
        for server_id in &record.assigned {
            match self.process(server_id).await {
                Ok(Promotion::Promoted) => promoted += 1,
                Ok(Promotion::AlreadyPromoted) => {}
                Err(e) => {
                    warn!(%worker_id, %server_id, error = %e, "failed to start assigned server");
                }
            }
        }
        Ok(promoted)
    }

    /// Starts one assigned server and promotes it.
    ///
    /// Safe to repeat after a partial run: every step either overwrites or
    /// is a no-op when already applied.
    pub async fn process(&self, server_id: &ServerId) -> WorkerResult<Promotion> {
        let worker_id = self.worker.id();
        let mut server = self
            .store
            .get_server(server_id)
            .await?
            .ok_or_else(|| StoreError::ServerNotFound(server_id.clone()))?;

        server.transition(ServerStatus::Starting);
        self.store.set_server(&server).await?;

        self.launcher.launch(&server).await?;
        self.worker.mark_running(server_id.clone());

        let outcome = match self.store.promote_assignment(worker_id, server_id).await {
            Ok(()) => {
                info!(%worker_id, %server_id, "assignment promoted");
                Promotion::Promoted
            }
            Err(StoreError::NotAssigned { .. }) => {
                debug!(%worker_id, %server_id, "assignment already promoted");
                Promotion::AlreadyPromoted
            }
            Err(e) => return Err(e.into()),
        };

        server.transition(ServerStatus::Running);
        self.store.set_server(&server).await?;

        Ok(outcome)
    }
}

impl std::fmt::Debug for AssignmentProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssignmentProcessor")
            .field("worker_id", self.worker.id())
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
