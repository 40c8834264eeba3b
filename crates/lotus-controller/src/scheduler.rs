//! Worker selection and capacity reservation.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lotus_coord::{CoordinationStore, ServerId, WorkerState};
use tracing::{debug, info};

use crate::error::{ControlError, ControlResult};

/// Picks a worker for a server and reserves a slot on it.
///
/// Selection is first-fit in store enumeration order. There is no
/// load balancing, and a reservation that loses a race for the last slot
/// is returned to the caller rather than retried elsewhere.
#[derive(Clone)]
pub struct Scheduler {
    store: Arc<dyn CoordinationStore>,
    liveness_window: Duration,
}

impl Scheduler {
    #[must_use]
    pub fn new(store: Arc<dyn CoordinationStore>, liveness_window: Duration) -> Self {
        Self {
            store,
            liveness_window,
        }
    }

    #[must_use]
    pub const fn liveness_window(&self) -> Duration {
        self.liveness_window
    }

    /// Every worker record in the store, live or not.
    pub async fn list_workers(&self) -> ControlResult<Vec<WorkerState>> {
        Ok(self.store.list_workers().await?)
    }

    /// Workers whose last heartbeat is inside the liveness window.
    pub async fn online_workers(&self) -> ControlResult<Vec<WorkerState>> {
        let now = Utc::now();
        let mut workers = self.list_workers().await?;
        workers.retain(|w| w.is_online(now, self.liveness_window));
        Ok(workers)
    }

    /// Online workers with at least one free slot.
    pub async fn free_workers(&self) -> ControlResult<Vec<WorkerState>> {
        let now = Utc::now();
        let mut workers = self.list_workers().await?;
        workers.retain(|w| w.is_free(now, self.liveness_window));
        Ok(workers)
    }

    /// First free worker in enumeration order.
    pub async fn select_free_worker(&self) -> ControlResult<WorkerState> {
        let workers = self.list_workers().await?;
        first_free(workers, Utc::now(), self.liveness_window).ok_or(ControlError::NoCapacity)
    }

    /// Selects a free worker and reserves `server_id` on it.
    ///
    /// Returns the chosen worker as it looked at selection time.
    pub async fn assign_server(&self, server_id: &ServerId) -> ControlResult<WorkerState> {
        let worker = self.select_free_worker().await?;
        self.reserve(&worker, server_id).await?;
        Ok(worker)
    }

    /// Reserves `server_id` on an already selected worker.
    pub async fn reserve(&self, worker: &WorkerState, server_id: &ServerId) -> ControlResult<usize> {
        let assigned = self.store.reserve_capacity(&worker.id, server_id).await?;
        info!(worker_id = %worker.id, %server_id, assigned, "capacity reserved");
        Ok(assigned)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("liveness_window", &self.liveness_window)
            .finish_non_exhaustive()
    }
}

/// First worker in `workers` that is online and has a free slot at `now`.
#[must_use]
pub fn first_free(
    workers: impl IntoIterator<Item = WorkerState>,
    now: DateTime<Utc>,
    window: Duration,
) -> Option<WorkerState> {
    let chosen = workers.into_iter().find(|w| w.is_free(now, window));
    match &chosen {
        Some(w) => debug!(worker_id = %w.id, free_slots = w.free_slots(), "selected worker"),
        None => debug!("no free worker"),
    }
    chosen
}
