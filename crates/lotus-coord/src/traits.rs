use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;

use crate::command::ServerCommand;
use crate::error::Result;
use crate::server::ServerDynamic;
use crate::types::{ServerId, WorkerId};
use crate::worker::WorkerState;

/// Page size used when enumerating every worker.
pub const DEFAULT_SCAN_COUNT: usize = 100;

/// One page of a worker enumeration.
#[derive(Debug, Clone, Default)]
pub struct WorkerPage {
    pub workers: Vec<WorkerState>,
    /// Cursor for the next page, `None` when the scan is complete.
    pub next_cursor: Option<u64>,
}

/// Coordination store: worker records, dynamic server records and the
/// per-worker command queues.
///
/// `reserve_capacity`, `promote_assignment` and `merge_heartbeat` must each
/// be indivisible with respect to any other caller on the same worker key.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    async fn get_worker(&self, worker_id: &WorkerId) -> Result<Option<WorkerState>>;

    /// Returns one page of worker records starting at `cursor` (0 to begin).
    async fn scan_workers(&self, cursor: u64, count: usize) -> Result<WorkerPage>;

    /// Reserves a slot for `server_id` on the worker.
    ///
    /// Fails with `WorkerNotFound` when there is no record and with
    /// `CapacityExceeded` when `assigned + running >= max_servers`. A failed
    /// reservation leaves the record untouched. Returns the new number of
    /// assigned servers.
    async fn reserve_capacity(&self, worker_id: &WorkerId, server_id: &ServerId) -> Result<usize>;

    /// Moves `server_id` from `assigned` to `running`.
    ///
    /// Fails with `NotAssigned` when the id is not currently assigned.
    async fn promote_assignment(&self, worker_id: &WorkerId, server_id: &ServerId) -> Result<()>;

    /// Upserts the worker's own view of its record.
    ///
    /// Creates the record with an empty `assigned` set when absent. When a
    /// record exists its stored `assigned` set is kept and every other field
    /// is replaced from `snapshot`. Returns true if the record was created.
    async fn merge_heartbeat(&self, snapshot: &WorkerState) -> Result<bool>;

    async fn get_server(&self, server_id: &ServerId) -> Result<Option<ServerDynamic>>;

    async fn set_server(&self, record: &ServerDynamic) -> Result<()>;

    /// Appends a command to the tail of the worker's queue.
    async fn push_command(&self, worker_id: &WorkerId, command: &ServerCommand) -> Result<()>;

    /// Pops the head of the worker's queue, waiting up to `timeout`.
    ///
    /// Returns `None` when the wait elapses with the queue still empty.
    async fn pop_command(
        &self,
        worker_id: &WorkerId,
        timeout: Duration,
    ) -> Result<Option<ServerCommand>>;

    /// Number of commands waiting in the worker's queue.
    async fn command_queue_len(&self, worker_id: &WorkerId) -> Result<usize>;

    /// Enumerates every worker record, following scan cursors to the end.
    ///
    /// Order is the store's enumeration order. A key reported twice by the
    /// scan is kept once.
    async fn list_workers(&self) -> Result<Vec<WorkerState>> {
        let mut workers = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = 0;
        loop {
            let page = self.scan_workers(cursor, DEFAULT_SCAN_COUNT).await?;
            for worker in page.workers {
                if seen.insert(worker.id.clone()) {
                    workers.push(worker);
                }
            }
            match page.next_cursor {
                Some(next) => cursor = next,
                None => return Ok(workers),
            }
        }
    }
}
