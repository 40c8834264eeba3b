use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::{Mutex, Notify};

use crate::command::ServerCommand;
use crate::error::{Result, StoreError};
use crate::server::ServerDynamic;
use crate::traits::{CoordinationStore, WorkerPage};
use crate::types::{ServerId, WorkerId};
use crate::worker::WorkerState;

/// In-process coordination store.
///
/// Each atomic mutator runs under the map shard lock of its worker key, so
/// concurrent callers on the same worker are serialised.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    workers: Arc<DashMap<WorkerId, WorkerState>>,
    servers: Arc<DashMap<ServerId, ServerDynamic>>,
    queues: Arc<Mutex<HashMap<WorkerId, VecDeque<ServerCommand>>>>,
    pushed: Arc<Notify>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a worker record as-is, bypassing the heartbeat merge.
    pub fn insert_worker(&self, worker: WorkerState) {
        self.workers.insert(worker.id.clone(), worker);
    }
}

#[async_trait]
impl CoordinationStore for MemoryStore {
    async fn get_worker(&self, worker_id: &WorkerId) -> Result<Option<WorkerState>> {
        Ok(self.workers.get(worker_id).map(|r| r.value().clone()))
    }

    async fn scan_workers(&self, cursor: u64, count: usize) -> Result<WorkerPage> {
        let mut ids: Vec<WorkerId> = self.workers.iter().map(|r| r.key().clone()).collect();
        ids.sort();

        let start = usize::try_from(cursor).unwrap_or(usize::MAX);
        let end = start.saturating_add(count.max(1)).min(ids.len());
        let workers = ids
            .get(start..end)
            .unwrap_or_default()
            .iter()
            .filter_map(|id| self.workers.get(id).map(|r| r.value().clone()))
            .collect();

        let next_cursor = (end < ids.len()).then(|| end as u64);
        Ok(WorkerPage {
            workers,
            next_cursor,
        })
    }

    async fn reserve_capacity(&self, worker_id: &WorkerId, server_id: &ServerId) -> Result<usize> {
        let mut worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| StoreError::WorkerNotFound(worker_id.clone()))?;

        if !worker.has_capacity() {
            return Err(StoreError::CapacityExceeded {
                worker_id: worker_id.clone(),
                max_servers: worker.max_servers,
            });
        }

        worker.assigned.insert(server_id.clone());
        Ok(worker.assigned.len())
    }

    async fn promote_assignment(&self, worker_id: &WorkerId, server_id: &ServerId) -> Result<()> {
        let mut worker = self
            .workers
            .get_mut(worker_id)
            .ok_or_else(|| StoreError::WorkerNotFound(worker_id.clone()))?;

        if !worker.assigned.remove(server_id) {
            return Err(StoreError::NotAssigned {
                worker_id: worker_id.clone(),
                server_id: server_id.clone(),
            });
        }

        worker.running.insert(server_id.clone());
        Ok(())
    }

    async fn merge_heartbeat(&self, snapshot: &WorkerState) -> Result<bool> {
        match self.workers.entry(snapshot.id.clone()) {
            Entry::Occupied(mut entry) => {
                let assigned = std::mem::take(&mut entry.get_mut().assigned);
                let mut merged = snapshot.clone();
                merged.assigned = assigned;
                entry.insert(merged);
                Ok(false)
            }
            Entry::Vacant(entry) => {
                let mut created = snapshot.clone();
                created.assigned.clear();
                entry.insert(created);
                Ok(true)
            }
        }
    }

    async fn get_server(&self, server_id: &ServerId) -> Result<Option<ServerDynamic>> {
        Ok(self.servers.get(server_id).map(|r| r.value().clone()))
    }

    async fn set_server(&self, record: &ServerDynamic) -> Result<()> {
        self.servers.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn push_command(&self, worker_id: &WorkerId, command: &ServerCommand) -> Result<()> {
        self.queues
            .lock()
            .await
            .entry(worker_id.clone())
            .or_default()
            .push_back(command.clone());
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn pop_command(
        &self,
        worker_id: &WorkerId,
        timeout: Duration,
    ) -> Result<Option<ServerCommand>> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            // Register interest before checking so a push in between is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(command) = self
                .queues
                .lock()
                .await
                .get_mut(worker_id)
                .and_then(VecDeque::pop_front)
            {
                return Ok(Some(command));
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn command_queue_len(&self, worker_id: &WorkerId) -> Result<usize> {
        Ok(self
            .queues
            .lock()
            .await
            .get(worker_id)
            .map_or(0, VecDeque::len))
    }
}
