//! The worker's in-memory view of itself.
//!
//! The heartbeat publisher, assignment processor and command consumer all
//! read or change the local `running` set. It lives behind one mutex in
//! [`LocalWorker`]; the loops share a single `Arc<LocalWorker>`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use lotus_coord::{ServerId, WorkerId, WorkerState};
use parking_lot::Mutex;

/// Static identity fields, fixed for the life of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerIdentity {
    pub id: WorkerId,
    pub host_id: String,
    pub created_at: DateTime<Utc>,
    pub public_ip: String,
    pub private_ip: String,
    pub max_servers: u32,
}

/// Shared local worker state.
#[derive(Debug)]
pub struct LocalWorker {
    identity: WorkerIdentity,
    running: Mutex<BTreeSet<ServerId>>,
}

impl LocalWorker {
    /// Creates the state with an empty running set.
    #[must_use]
    pub fn new(identity: WorkerIdentity) -> Self {
        Self {
            identity,
            running: Mutex::new(BTreeSet::new()),
        }
    }

    #[must_use]
    pub fn id(&self) -> &WorkerId {
        &self.identity.id
    }

    #[must_use]
    pub fn identity(&self) -> &WorkerIdentity {
        &self.identity
    }

    /// Builds the record published by a heartbeat.
    ///
    /// `assigned` is left empty; the store keeps its own copy.
    #[must_use]
    pub fn snapshot(&self, now: DateTime<Utc>) -> WorkerState {
        WorkerState {
            id: self.identity.id.clone(),
            host_id: self.identity.host_id.clone(),
            created_at: self.identity.created_at,
            public_ip: self.identity.public_ip.clone(),
            private_ip: self.identity.private_ip.clone(),
            max_servers: self.identity.max_servers,
            last_heartbeat: now,
            running: self.running.lock().clone(),
            assigned: BTreeSet::new(),
        }
    }

    /// Records a server as running. Returns false if it already was.
    pub fn mark_running(&self, server_id: ServerId) -> bool {
        self.running.lock().insert(server_id)
    }

    /// Forgets a running server. Returns false if it was not running.
    pub fn mark_stopped(&self, server_id: &ServerId) -> bool {
        self.running.lock().remove(server_id)
    }

    #[must_use]
    pub fn is_running(&self, server_id: &ServerId) -> bool {
        self.running.lock().contains(server_id)
    }

    #[must_use]
    pub fn running(&self) -> BTreeSet<ServerId> {
        self.running.lock().clone()
    }
}
