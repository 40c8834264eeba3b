//! Shared fixtures for the worker unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use lotus_coord::{
    CoordinationStore, MemoryStore, ServerDynamic, ServerId, ServerPersistent, ServerStatus,
    UserId, WorkerId,
};
use parking_lot::Mutex;

use crate::commands::ServerUpdate;
use crate::error::{WorkerError, WorkerResult};
use crate::launcher::ServerLauncher;
use crate::state::{LocalWorker, WorkerIdentity};

pub fn identity(id: &str, max_servers: u32) -> WorkerIdentity {
    WorkerIdentity {
        id: WorkerId::new(id),
        host_id: "host-1".to_owned(),
        created_at: Utc::now(),
        public_ip: "203.0.113.5".to_owned(),
        private_ip: "10.0.0.5".to_owned(),
        max_servers,
    }
}

pub fn local_worker(id: &str, max_servers: u32) -> Arc<LocalWorker> {
    Arc::new(LocalWorker::new(identity(id, max_servers)))
}

pub fn dynamic_record(server_id: &str, worker_id: &str, status: ServerStatus) -> ServerDynamic {
    let now = Utc::now();
    let persistent = ServerPersistent {
        id: ServerId::new(server_id),
        user_id: UserId::new("user-1"),
        name: format!("{server_id}-name"),
        kind: "vanilla".to_owned(),
        version: "1.20".to_owned(),
        created_at: now,
        updated_at: now,
        deleted_at: None,
    };
    ServerDynamic::placed(&persistent, "203.0.113.5", status, WorkerId::new(worker_id))
}

/// Heartbeats `worker` once and reserves each server on it, writing a
/// `scheduled` dynamic record for each.
pub async fn schedule(store: &MemoryStore, worker: &LocalWorker, servers: &[&str]) {
    store
        .merge_heartbeat(&worker.snapshot(Utc::now()))
        .await
        .unwrap_or_else(|e| panic!("heartbeat failed: {e}"));
    for server in servers {
        let record = dynamic_record(server, worker.id().as_str(), ServerStatus::Scheduled);
        store
            .set_server(&record)
            .await
            .unwrap_or_else(|e| panic!("set_server failed: {e}"));
        store
            .reserve_capacity(worker.id(), &record.id)
            .await
            .unwrap_or_else(|e| panic!("reserve failed: {e}"));
    }
}

/// Launcher that records every call and can be told to fail launches.
#[derive(Debug, Default)]
pub struct RecordingLauncher {
    pub calls: Mutex<Vec<(&'static str, ServerId)>>,
    pub fail_launch: Mutex<bool>,
}

impl RecordingLauncher {
    pub fn calls_for(&self, hook: &str) -> Vec<ServerId> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| *name == hook)
            .map(|(_, id)| id.clone())
            .collect()
    }
}

#[async_trait]
impl ServerLauncher for RecordingLauncher {
    async fn launch(&self, server: &ServerDynamic) -> WorkerResult<()> {
        self.calls.lock().push(("launch", server.id.clone()));
        if *self.fail_launch.lock() {
            return Err(WorkerError::launch(&server.id, "image pull failed"));
        }
        Ok(())
    }

    async fn stop(&self, server: &ServerDynamic) -> WorkerResult<()> {
        self.calls.lock().push(("stop", server.id.clone()));
        Ok(())
    }

    async fn restart(&self, server: &ServerDynamic) -> WorkerResult<()> {
        self.calls.lock().push(("restart", server.id.clone()));
        Ok(())
    }

    async fn update(&self, server: &ServerDynamic, _update: &ServerUpdate) -> WorkerResult<()> {
        self.calls.lock().push(("update", server.id.clone()));
        Ok(())
    }
}
