//! Server orchestration: the operations behind the request surface.
//!
//! Every call arrives with an already verified user id. Ownership is
//! checked against the catalog; a server owned by someone else is
//! reported as [`ControlError::NotFound`].

use std::sync::Arc;

use chrono::Utc;
use lotus_coord::{
    CommandAction, CoordinationStore, ServerCommand, ServerDynamic, ServerId, ServerPersistent,
    ServerStatus, UserId,
};
use tracing::info;

use crate::catalog::ServerCatalog;
use crate::error::{ControlError, ControlResult};
use crate::scheduler::Scheduler;

/// Fields a caller supplies when creating a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewServer {
    pub name: String,
    pub kind: String,
    pub version: String,
}

/// Controller-side orchestration service.
pub struct ServerService {
    catalog: Arc<dyn ServerCatalog>,
    store: Arc<dyn CoordinationStore>,
    scheduler: Scheduler,
}

impl ServerService {
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ServerCatalog>,
        store: Arc<dyn CoordinationStore>,
        scheduler: Scheduler,
    ) -> Self {
        Self {
            catalog,
            store,
            scheduler,
        }
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Creates a persistent server with a fresh id. It starts out stopped.
    pub async fn create_server(
        &self,
        user_id: &UserId,
        server: NewServer,
    ) -> ControlResult<ServerPersistent> {
        let now = Utc::now();
        let record = ServerPersistent {
            id: ServerId::generate(),
            user_id: user_id.clone(),
            name: server.name,
            kind: server.kind,
            version: server.version,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.catalog.insert(&record).await?;
        info!(%user_id, server_id = %record.id, "server created");
        Ok(record)
    }

    /// Every server the user owns, with its live state.
    pub async fn list_servers(&self, user_id: &UserId) -> ControlResult<Vec<ServerDynamic>> {
        let servers = self.catalog.list_for_user(user_id).await?;
        let mut views = Vec::with_capacity(servers.len());
        for server in &servers {
            views.push(self.view(server).await?);
        }
        Ok(views)
    }

    /// One server with its live state.
    pub async fn get_server(
        &self,
        user_id: &UserId,
        server_id: &ServerId,
    ) -> ControlResult<ServerDynamic> {
        let server = self.owned(user_id, server_id).await?;
        self.view(&server).await
    }

    /// Schedules a stopped server onto a free worker.
    ///
    /// Writes the `scheduled` record and then reserves capacity. The two
    /// writes are separate: if the reservation fails, the `scheduled`
    /// record stays behind with no matching reservation and the error is
    /// returned as-is.
    pub async fn start_server(
        &self,
        user_id: &UserId,
        server_id: &ServerId,
    ) -> ControlResult<ServerDynamic> {
        let server = self.owned(user_id, server_id).await?;

        if let Some(current) = self.store.get_server(server_id).await? {
            if current.status != ServerStatus::Stopped {
                return Err(ControlError::AlreadyRunning(server_id.clone()));
            }
        }

        let worker = self.scheduler.select_free_worker().await?;
        let record = ServerDynamic::placed(
            &server,
            worker.public_ip.clone(),
            ServerStatus::Scheduled,
            worker.id.clone(),
        );
        self.store.set_server(&record).await?;
        self.scheduler.reserve(&worker, server_id).await?;

        info!(%user_id, %server_id, worker_id = %worker.id, "server scheduled");
        Ok(record)
    }

    /// Asks the server's worker to stop it.
    ///
    /// Success means the command was queued, not that the server has
    /// stopped; callers poll [`Self::get_server`] for that.
    pub async fn stop_server(&self, user_id: &UserId, server_id: &ServerId) -> ControlResult<()> {
        self.owned(user_id, server_id).await?;

        let record = self
            .store
            .get_server(server_id)
            .await?
            .filter(|r| r.status == ServerStatus::Running)
            .ok_or_else(|| ControlError::NotRunning(server_id.clone()))?;
        let worker_id = record
            .worker_id
            .ok_or_else(|| ControlError::NotRunning(server_id.clone()))?;

        let command = ServerCommand::new(server_id.clone(), CommandAction::Stop);
        self.store.push_command(&worker_id, &command).await?;

        info!(%user_id, %server_id, %worker_id, "stop requested");
        Ok(())
    }

    async fn owned(&self, user_id: &UserId, server_id: &ServerId) -> ControlResult<ServerPersistent> {
        self.catalog
            .get(user_id, server_id)
            .await?
            .ok_or_else(|| ControlError::NotFound(server_id.clone()))
    }

    async fn view(&self, server: &ServerPersistent) -> ControlResult<ServerDynamic> {
        Ok(self
            .store
            .get_server(&server.id)
            .await?
            .unwrap_or_else(|| ServerDynamic::unscheduled(server)))
    }
}

impl std::fmt::Debug for ServerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerService")
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeSet;
    use std::time::Duration;

    use lotus_coord::{MemoryStore, WorkerId, WorkerState};

    use super::*;
    use crate::catalog::MemoryCatalog;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: ServerService,
        user: UserId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(store.clone(), Duration::from_secs(5));
        let service = ServerService::new(Arc::new(MemoryCatalog::new()), store.clone(), scheduler);
        Fixture {
            store,
            service,
            user: UserId::new("alice"),
        }
    }

    fn online_worker(id: &str, max_servers: u32) -> WorkerState {
        let now = Utc::now();
        WorkerState {
            id: WorkerId::new(id),
            host_id: "host".to_owned(),
            created_at: now,
            public_ip: "203.0.113.9".to_owned(),
            private_ip: "10.0.0.9".to_owned(),
            max_servers,
            last_heartbeat: now,
            running: BTreeSet::new(),
            assigned: BTreeSet::new(),
        }
    }

    fn new_server(name: &str) -> NewServer {
        NewServer {
            name: name.to_owned(),
            kind: "paper".to_owned(),
            version: "1.21".to_owned(),
        }
    }

    #[tokio::test]
    async fn created_server_reads_back_as_stopped() {
        let f = fixture();
        let created = f.service.create_server(&f.user, new_server("lobby")).await.unwrap();

        let view = f.service.get_server(&f.user, &created.id).await.unwrap();
        assert_eq!(view.status, ServerStatus::Stopped);
        assert_eq!(view.address, None);
        assert_eq!(view.worker_id, None);
        assert_eq!(view.name, "lobby");

        let listed = f.service.list_servers(&f.user).await.unwrap();
        assert_eq!(listed, vec![view]);
    }

    #[tokio::test]
    async fn other_users_server_is_not_found() {
        let f = fixture();
        let created = f.service.create_server(&f.user, new_server("lobby")).await.unwrap();
        let mallory = UserId::new("mallory");

        assert!(matches!(
            f.service.get_server(&mallory, &created.id).await,
            Err(ControlError::NotFound(_))
        ));
        assert!(matches!(
            f.service.start_server(&mallory, &created.id).await,
            Err(ControlError::NotFound(_))
        ));
        assert!(f.service.list_servers(&mallory).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_writes_scheduled_record_and_reserves() {
        let f = fixture();
        f.store.insert_worker(online_worker("w1", 1));
        let created = f.service.create_server(&f.user, new_server("lobby")).await.unwrap();

        let record = f.service.start_server(&f.user, &created.id).await.unwrap();

        assert_eq!(record.status, ServerStatus::Scheduled);
        assert_eq!(record.address.as_deref(), Some("203.0.113.9"));
        assert_eq!(record.worker_id, Some(WorkerId::new("w1")));
        assert_eq!(f.store.get_server(&created.id).await.unwrap(), Some(record));
        let worker = f.store.get_worker(&WorkerId::new("w1")).await.unwrap().unwrap();
        assert_eq!(worker.assigned, BTreeSet::from([created.id.clone()]));
    }

    #[tokio::test]
    async fn start_twice_is_already_running() {
        let f = fixture();
        f.store.insert_worker(online_worker("w1", 2));
        let created = f.service.create_server(&f.user, new_server("lobby")).await.unwrap();
        f.service.start_server(&f.user, &created.id).await.unwrap();

        assert!(matches!(
            f.service.start_server(&f.user, &created.id).await,
            Err(ControlError::AlreadyRunning(_))
        ));
    }

    #[tokio::test]
    async fn start_on_running_server_changes_nothing() {
        let f = fixture();
        let mut worker = online_worker("w1", 2);
        let created = f.service.create_server(&f.user, new_server("lobby")).await.unwrap();
        worker.running.insert(created.id.clone());
        f.store.insert_worker(worker);
        let running =
            ServerDynamic::placed(&created, "203.0.113.9", ServerStatus::Running, WorkerId::new("w1"));
        f.store.set_server(&running).await.unwrap();

        let worker_before = f.store.get_worker(&WorkerId::new("w1")).await.unwrap();
        let record_before = f.store.get_server(&created.id).await.unwrap();

        assert!(matches!(
            f.service.start_server(&f.user, &created.id).await,
            Err(ControlError::AlreadyRunning(_))
        ));

        assert_eq!(f.store.get_worker(&WorkerId::new("w1")).await.unwrap(), worker_before);
        assert_eq!(f.store.get_server(&created.id).await.unwrap(), record_before);
    }

    #[tokio::test]
    async fn start_without_workers_is_no_capacity() {
        let f = fixture();
        let created = f.service.create_server(&f.user, new_server("lobby")).await.unwrap();

        assert!(matches!(
            f.service.start_server(&f.user, &created.id).await,
            Err(ControlError::NoCapacity)
        ));
        assert_eq!(f.store.get_server(&created.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn start_after_stop_schedules_again() {
        let f = fixture();
        f.store.insert_worker(online_worker("w1", 1));
        let created = f.service.create_server(&f.user, new_server("lobby")).await.unwrap();
        let stopped =
            ServerDynamic::placed(&created, "203.0.113.9", ServerStatus::Stopped, WorkerId::new("w0"));
        f.store.set_server(&stopped).await.unwrap();

        let record = f.service.start_server(&f.user, &created.id).await.unwrap();
        assert_eq!(record.worker_id, Some(WorkerId::new("w1")));
    }

    #[tokio::test]
    async fn stop_requires_running_status() {
        let f = fixture();
        f.store.insert_worker(online_worker("w1", 1));
        let created = f.service.create_server(&f.user, new_server("lobby")).await.unwrap();

        assert!(matches!(
            f.service.stop_server(&f.user, &created.id).await,
            Err(ControlError::NotRunning(_))
        ));

        f.service.start_server(&f.user, &created.id).await.unwrap();
        assert!(matches!(
            f.service.stop_server(&f.user, &created.id).await,
            Err(ControlError::NotRunning(_))
        ));
    }

    #[tokio::test]
    async fn stop_on_stopped_server_is_not_running() {
        let f = fixture();
        let created = f.service.create_server(&f.user, new_server("lobby")).await.unwrap();
        let stopped =
            ServerDynamic::placed(&created, "203.0.113.9", ServerStatus::Stopped, WorkerId::new("w1"));
        f.store.set_server(&stopped).await.unwrap();

        assert!(matches!(
            f.service.stop_server(&f.user, &created.id).await,
            Err(ControlError::NotRunning(_))
        ));
        assert_eq!(f.store.command_queue_len(&WorkerId::new("w1")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stop_queues_command_for_bound_worker() {
        let f = fixture();
        let created = f.service.create_server(&f.user, new_server("lobby")).await.unwrap();
        let running =
            ServerDynamic::placed(&created, "203.0.113.9", ServerStatus::Running, WorkerId::new("w7"));
        f.store.set_server(&running).await.unwrap();

        f.service.stop_server(&f.user, &created.id).await.unwrap();

        let worker_id = WorkerId::new("w7");
        assert_eq!(f.store.command_queue_len(&worker_id).await.unwrap(), 1);
        let command = f
            .store
            .pop_command(&worker_id, Duration::from_millis(10))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(command.server_id, created.id);
        assert_eq!(command.action().unwrap(), CommandAction::Stop);
        // The record is untouched until the worker handles the command.
        let record = f.store.get_server(&created.id).await.unwrap().unwrap();
        assert_eq!(record.status, ServerStatus::Running);
    }
}
