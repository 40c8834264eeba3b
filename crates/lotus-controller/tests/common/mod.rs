//! Common test utilities for controller integration tests.

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use lotus_controller::{MemoryCatalog, NewServer, Scheduler, ServerService};
use lotus_coord::{MemoryStore, ServerPersistent, UserId};
use lotus_worker::{
    AssignmentProcessor, CommandConsumer, HeartbeatPublisher, LocalWorker, NoopLauncher,
};

pub const LIVENESS_WINDOW: Duration = Duration::from_secs(5);

/// Controller wired to an in-memory store and catalog.
pub struct TestCluster {
    pub store: Arc<MemoryStore>,
    pub service: ServerService,
    pub user: UserId,
}

impl TestCluster {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(store.clone(), LIVENESS_WINDOW);
        let service = ServerService::new(Arc::new(MemoryCatalog::new()), store.clone(), scheduler);
        Self {
            store,
            service,
            user: UserId::new("user-1"),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        self.service.scheduler()
    }

    /// Creates a worker whose loops can be stepped by hand.
    pub fn worker(&self, id: &str, max_servers: u32) -> TestWorker {
        let local = Arc::new(LocalWorker::new(
            fixtures::IdentityBuilder::new(id).max_servers(max_servers).build(),
        ));
        let launcher = Arc::new(NoopLauncher);
        TestWorker {
            heartbeat: HeartbeatPublisher::new(
                self.store.clone(),
                local.clone(),
                Duration::from_secs(1),
            ),
            assignment: AssignmentProcessor::new(
                self.store.clone(),
                local.clone(),
                launcher.clone(),
                Duration::from_millis(500),
            ),
            commands: CommandConsumer::new(
                self.store.clone(),
                local.clone(),
                launcher,
                Duration::from_millis(50),
            ),
            local,
        }
    }

    pub async fn create_server(&self, name: &str) -> ServerPersistent {
        self.service
            .create_server(
                &self.user,
                NewServer {
                    name: name.to_owned(),
                    kind: "vanilla".to_owned(),
                    version: "1.20.4".to_owned(),
                },
            )
            .await
            .unwrap()
    }
}

/// One worker's loop bodies, driven directly instead of on timers.
pub struct TestWorker {
    pub local: Arc<LocalWorker>,
    pub heartbeat: HeartbeatPublisher,
    pub assignment: AssignmentProcessor,
    pub commands: CommandConsumer,
}
