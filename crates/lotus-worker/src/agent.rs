//! Worker agent lifecycle.
//!
//! Wires the heartbeat publisher, assignment processor and command
//! consumer to one store and one [`LocalWorker`], and starts each as its
//! own task.

use std::sync::Arc;

use lotus_coord::CoordinationStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::assignment::AssignmentProcessor;
use crate::commands::CommandConsumer;
use crate::config::LoopConfig;
use crate::heartbeat::HeartbeatPublisher;
use crate::launcher::ServerLauncher;
use crate::state::{LocalWorker, WorkerIdentity};

/// The worker process: three loops over shared local state.
pub struct WorkerAgent {
    store: Arc<dyn CoordinationStore>,
    worker: Arc<LocalWorker>,
    launcher: Arc<dyn ServerLauncher>,
    loops: LoopConfig,
}

impl WorkerAgent {
    #[must_use]
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        identity: WorkerIdentity,
        launcher: Arc<dyn ServerLauncher>,
        loops: LoopConfig,
    ) -> Self {
        Self {
            store,
            worker: Arc::new(LocalWorker::new(identity)),
            launcher,
            loops,
        }
    }

    /// Shared local state, as seen by all three loops.
    #[must_use]
    pub fn worker(&self) -> &Arc<LocalWorker> {
        &self.worker
    }

    /// Starts the loops. Each gets a child of `cancel`, so cancelling the
    /// parent stops them all.
    pub fn start(self, cancel: &CancellationToken) -> AgentHandle {
        info!(
            worker_id = %self.worker.id(),
            max_servers = self.worker.identity().max_servers,
            "starting worker agent"
        );

        let heartbeat = LoopHandle::spawn("heartbeat", cancel, |token| {
            HeartbeatPublisher::new(
                Arc::clone(&self.store),
                Arc::clone(&self.worker),
                self.loops.heartbeat_interval(),
            )
            .spawn(token)
        });
        let assignment = LoopHandle::spawn("assignment", cancel, |token| {
            AssignmentProcessor::new(
                Arc::clone(&self.store),
                Arc::clone(&self.worker),
                Arc::clone(&self.launcher),
                self.loops.assignment_interval(),
            )
            .spawn(token)
        });
        let commands = LoopHandle::spawn("commands", cancel, |token| {
            CommandConsumer::new(
                Arc::clone(&self.store),
                Arc::clone(&self.worker),
                Arc::clone(&self.launcher),
                self.loops.command_wait(),
            )
            .spawn(token)
        });

        AgentHandle {
            worker: self.worker,
            loops: [heartbeat, assignment, commands],
        }
    }
}

impl std::fmt::Debug for WorkerAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerAgent")
            .field("worker", &self.worker)
            .field("loops", &self.loops)
            .finish_non_exhaustive()
    }
}

/// A running loop and the token that stops it.
#[derive(Debug)]
pub struct LoopHandle {
    name: &'static str,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl LoopHandle {
    fn spawn(
        name: &'static str,
        parent: &CancellationToken,
        start: impl FnOnce(CancellationToken) -> JoinHandle<()>,
    ) -> Self {
        let cancel = parent.child_token();
        let task = start(cancel.clone());
        Self { name, cancel, task }
    }

    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Stops this loop only.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    async fn join(self) {
        if let Err(e) = self.task.await {
            warn!(task = self.name, error = %e, "worker loop panicked");
        }
    }
}

/// Handle to a started agent.
#[derive(Debug)]
pub struct AgentHandle {
    worker: Arc<LocalWorker>,
    loops: [LoopHandle; 3],
}

impl AgentHandle {
    #[must_use]
    pub fn worker(&self) -> &Arc<LocalWorker> {
        &self.worker
    }

    /// Heartbeat, assignment and command loops, in that order.
    #[must_use]
    pub fn loops(&self) -> &[LoopHandle] {
        &self.loops
    }

    /// Stops every loop and waits for them to exit.
    ///
    /// The command consumer only notices cancellation between queue
    /// waits, so this can take up to one wait period.
    pub async fn shutdown(self) {
        for handle in &self.loops {
            handle.stop();
        }
        self.join().await;
    }

    /// Waits for every loop to exit without stopping them.
    pub async fn join(self) {
        let [heartbeat, assignment, commands] = self.loops;
        tokio::join!(heartbeat.join(), assignment.join(), commands.join());
        info!(worker_id = %self.worker.id(), "worker agent stopped");
    }
}
