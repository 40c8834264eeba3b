//! Consumption of the worker's command queue.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use lotus_coord::{
    CommandAction, CoordinationStore, ServerCommand, ServerDynamic, ServerId, ServerStatus,
    StoreError,
};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::launcher::ServerLauncher;
use crate::state::LocalWorker;

/// Parameters of an `update` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerUpdate {
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ServerUpdate {
    /// Decodes the command's parameter map. An empty map or an unknown
    /// key is rejected.
    pub fn from_params(params: &BTreeMap<String, String>) -> WorkerResult<Self> {
        if params.is_empty() {
            return Err(WorkerError::InvalidParams(
                "update requires at least one parameter".to_owned(),
            ));
        }
        let value = serde_json::to_value(params)
            .map_err(|e| WorkerError::InvalidParams(e.to_string()))?;
        serde_json::from_value(value).map_err(|e| WorkerError::InvalidParams(e.to_string()))
    }
}

/// Blocking consumer of `worker:command:{id}`.
///
/// Commands are handled one at a time, in queue order. A command whose
/// handler fails is logged and dropped; it is never re-queued.
pub struct CommandConsumer {
    store: Arc<dyn CoordinationStore>,
    worker: Arc<LocalWorker>,
    launcher: Arc<dyn ServerLauncher>,
    wait: Duration,
}

impl CommandConsumer {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        worker: Arc<LocalWorker>,
        launcher: Arc<dyn ServerLauncher>,
        wait: Duration,
    ) -> Self {
        Self {
            store,
            worker,
            launcher,
            wait,
        }
    }

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(cancel))
    }

    /// Runs until `cancel` fires.
    ///
    /// Cancellation is observed between waits, so shutdown may lag by up
    /// to one wait period. A pop that fails with a transient store error
    /// backs off for one wait period before retrying.
    pub async fn run(self, cancel: CancellationToken) {
        info!(worker_id = %self.worker.id(), wait_secs = self.wait.as_secs(), "command consumer started");

        while !cancel.is_cancelled() {
            match self.poll_once().await {
                Ok(_) => {}
                Err(WorkerError::Store(e)) if e.is_transient() => {
                    warn!(worker_id = %self.worker.id(), error = %e, "failed to read command queue");
                    tokio::select! {
                        () = cancel.cancelled() => break,
                        () = tokio::time::sleep(self.wait) => {}
                    }
                }
                Err(e) => {
                    warn!(worker_id = %self.worker.id(), error = %e, "failed to read command queue");
                }
            }
        }

        info!(worker_id = %self.worker.id(), "command consumer stopped");
    }

    /// Waits for one command and handles it.
    ///
    /// Returns `Ok(None)` when the wait elapsed with nothing queued, and
    /// the command itself once one was taken off the queue, whether or not
    /// its handler succeeded. Only a failed pop is returned as an
    /// error.
    pub async fn poll_once(&self) -> WorkerResult<Option<ServerCommand>> {
        let Some(command) = self.store.pop_command(self.worker.id(), self.wait).await? else {
            return Ok(None);
        };

        if let Err(e) = self.handle(&command).await {
            warn!(
                worker_id = %self.worker.id(),
                server_id = %command.server_id,
                action = %command.action,
                error = %e,
                "command failed"
            );
        }

        Ok(Some(command))
    }

    /// Dispatches one command to its handler.
    pub async fn handle(&self, command: &ServerCommand) -> WorkerResult<()> {
        let action = command.action()?;
        debug!(server_id = %command.server_id, %action, "handling command");

        match action {
            CommandAction::Stop => self.stop(&command.server_id).await,
            CommandAction::Restart => self.restart(&command.server_id).await,
            CommandAction::Update => {
                let update = ServerUpdate::from_params(&command.params)?;
                self.update(&command.server_id, &update).await
            }
        }
    }

    async fn record(&self, server_id: &ServerId) -> WorkerResult<ServerDynamic> {
        self.store
            .get_server(server_id)
            .await?
            .ok_or_else(|| StoreError::ServerNotFound(server_id.clone()).into())
    }

    async fn stop(&self, server_id: &ServerId) -> WorkerResult<()> {
        let mut record = self.record(server_id).await?;
        self.launcher.stop(&record).await?;

        record.transition(ServerStatus::Stopped);
        self.store.set_server(&record).await?;
        self.worker.mark_stopped(server_id);

        info!(worker_id = %self.worker.id(), %server_id, "server stopped");
        Ok(())
    }

    async fn restart(&self, server_id: &ServerId) -> WorkerResult<()> {
        let record = self.record(server_id).await?;
        self.launcher.restart(&record).await?;
        info!(worker_id = %self.worker.id(), %server_id, "server restarted");
        Ok(())
    }

    async fn update(&self, server_id: &ServerId, update: &ServerUpdate) -> WorkerResult<()> {
        let record = self.record(server_id).await?;
        self.launcher.update(&record, update).await?;
        info!(
            worker_id = %self.worker.id(),
            %server_id,
            version = ?update.version,
            name = ?update.name,
            "server config updated"
        );
        Ok(())
    }
}

impl std::fmt::Debug for CommandConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandConsumer")
            .field("worker_id", self.worker.id())
            .field("wait", &self.wait)
            .finish_non_exhaustive()
    }
}
