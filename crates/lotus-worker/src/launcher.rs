//! Hook through which the worker starts and stops actual server processes.

use async_trait::async_trait;
use lotus_coord::ServerDynamic;
use tracing::info;

use crate::commands::ServerUpdate;
use crate::error::WorkerResult;

/// Starts, stops and reconfigures server processes on this host.
///
/// Implementations must tolerate being asked to launch a server that is
/// already up: the assignment processor retries a launch whenever its
/// promotion did not complete.
#[async_trait]
pub trait ServerLauncher: Send + Sync {
    async fn launch(&self, server: &ServerDynamic) -> WorkerResult<()>;

    async fn stop(&self, server: &ServerDynamic) -> WorkerResult<()>;

    async fn restart(&self, server: &ServerDynamic) -> WorkerResult<()>;

    async fn update(&self, server: &ServerDynamic, update: &ServerUpdate) -> WorkerResult<()>;
}

/// Launcher that only logs. Used until a process backend is plugged in.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopLauncher;

#[async_trait]
impl ServerLauncher for NoopLauncher {
    async fn launch(&self, server: &ServerDynamic) -> WorkerResult<()> {
        info!(server_id = %server.id, kind = %server.kind, version = %server.version, "launch requested");
        Ok(())
    }

    async fn stop(&self, server: &ServerDynamic) -> WorkerResult<()> {
        info!(server_id = %server.id, "stop requested");
        Ok(())
    }

    async fn restart(&self, server: &ServerDynamic) -> WorkerResult<()> {
        info!(server_id = %server.id, "restart requested");
        Ok(())
    }

    async fn update(&self, server: &ServerDynamic, update: &ServerUpdate) -> WorkerResult<()> {
        info!(server_id = %server.id, ?update, "config update requested");
        Ok(())
    }
}
