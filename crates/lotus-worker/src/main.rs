//! Lotus worker binary.
//!
//! Connects to the coordination store and runs the worker agent until
//! Ctrl+C or SIGTERM.

use std::sync::Arc;

use lotus_coord::ValkeyStore;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use lotus_worker::{NoopLauncher, WorkerAgent, WorkerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lotus_worker=info".parse()?))
        .init();

    info!("Lotus worker starting");

    let config = match WorkerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load worker configuration");
            return Err(e.into());
        }
    };
    let identity = config.identity.resolve();

    info!(
        worker_id = %identity.id,
        max_servers = identity.max_servers,
        valkey_url = %config.valkey.url,
        "Configuration loaded"
    );

    let store = match ValkeyStore::connect(&config.valkey).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "Failed to connect to coordination store");
            return Err(e.into());
        }
    };

    let cancel = CancellationToken::new();
    let agent = WorkerAgent::new(store, identity, Arc::new(NoopLauncher), config.loops);
    let handle = agent.start(&cancel);

    shutdown_signal().await;
    info!("Shutdown signal received, stopping worker loops");
    cancel.cancel();
    handle.join().await;

    info!("Worker shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C");
        }
        () = terminate => {
            info!("Received SIGTERM");
        }
    }
}
