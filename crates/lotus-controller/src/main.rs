//! `lotusctl`: inspect the coordination store.

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use lotus_coord::{CoordinationStore, ServerId, ValkeyStore, WorkerState};
use tracing_subscriber::EnvFilter;

use lotus_controller::{ControllerConfig, Scheduler};

#[derive(Parser)]
#[command(name = "lotusctl")]
#[command(about = "Inspect Lotus workers and servers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List worker records
    Workers {
        /// Which workers to show
        #[arg(short, long, value_enum, default_value_t = WorkerFilter::All)]
        filter: WorkerFilter,
    },

    /// Show a server's dynamic record
    Server {
        /// Server id
        id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum WorkerFilter {
    All,
    Online,
    Free,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = ControllerConfig::load().context("loading controller configuration")?;
    let store: Arc<dyn CoordinationStore> = Arc::new(
        ValkeyStore::connect(&config.valkey)
            .await
            .with_context(|| format!("connecting to {}", config.valkey.url))?,
    );
    let scheduler = Scheduler::new(Arc::clone(&store), config.scheduler.liveness_window());

    match cli.command {
        Commands::Workers { filter } => {
            let workers = match filter {
                WorkerFilter::All => scheduler.list_workers().await?,
                WorkerFilter::Online => scheduler.online_workers().await?,
                WorkerFilter::Free => scheduler.free_workers().await?,
            };
            print_workers(&workers, &scheduler);
        }
        Commands::Server { id } => {
            let record = store
                .get_server(&ServerId::new(id.clone()))
                .await?
                .with_context(|| format!("no dynamic record for server {id}"))?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
    }
    Ok(())
}

fn print_workers(workers: &[WorkerState], scheduler: &Scheduler) {
    let now = Utc::now();
    println!(
        "{:<24} {:<16} {:>7} {:>8} {:>5} {:>6}",
        "ID", "PUBLIC IP", "ONLINE", "ASSIGNED", "RUN", "FREE"
    );
    for w in workers {
        println!(
            "{:<24} {:<16} {:>7} {:>8} {:>5} {:>6}",
            w.id.as_str(),
            w.public_ip,
            if w.is_online(now, scheduler.liveness_window()) { "yes" } else { "no" },
            w.assigned.len(),
            w.running.len(),
            w.free_slots(),
        );
    }
    println!("{} worker(s)", workers.len());
}
