//! release-radar - New-release detection for watched artists
//!
//! This is the main entry point for the release-radar service.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

use release_radar::auth::{CredentialProvider, StoredTokenProvider};
use release_radar::catalog::{CatalogApi, SpotifyClient};
use release_radar::config::Config;
use release_radar::database::{LedgerStore, SqliteDatabase, TaskStore, TokenStore};
use release_radar::otel::{init_tracing, Metrics, OtelProvider};
use release_radar::radar::{ReleaseDetector, RunOutcome, SyncOrchestrator};
use release_radar::sync::{BatchScheduler, RetryManager};

/// release-radar - New-release detection for watched artists
#[derive(Parser, Debug)]
#[command(name = "release-radar")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "RELEASE_RADAR_CONFIG")]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Run the batch scheduler until interrupted (default)
    Serve,
    /// Run a single batch of all due tasks and exit
    RunOnce,
    /// Run one task immediately and exit
    RunTask {
        /// Task id
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;

    let otel_provider = OtelProvider::new(&config.otel)?;
    init_tracing(&otel_provider, &config.logging)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting release-radar");

    let database = Arc::new(SqliteDatabase::new(&config.database.path).await?);
    info!(path = %config.database.path, "Database initialized");

    let metrics = Arc::new(Metrics::new(&otel_provider.meter()));
    let tasks: Arc<dyn TaskStore> = database.clone();
    let ledger: Arc<dyn LedgerStore> = database.clone();
    let tokens: Arc<dyn TokenStore> = database;

    let credentials: Arc<dyn CredentialProvider> =
        Arc::new(StoredTokenProvider::new(tokens, &config.spotify)?);
    let catalog: Arc<dyn CatalogApi> = Arc::new(SpotifyClient::new(&config.spotify)?);
    let retry = RetryManager::new(config.retry.clone()).with_metrics(Arc::clone(&metrics));

    let detector = ReleaseDetector::new(
        Arc::clone(&tasks),
        Arc::clone(&ledger),
        Arc::clone(&credentials),
        Arc::clone(&catalog),
        retry.clone(),
    )
    .with_listing(config.spotify.include_groups.clone(), config.spotify.page_size);

    let orchestrator = Arc::new(
        SyncOrchestrator::new(detector, Arc::clone(&tasks), ledger, credentials, catalog, retry)
            .with_metrics(Arc::clone(&metrics)),
    );

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let scheduler = BatchScheduler::new(
        config.scheduler.clone(),
        tasks,
        orchestrator.clone(),
        shutdown_rx,
    )
    .with_metrics(metrics);

    let result = match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let handle = tokio::spawn(scheduler.run());
            shutdown_signal().await;
            let _ = shutdown_tx.send(());
            handle.await.map_err(anyhow::Error::from)
        }
        Command::RunOnce => scheduler.run_batch().await.map(|_| ()).map_err(Into::into),
        Command::RunTask { id } => match orchestrator.run(id).await {
            RunOutcome::Failed(message) => Err(anyhow::anyhow!("Task {} failed: {}", id, message)),
            outcome => {
                info!(task_id = id, outcome = ?outcome, "Task run finished");
                Ok(())
            }
        },
    };

    if let Err(e) = otel_provider.shutdown() {
        error!(error = %e, "Failed to shutdown OpenTelemetry");
    }

    info!("release-radar shutdown complete");

    result
}

/// Load configuration from file or environment
fn load_config(args: &Args) -> anyhow::Result<Config> {
    match &args.config {
        Some(path) => {
            // tracing is not initialized yet
            eprintln!("Loading configuration from file: {}", path);
            Config::from_file(path).map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
        None => {
            eprintln!("Loading configuration from environment variables");
            Config::from_env().map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))
        }
    }
}

/// Create a future that resolves when a shutdown signal is received
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
