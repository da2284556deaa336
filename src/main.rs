use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use shipwatch::config::{AppConfig, MetricsConfig};
use shipwatch::logging::init_logging;
use shipwatch::storage::{JsonFileStore, RecordStore};
use shipwatch::web::{self, AppState};
use shipwatch::{build_orchestrator, Trigger, UpdateResponse, UpdateScheduler};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding default/<run mode>/local config files
    #[arg(long, default_value = "config")]
    config_dir: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and the HTTP API until interrupted
    Serve,
    /// Run a single update cycle and print the outcome
    Once,
    /// Print the stored position history
    History,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(&cli.config_dir).context("failed to load configuration")?;
    let _guard = init_logging(&config.logging)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Once => once(config).await,
        Command::History => history(config).await,
    }
}

fn install_metrics(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], config.port))
        .install()
        .context("failed to install Prometheus exporter")?;
    info!("Metrics exporter listening on port {}", config.port);
    Ok(())
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("Starting shipwatch for MMSI {}", config.vessel.mmsi);
    install_metrics(&config.metrics)?;

    let orchestrator = build_orchestrator(&config)?;
    let mut scheduler = UpdateScheduler::new(Arc::clone(&orchestrator), config.scheduler.clone()).await?;
    scheduler.start().await?;
    let scheduler = Arc::new(Mutex::new(scheduler));

    let state = AppState::new(orchestrator).with_scheduler(Arc::clone(&scheduler));
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
        info!("Shutting down...");
    };

    web::serve(&config.server, state, shutdown).await?;
    scheduler.lock().await.shutdown().await?;

    Ok(())
}

async fn once(config: AppConfig) -> Result<()> {
    let orchestrator = build_orchestrator(&config)?;

    match orchestrator.trigger(Trigger::OnDemand).await {
        UpdateResponse::Completed(outcome) => {
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        UpdateResponse::AlreadyUpdating => anyhow::bail!("an update is already in progress"),
    }
}

async fn history(config: AppConfig) -> Result<()> {
    let store = JsonFileStore::new(config.history_dir(), config.vessel.mmsi);
    let records = store.all().await?;

    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}
