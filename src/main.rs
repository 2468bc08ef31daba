use anyhow::Result;
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use shelf_watcher::config::LoggingConfig;
use shelf_watcher::notifiers;
use shelf_watcher::portal::{PortalClient, ProductFetcher, SessionManager};
use shelf_watcher::storage::SqliteStore;
use shelf_watcher::web::{self, AppState};
use shelf_watcher::{
    product_cache, AppConfig, JobRunner, ReconciliationJob, ReconciliationScheduler,
};

#[derive(Parser)]
#[command(name = "shelf-watcher", version, about = "Tracks shelf prices from the storefront portal")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Serve the HTTP API and run reconciliation on the configured schedule
    Serve,
    /// Run one reconciliation and exit
    Reconcile,
}

fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"))
        .add_directive("shelf_watcher=debug".parse()?);

    let (file_layer, guard) = match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "shelf-watcher.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down...");
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::from_env()?;
    let _log_guard = init_tracing(&config.logging)?;

    info!("Starting Shelf Watcher...");

    if config.metrics.enabled {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.metrics.port))
            .install()?;
        info!(port = config.metrics.port, "Prometheus exporter listening");
    }

    let store = Arc::new(SqliteStore::connect(&config.database).await?);
    let client = Arc::new(PortalClient::new(config.portal.clone())?);
    let sessions = Arc::new(SessionManager::new(
        Arc::clone(&client),
        store.clone(),
        config.portal.credentials.clone(),
        config.locale.offset(),
    ));
    let fetcher = Arc::new(ProductFetcher::new(client, sessions));
    let notifier = notifiers::from_config(&config.notifications.smtp)?;

    let job = Arc::new(ReconciliationJob::new(
        store.clone(),
        fetcher,
        notifier,
        config.scheduler.item_delay(),
    ));
    let cache = Arc::new(product_cache());
    let runner = Arc::new(JobRunner::new(job, Arc::clone(&cache)));

    match cli.command.unwrap_or(Command::Serve) {
        Command::Reconcile => {
            let summary = runner.run_now().await?;
            println!("{}", summary.body());
        }
        Command::Serve => {
            let mut scheduler = ReconciliationScheduler::new(Arc::clone(&runner), &config.scheduler).await?;
            scheduler.start().await?;

            let state = AppState {
                products: store,
                cache,
                runner,
                config: Arc::new(config.clone()),
            };
            web::serve(&config, state, shutdown_signal()).await?;

            scheduler.shutdown().await?;
        }
    }

    Ok(())
}
