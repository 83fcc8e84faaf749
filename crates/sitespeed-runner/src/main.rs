//! Sitespeed Runner
//!
//! REST API for queuing sitespeed.io scans + background workers for running them

use anyhow::{Context, Result};
use sitespeed_runner::{
    create_router, scan_queue, spawn_retention_task, spawn_workers, AppState, Config, Dispatcher,
    ScanExecutor, ScanRegistry, SitespeedExecutor,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often the retention sweep runs
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sitespeed_runner=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Configuration (loads .env via dotenvy)
    let config = Config::from_env().context("Failed to load configuration")?;
    config.ensure_directories()?;

    info!("Starting Sitespeed Runner");
    info!("Reports directory: {}", config.reports_dir.display());
    info!("Scan command: {}", config.sitespeed_command);
    info!(
        "Workers: {}, scan timeout: {}s",
        config.worker_count, config.scan_timeout_secs
    );

    // Registry, dispatcher and worker pool
    let registry = Arc::new(ScanRegistry::new(config.reports_dir.clone()));
    let (queue_tx, queue_rx) = scan_queue();
    let dispatcher = Dispatcher::new(Arc::clone(&registry), queue_tx);

    let executor: Arc<dyn ScanExecutor> = Arc::new(SitespeedExecutor::new(
        &config.sitespeed_command,
        config.scan_timeout(),
        config.log_cap_bytes,
    ));
    let _workers = spawn_workers(
        config.worker_count,
        Arc::clone(&registry),
        executor,
        queue_rx,
    );

    if let Some(retention) = config.retention() {
        let _sweeper =
            spawn_retention_task(Arc::clone(&registry), retention, RETENTION_SWEEP_INTERVAL);
        info!("Record retention: {}s", config.retention_secs);
    }

    // Create router
    let state = AppState::new(registry, dispatcher);
    let app = create_router(state);

    // Start API server
    let addr = config.api_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    info!("Sitespeed Runner API running on http://{}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
