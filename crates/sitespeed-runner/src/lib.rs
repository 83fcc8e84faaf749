//! Sitespeed Runner
//!
//! HTTP service that runs sitespeed.io scans out-of-band and lets callers
//! poll for completion and fetch a parsed report.
//!
//! ## Architecture
//!
//! A request to `/run-sitespeed` creates a `queued` record in the in-memory
//! scan registry and enqueues the scan id for a fixed-size pool of worker
//! tasks. A worker runs the external sitespeed.io command with a wall-clock
//! timeout and drives the record through `running` to `completed` or
//! `failed`. Read endpoints only look at registry state and the scan's
//! output directory; they never wait on a subprocess.
//!
//! ## Endpoints
//!
//! - `POST /run-sitespeed` - Queue a new scan
//! - `GET /status/{scan_id}` - Scan status
//! - `GET /report/{scan_id}` - Parsed report summary
//! - `GET /report/{scan_id}/main` - Standardized metrics for the first page
//! - `GET /report/{scan_id}/aggregate` - Average metrics across all pages
//! - `GET /report/{scan_id}/recommendations` - Merged coach/lighthouse advice
//! - `GET /scans` - List all known scans
//! - `GET /health` - Health check

pub mod config;
pub mod executor;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod recommendations;
pub mod registry;
pub mod report;
pub mod worker;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use config::Config;
pub use executor::{ScanExecutor, SitespeedExecutor};
pub use models::{RunScanRequest, RunScanResponse, ScanRecord, ScanStatus};
pub use registry::ScanRegistry;
pub use worker::{scan_queue, spawn_retention_task, spawn_workers, Dispatcher};

/// Application state shared across handlers
pub struct AppState {
    /// Single source of truth for scan status
    pub registry: Arc<ScanRegistry>,

    /// Accepts submissions and feeds the worker pool
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn new(registry: Arc<ScanRegistry>, dispatcher: Dispatcher) -> Self {
        Self {
            registry,
            dispatcher,
        }
    }
}

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/run-sitespeed", post(handlers::run_scan_handler))
        .route("/status/{scan_id}", get(handlers::scan_status_handler))
        .route("/report/{scan_id}", get(handlers::scan_report_handler))
        .route(
            "/report/{scan_id}/main",
            get(handlers::main_page_metrics_handler),
        )
        .route(
            "/report/{scan_id}/aggregate",
            get(handlers::aggregate_metrics_handler),
        )
        .route(
            "/report/{scan_id}/recommendations",
            get(handlers::recommendations_handler),
        )
        .route("/scans", get(handlers::list_scans_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
