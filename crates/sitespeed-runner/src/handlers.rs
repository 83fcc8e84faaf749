//! API handlers for the scan runner

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;

use crate::{
    metrics,
    models::{
        RunScanRequest, RunScanResponse, ScanDigest, ScanRecord, ScanStatus, ScanStatusResponse,
    },
    recommendations,
    report::{self, ResolveError},
    worker::SubmitError,
    AppState,
};

/// API Error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.message
        });

        (self.status, Json(body)).into_response()
    }
}

impl From<SubmitError> for ApiError {
    fn from(err: SubmitError) -> Self {
        let status = match err {
            SubmitError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
            SubmitError::QueueUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        ApiError {
            status,
            message: err.to_string(),
        }
    }
}

/// Health check
pub async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "sitespeed-runner"
    }))
}

/// Accept a new scan and schedule it for background execution
pub async fn run_scan_handler(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RunScanRequest>,
) -> Result<(StatusCode, Json<RunScanResponse>), ApiError> {
    info!("Scan requested for {}", payload.url);

    let record = state
        .dispatcher
        .submit(payload.url, payload.options)
        .await?;

    let response = RunScanResponse {
        status_url: format!("/status/{}", record.scan_id),
        report_url: format!("/report/{}", record.scan_id),
        scan_id: record.scan_id,
        status: record.status,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Get the status of a scan
pub async fn scan_status_handler(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<String>,
) -> Result<Json<ScanStatusResponse>, ApiError> {
    let record = fetch_record(&state, &scan_id).await?;
    Ok(Json(ScanStatusResponse::from_record(&record)))
}

/// Get the parsed report for a scan
pub async fn scan_report_handler(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<String>,
) -> Result<Response, ApiError> {
    let record = fetch_record(&state, &scan_id).await?;

    match report::resolve(&record) {
        Ok(summary) => Ok(Json(summary).into_response()),
        Err(e) => Err(resolve_error(&record, e)),
    }
}

/// Metrics for the first analyzed page only
pub async fn main_page_metrics_handler(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = fetch_record(&state, &scan_id).await?;
    require_completed(&record)?;

    let page_dirs = metrics::page_directories(&record.output_dir);
    let main_dir = page_dirs.first().ok_or_else(|| {
        ApiError::not_found(format!("No pages found for scan: {}", scan_id))
    })?;

    let page = metrics::parse_page_metrics(main_dir);

    Ok(Json(serde_json::json!({
        "scanId": record.scan_id,
        "url": record.url,
        "pageUrl": page.page,
        "started_at": record.started_at,
        "completed_at": record.completed_at,
        "technology": page.coach.technology,
        "metrics": {
            "browsertime": page.browsertime,
            "coach": page.coach,
            "lighthouse": page.lighthouse,
        }
    })))
}

/// Average metrics across all analyzed pages
pub async fn aggregate_metrics_handler(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = fetch_record(&state, &scan_id).await?;
    require_completed(&record)?;

    let pages: Vec<_> = metrics::page_directories(&record.output_dir)
        .iter()
        .map(|dir| metrics::parse_page_metrics(dir))
        .collect();

    let aggregated = metrics::aggregate(&pages).ok_or_else(|| {
        ApiError::not_found(format!("No pages found for scan: {}", scan_id))
    })?;

    let pages_scanned: Vec<_> = pages
        .iter()
        .map(|p| {
            serde_json::json!({
                "page": p.page,
                "lighthousePerformance": p.lighthouse.performance,
                "coachScore": p.coach.score,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "scanId": record.scan_id,
        "url": record.url,
        "started_at": record.started_at,
        "completed_at": record.completed_at,
        "pagesCount": aggregated.pages_count,
        "pagesScanned": pages_scanned,
        "technology": pages.first().and_then(|p| p.coach.technology.clone()),
        "averageMetrics": {
            "browsertime": aggregated.browsertime,
            "coach": aggregated.coach,
            "lighthouse": aggregated.lighthouse,
        }
    })))
}

/// Coach and lighthouse findings merged across all analyzed pages
pub async fn recommendations_handler(
    State(state): State<Arc<AppState>>,
    Path(scan_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = fetch_record(&state, &scan_id).await?;
    require_completed(&record)?;

    // An empty list is a valid answer: nothing scored below threshold
    let recommendations = recommendations::collect(&record.output_dir);

    Ok(Json(serde_json::json!({
        "scanId": record.scan_id,
        "url": record.url,
        "started_at": record.started_at,
        "completed_at": record.completed_at,
        "recommendationsCount": recommendations.len(),
        "recommendations": recommendations,
    })))
}

/// List all known scans
pub async fn list_scans_handler(
    State(state): State<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let records = state.registry.list().await;
    let scans: Vec<ScanDigest> = records.iter().map(ScanDigest::from_record).collect();

    Json(serde_json::json!({
        "scans": scans,
        "total": scans.len()
    }))
}

async fn fetch_record(state: &AppState, scan_id: &str) -> Result<ScanRecord, ApiError> {
    state
        .registry
        .get(scan_id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("Scan not found: {}", scan_id)))
}

fn require_completed(record: &ScanRecord) -> Result<(), ApiError> {
    match record.status {
        ScanStatus::Completed => Ok(()),
        ScanStatus::Queued | ScanStatus::Running => Err(resolve_error(
            record,
            ResolveError::NotReady(record.status),
        )),
        ScanStatus::Failed => Err(ApiError::not_found(format!(
            "Scan failed, no report available: {}",
            record.scan_id
        ))),
    }
}

fn resolve_error(record: &ScanRecord, err: ResolveError) -> ApiError {
    match err {
        ResolveError::NotReady(status) => ApiError {
            status: StatusCode::CONFLICT,
            message: format!("Report not available. Scan status: {}", status.as_str()),
        },
        ResolveError::NotFound => ApiError::not_found(format!(
            "No report artifacts found for scan: {}",
            record.scan_id
        )),
        ResolveError::Io(e) => ApiError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("Failed to read scan output: {}", e),
        },
    }
}
