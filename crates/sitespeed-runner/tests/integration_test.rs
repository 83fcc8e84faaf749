//! Integration tests for the Sitespeed Runner API

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use sitespeed_runner::executor::{ExecError, ExecOutput};
use sitespeed_runner::worker::JobQueue;
use sitespeed_runner::{
    create_router, scan_queue, spawn_workers, AppState, Dispatcher, ScanExecutor, ScanRecord,
    ScanRegistry,
};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt; // for `oneshot`

/// Executor stand-in driving scans to a fixed outcome
enum FakeOutcome {
    /// Write a plausible artifact set and exit cleanly
    Success,
    /// Fail with a non-zero exit
    Failure,
}

struct FakeExecutor {
    outcome: FakeOutcome,
}

#[async_trait]
impl ScanExecutor for FakeExecutor {
    async fn execute(&self, record: &ScanRecord) -> Result<ExecOutput, ExecError> {
        match self.outcome {
            FakeOutcome::Success => {
                std::fs::create_dir_all(&record.output_dir).unwrap();
                std::fs::write(record.output_dir.join("index.html"), "<html></html>").unwrap();

                let data_dir = record.output_dir.join("pages/example.com/data");
                std::fs::create_dir_all(&data_dir).unwrap();
                std::fs::write(
                    data_dir.join("browsertime.pageSummary.json"),
                    json!({
                        "statistics": {
                            "timings": { "fullyLoaded": { "median": 1500.0 } }
                        }
                    })
                    .to_string(),
                )
                .unwrap();
                std::fs::write(
                    data_dir.join("coach.pageSummary.json"),
                    json!({
                        "advice": {
                            "score": 90,
                            "performance": {
                                "score": 85,
                                "adviceList": {
                                    "avoidRenderBlocking": {
                                        "score": 40,
                                        "title": "Avoid render blocking JavaScript",
                                        "description": "Scripts block first paint"
                                    }
                                }
                            }
                        }
                    })
                    .to_string(),
                )
                .unwrap();

                Ok(ExecOutput {
                    log: "ok".to_string(),
                })
            }
            FakeOutcome::Failure => Err(ExecError::NonZeroExit {
                code: "1".to_string(),
                detail: "browser crashed".to_string(),
            }),
        }
    }
}

/// App with no workers: submissions stay queued. The queue receiver is
/// returned so the channel stays open.
fn create_idle_app() -> (Router, tempfile::TempDir, JobQueue) {
    let reports_dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ScanRegistry::new(reports_dir.path().to_path_buf()));
    let (tx, rx) = scan_queue();
    let dispatcher = Dispatcher::new(Arc::clone(&registry), tx);

    let app = create_router(AppState::new(registry, dispatcher));
    (app, reports_dir, rx)
}

/// App with one worker driven by a fake executor
fn create_worker_app(outcome: FakeOutcome) -> (Router, tempfile::TempDir) {
    let reports_dir = tempfile::tempdir().unwrap();
    let registry = Arc::new(ScanRegistry::new(reports_dir.path().to_path_buf()));
    let (tx, rx) = scan_queue();
    let dispatcher = Dispatcher::new(Arc::clone(&registry), tx);

    let executor: Arc<dyn ScanExecutor> = Arc::new(FakeExecutor { outcome });
    let _workers = spawn_workers(1, Arc::clone(&registry), executor, rx);

    let app = create_router(AppState::new(registry, dispatcher));
    (app, reports_dir)
}

async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

async fn post_json(app: &Router, uri: &str, payload: &Value) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri(uri)
                .method("POST")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_string(payload).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

/// Poll the status endpoint until the scan reaches a terminal state
async fn wait_for_terminal(app: &Router, scan_id: &str) -> Value {
    for _ in 0..500 {
        let (status, body) = get_json(app, &format!("/status/{}", scan_id)).await;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "completed" || body["status"] == "failed" {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("scan {} never reached a terminal state", scan_id);
}

#[tokio::test]
async fn test_health_check() {
    let (app, _reports, _queue) = create_idle_app();

    let (status, json) = get_json(&app, "/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["service"], "sitespeed-runner");
}

#[tokio::test]
async fn test_run_scan_rejects_invalid_url() {
    let (app, _reports, _queue) = create_idle_app();

    let (status, json) = post_json(
        &app,
        "/run-sitespeed",
        &json!({ "url": "not-a-url", "options": [] }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("http"));

    // Rejected submissions leave no trace
    let (_, listing) = get_json(&app, "/scans").await;
    assert_eq!(listing["total"], 0);
}

#[tokio::test]
async fn test_unknown_scan_returns_not_found() {
    let (app, _reports, _queue) = create_idle_app();

    let (status, _) = get_json(&app, "/status/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&app, "/report/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&app, "/report/does-not-exist/aggregate").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get_json(&app, "/report/does-not-exist/recommendations").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_accepted_scan_is_queued_and_resolvable() {
    let (app, _reports, _queue) = create_idle_app();

    let (status, json) = post_json(
        &app,
        "/run-sitespeed",
        &json!({ "url": "https://example.com", "options": ["-n", "1"] }),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(json["status"], "queued");
    let scan_id = json["scanId"].as_str().unwrap().to_string();
    assert!(!scan_id.is_empty());
    assert_eq!(json["statusUrl"], format!("/status/{}", scan_id));
    assert_eq!(json["reportUrl"], format!("/report/{}", scan_id));

    // Immediately resolvable, still queued (no workers in this app)
    let (status, body) = get_json(&app, &format!("/status/{}", scan_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "queued");
    assert_eq!(body["url"], "https://example.com");
    assert!(body.get("started_at").is_none());
    assert!(body.get("completed_at").is_none());

    // Repeated reads with no state change are identical
    let (_, body_again) = get_json(&app, &format!("/status/{}", scan_id)).await;
    assert_eq!(body, body_again);
}

#[tokio::test]
async fn test_report_not_ready_while_queued() {
    let (app, _reports, _queue) = create_idle_app();

    let (_, submitted) = post_json(
        &app,
        "/run-sitespeed",
        &json!({ "url": "https://example.com" }),
    )
    .await;
    let scan_id = submitted["scanId"].as_str().unwrap();

    let (status, json) = get_json(&app, &format!("/report/{}", scan_id)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("queued"));

    let (status, _) = get_json(&app, &format!("/report/{}/main", scan_id)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = get_json(&app, &format!("/report/{}/recommendations", scan_id)).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_successful_scan_lifecycle() {
    let (app, _reports) = create_worker_app(FakeOutcome::Success);

    let (status, submitted) = post_json(
        &app,
        "/run-sitespeed",
        &json!({ "url": "https://example.com", "options": ["-n", "1"] }),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let scan_id = submitted["scanId"].as_str().unwrap().to_string();

    let final_status = wait_for_terminal(&app, &scan_id).await;
    assert_eq!(final_status["status"], "completed");
    assert_eq!(final_status["reportUrl"], format!("/report/{}", scan_id));

    let started =
        chrono::DateTime::parse_from_rfc3339(final_status["started_at"].as_str().unwrap())
            .unwrap();
    let completed =
        chrono::DateTime::parse_from_rfc3339(final_status["completed_at"].as_str().unwrap())
            .unwrap();
    assert!(completed >= started);

    // Report reflects the submitted scan and discovered artifacts
    let (status, report) = get_json(&app, &format!("/report/{}", scan_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["scanId"], scan_id.as_str());
    assert_eq!(report["url"], "https://example.com");
    assert_eq!(
        report["reports"]["html"],
        format!("/reports/{}/index.html", scan_id)
    );
    assert_eq!(
        report["metrics"]["browsertime"]["statistics"]["timings"]["fullyLoaded"]["median"],
        1500.0
    );
    assert_eq!(report["metrics"]["coach"]["score"], 90);
    // No lighthouse data was produced; none is reported
    assert!(report["metrics"].get("lighthouse").is_none());

    // Repeated reads are identical
    let (_, report_again) = get_json(&app, &format!("/report/{}", scan_id)).await;
    assert_eq!(report, report_again);

    // Per-page metric views
    let (status, main) = get_json(&app, &format!("/report/{}/main", scan_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(main["pageUrl"], "example.com");
    assert_eq!(main["metrics"]["browsertime"]["fullyLoaded"], 1500.0);
    assert_eq!(main["metrics"]["coach"]["score"], 90.0);

    let (status, aggregate) = get_json(&app, &format!("/report/{}/aggregate", scan_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(aggregate["pagesCount"], 1);
    assert_eq!(aggregate["averageMetrics"]["coach"]["score"], 90.0);

    // Advice merged from the coach summary
    let (status, recs) = get_json(&app, &format!("/report/{}/recommendations", scan_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recs["recommendationsCount"], 1);
    assert_eq!(recs["recommendations"][0]["id"], "avoidRenderBlocking");
    assert_eq!(recs["recommendations"][0]["source"], "coach");
    assert_eq!(recs["recommendations"][0]["category"], "performance");
    assert_eq!(recs["recommendations"][0]["score"], 40.0);
    assert_eq!(recs["recommendations"][0]["severity"], "error");
    assert_eq!(recs["recommendations"][0]["pages"][0], "example.com");
}

#[tokio::test]
async fn test_failed_scan_is_inspectable_via_status() {
    let (app, _reports) = create_worker_app(FakeOutcome::Failure);

    let (_, submitted) = post_json(
        &app,
        "/run-sitespeed",
        &json!({ "url": "https://example.com" }),
    )
    .await;
    let scan_id = submitted["scanId"].as_str().unwrap().to_string();

    let final_status = wait_for_terminal(&app, &scan_id).await;
    assert_eq!(final_status["status"], "failed");
    assert!(final_status["error"]
        .as_str()
        .unwrap()
        .contains("browser crashed"));
    assert!(final_status.get("reportUrl").is_none());

    // Nothing was produced, so there is no report
    let (status, _) = get_json(&app, &format!("/report/{}", scan_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_scan_listing() {
    let (app, _reports, _queue) = create_idle_app();

    let (_, listing) = get_json(&app, "/scans").await;
    assert_eq!(listing["total"], 0);
    assert_eq!(listing["scans"].as_array().unwrap().len(), 0);

    let mut ids = Vec::new();
    for i in 0..3 {
        let (_, submitted) = post_json(
            &app,
            "/run-sitespeed",
            &json!({ "url": format!("https://site-{}.example", i) }),
        )
        .await;
        ids.push(submitted["scanId"].as_str().unwrap().to_string());
    }

    let (status, listing) = get_json(&app, "/scans").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["total"], 3);

    // Listed in insertion order, with distinct ids
    let listed: Vec<&str> = listing["scans"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["scanId"].as_str().unwrap())
        .collect();
    assert_eq!(listed, ids.iter().map(String::as_str).collect::<Vec<_>>());
}
