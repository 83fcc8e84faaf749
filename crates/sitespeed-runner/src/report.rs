//! Report resolution
//!
//! Walks a completed scan's output directory for the structured files the
//! external tool is known to emit and assembles them into a normalized
//! summary. The artifact set varies with caller-supplied options, so every
//! per-file parse is best-effort: malformed or absent files are logged and
//! omitted, and resolution only fails when the output directory itself is
//! unreadable.

use crate::models::{ScanRecord, ScanStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Resolution outcomes that are not a summary
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The scan has not finished yet; not a failure
    #[error("Report not ready, scan status: {}", .0.as_str())]
    NotReady(ScanStatus),

    /// Nothing resolvable exists for this scan
    #[error("No report artifacts found")]
    NotFound,

    /// The output directory itself is missing or unreadable
    #[error("Failed to read scan output: {0}")]
    Io(#[from] std::io::Error),
}

/// Normalized view over a scan's artifacts
#[derive(Debug, Serialize)]
pub struct ReportSummary {
    #[serde(rename = "scanId")]
    pub scan_id: String,

    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Artifact kind -> served path under `/reports/{scanId}/`
    pub reports: Map<String, Value>,

    /// Analysis category -> extracted metrics, passed through from the
    /// external tool's structured output
    pub metrics: Map<String, Value>,
}

/// Resolve a record into a report summary
pub fn resolve(record: &ScanRecord) -> Result<ReportSummary, ResolveError> {
    match record.status {
        ScanStatus::Queued | ScanStatus::Running => {
            return Err(ResolveError::NotReady(record.status));
        }
        ScanStatus::Failed => {
            // A failed scan with partial output is still inspectable
            if !record.output_dir.is_dir() {
                return Err(ResolveError::NotFound);
            }
        }
        ScanStatus::Completed => {}
    }

    let files = collect_files(&record.output_dir)?;
    let summary = assemble(record, &files);

    if summary.reports.is_empty() && summary.metrics.is_empty() {
        return Err(ResolveError::NotFound);
    }
    Ok(summary)
}

fn assemble(record: &ScanRecord, files: &[PathBuf]) -> ReportSummary {
    let mut reports = Map::new();
    let mut metrics = Map::new();

    let served = |path: &Path| -> Value {
        let relative = path
            .strip_prefix(&record.output_dir)
            .unwrap_or(path)
            .to_string_lossy();
        json!(format!("/reports/{}/{}", record.scan_id, relative))
    };

    // Top-level HTML reports
    let index_html = record.output_dir.join("index.html");
    if index_html.is_file() {
        reports.insert("html".to_string(), served(&index_html));
    }
    let detailed_html = record.output_dir.join("detailed.html");
    if detailed_html.is_file() {
        reports.insert("detailed_html".to_string(), served(&detailed_html));
    }

    let find = |name: &str| files.iter().find(|p| file_name_is(p, name));

    // Per-category JSON summaries written by the analysisstorer plugin
    if let Some(path) = find("browsertime.pageSummary.json") {
        if let Some(data) = read_json(path) {
            let mut extracted = Map::new();
            if let Some(stats) = data.get("statistics") {
                extracted.insert("statistics".to_string(), stats.clone());
            }
            if let Some(info) = data.get("info") {
                extracted.insert("info".to_string(), info.clone());
            }
            metrics.insert("browsertime".to_string(), Value::Object(extracted));
            reports.insert("browsertime_json".to_string(), served(path));
        }
    }

    if let Some(path) = find("coach.pageSummary.json") {
        if let Some(data) = read_json(path) {
            metrics.insert(
                "coach".to_string(),
                json!({
                    "advice": data.get("advice").cloned().unwrap_or(Value::Null),
                    "score": data.pointer("/advice/score").cloned().unwrap_or(Value::Null),
                }),
            );
            reports.insert("coach_json".to_string(), served(path));
        }
    }

    if let Some(path) = find("pagexray.pageSummary.json") {
        if let Some(data) = read_json(path) {
            metrics.insert(
                "pagexray".to_string(),
                json!({
                    "transferSize": data.get("transferSize").cloned().unwrap_or(Value::Null),
                    "contentSize": data.get("contentSize").cloned().unwrap_or(Value::Null),
                    "requests": data.get("requests").cloned().unwrap_or(Value::Null),
                    "contentTypes": data.get("contentTypes").cloned().unwrap_or(json!({})),
                }),
            );
            reports.insert("pagexray_json".to_string(), served(path));
        }
    }

    if let Some(path) = find("lighthouse.pageSummary.json") {
        if let Some(data) = read_json(path) {
            let mut lighthouse = Map::new();

            // Lighthouse scores are 0-1; serve them as 0-100
            let category_score = |name: &str| -> Value {
                data.pointer(&format!("/categories/{}/score", name))
                    .and_then(Value::as_f64)
                    .map(|s| json!(s * 100.0))
                    .unwrap_or(Value::Null)
            };
            lighthouse.insert("performance".to_string(), category_score("performance"));
            lighthouse.insert("accessibility".to_string(), category_score("accessibility"));
            lighthouse.insert("bestPractices".to_string(), category_score("best-practices"));
            lighthouse.insert("seo".to_string(), category_score("seo"));

            let audit_value = |name: &str| -> Value {
                data.pointer(&format!("/audits/{}/numericValue", name))
                    .cloned()
                    .unwrap_or(Value::Null)
            };
            lighthouse.insert(
                "webVitals".to_string(),
                json!({
                    "LCP": audit_value("largest-contentful-paint"),
                    "TBT": audit_value("total-blocking-time"),
                    "CLS": audit_value("cumulative-layout-shift"),
                    "FCP": audit_value("first-contentful-paint"),
                    "SI": audit_value("speed-index"),
                }),
            );

            metrics.insert("lighthouse".to_string(), Value::Object(lighthouse));
            reports.insert("lighthouse_json".to_string(), served(path));
        }
    }

    if let Some(path) = find("lighthouse.html") {
        reports.insert("lighthouse_html".to_string(), served(path));
    }

    if let Some(path) = find("browsertime.har") {
        reports.insert("har".to_string(), served(path));
    }

    if let Some(path) = files
        .iter()
        .find(|p| has_extension(p, "mp4") && under_directory(p, "video"))
    {
        reports.insert("video".to_string(), served(path));
    }

    let screenshots: Vec<Value> = files
        .iter()
        .filter(|p| has_extension(p, "png") && under_directory(p, "screenshots"))
        .take(5)
        .map(|p| served(p))
        .collect();
    if !screenshots.is_empty() {
        reports.insert("screenshots".to_string(), Value::Array(screenshots));
    }

    ReportSummary {
        scan_id: record.scan_id.clone(),
        url: record.url.clone(),
        started_at: record.started_at,
        completed_at: record.completed_at,
        reports,
        metrics,
    }
}

/// Parse a JSON artifact, returning None (and logging) on any failure
fn read_json(path: &Path) -> Option<Value> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Could not read {}: {}", path.display(), e);
            return None;
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Could not parse {}: {}", path.display(), e);
            None
        }
    }
}

/// Recursively collect files under `dir`, sorted for deterministic picks.
/// The top-level read must succeed; unreadable subdirectories are skipped.
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut files = Vec::new();
    let entries = std::fs::read_dir(dir)?;
    for entry in entries.flatten() {
        visit(&entry.path(), &mut files);
    }
    files.sort();
    Ok(files)
}

fn visit(path: &Path, files: &mut Vec<PathBuf>) {
    if path.is_dir() {
        match std::fs::read_dir(path) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    visit(&entry.path(), files);
                }
            }
            Err(e) => warn!("Skipping unreadable directory {}: {}", path.display(), e),
        }
    } else {
        files.push(path.to_path_buf());
    }
}

fn file_name_is(path: &Path, name: &str) -> bool {
    path.file_name().and_then(|n| n.to_str()) == Some(name)
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(ext)
}

fn under_directory(path: &Path, dir_name: &str) -> bool {
    path.ancestors()
        .skip(1)
        .any(|a| file_name_is(a, dir_name))
}
