//! Data models for the scan lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Scan job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Scan is queued, waiting for a worker
    Queued,
    /// Scan is currently executing
    Running,
    /// Scan completed successfully
    Completed,
    /// Scan failed
    Failed,
}

impl ScanStatus {
    /// Whether this status is terminal (no further transitions)
    pub fn is_terminal(self) -> bool {
        matches!(self, ScanStatus::Completed | ScanStatus::Failed)
    }

    /// Whether the state machine permits an edge from `self` to `next`
    pub fn can_transition_to(self, next: ScanStatus) -> bool {
        matches!(
            (self, next),
            (ScanStatus::Queued, ScanStatus::Running)
                | (ScanStatus::Running, ScanStatus::Completed)
                | (ScanStatus::Running, ScanStatus::Failed)
        )
    }

    /// Lowercase wire name, matching the serde representation
    pub fn as_str(self) -> &'static str {
        match self {
            ScanStatus::Queued => "queued",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Failed => "failed",
        }
    }
}

/// One accepted scan request and its lifecycle record
#[derive(Debug, Clone, Serialize)]
pub struct ScanRecord {
    /// Unique scan identifier (uuid v4, filesystem-safe)
    #[serde(rename = "scanId")]
    pub scan_id: String,

    /// Target URL
    pub url: String,

    /// Caller-supplied argument tokens, passed verbatim to the external tool
    pub options: Vec<String>,

    /// Current status
    pub status: ScanStatus,

    /// When the scan was accepted
    pub created_at: DateTime<Utc>,

    /// When execution started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished (completed or failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message (if failed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Directory where the external tool writes its artifacts
    #[serde(skip)]
    pub output_dir: PathBuf,
}

impl ScanRecord {
    /// Create a new record in `queued` state
    pub fn new(scan_id: String, url: String, options: Vec<String>, output_dir: PathBuf) -> Self {
        Self {
            scan_id,
            url,
            options,
            status: ScanStatus::Queued,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            output_dir,
        }
    }
}

/// Request to start a new scan
#[derive(Debug, Deserialize)]
pub struct RunScanRequest {
    /// Target URL
    pub url: String,

    /// Extra argument tokens for the external tool
    #[serde(default)]
    pub options: Vec<String>,
}

/// Response from accepting a scan
#[derive(Debug, Serialize)]
pub struct RunScanResponse {
    #[serde(rename = "scanId")]
    pub scan_id: String,

    pub status: ScanStatus,

    #[serde(rename = "statusUrl")]
    pub status_url: String,

    #[serde(rename = "reportUrl")]
    pub report_url: String,
}

/// Response with scan status
#[derive(Debug, Serialize)]
pub struct ScanStatusResponse {
    #[serde(rename = "scanId")]
    pub scan_id: String,

    pub status: ScanStatus,

    pub url: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Error message (failed scans only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Where to fetch the parsed report (completed scans only)
    #[serde(rename = "reportUrl", skip_serializing_if = "Option::is_none")]
    pub report_url: Option<String>,
}

impl ScanStatusResponse {
    /// Build the status view of a record
    pub fn from_record(record: &ScanRecord) -> Self {
        Self {
            scan_id: record.scan_id.clone(),
            status: record.status,
            url: record.url.clone(),
            started_at: record.started_at,
            completed_at: record.completed_at,
            error: match record.status {
                ScanStatus::Failed => record.error.clone(),
                _ => None,
            },
            report_url: match record.status {
                ScanStatus::Completed => Some(format!("/report/{}", record.scan_id)),
                _ => None,
            },
        }
    }
}

/// One entry in the scan listing
#[derive(Debug, Serialize)]
pub struct ScanDigest {
    #[serde(rename = "scanId")]
    pub scan_id: String,

    pub url: String,

    pub status: ScanStatus,

    pub created_at: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
}

impl ScanDigest {
    pub fn from_record(record: &ScanRecord) -> Self {
        Self {
            scan_id: record.scan_id.clone(),
            url: record.url.clone(),
            status: record.status,
            created_at: record.created_at,
            started_at: record.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_edges() {
        assert!(ScanStatus::Queued.can_transition_to(ScanStatus::Running));
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Completed));
        assert!(ScanStatus::Running.can_transition_to(ScanStatus::Failed));

        // No skipping, no backward edges, terminal states are final
        assert!(!ScanStatus::Queued.can_transition_to(ScanStatus::Completed));
        assert!(!ScanStatus::Queued.can_transition_to(ScanStatus::Failed));
        assert!(!ScanStatus::Running.can_transition_to(ScanStatus::Queued));
        assert!(!ScanStatus::Completed.can_transition_to(ScanStatus::Failed));
        assert!(!ScanStatus::Failed.can_transition_to(ScanStatus::Running));
        assert!(!ScanStatus::Completed.can_transition_to(ScanStatus::Running));
    }

    #[test]
    fn test_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ScanStatus::Queued).unwrap(),
            "\"queued\""
        );
        assert_eq!(
            serde_json::to_string(&ScanStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn test_record_serialization_skips_unset_fields() {
        let record = ScanRecord::new(
            "abc".to_string(),
            "https://example.com".to_string(),
            vec!["-n".to_string(), "1".to_string()],
            PathBuf::from("/reports/abc"),
        );

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["scanId"], "abc");
        assert_eq!(json["status"], "queued");
        assert!(json.get("started_at").is_none());
        assert!(json.get("completed_at").is_none());
        assert!(json.get("error").is_none());
        assert!(json.get("output_dir").is_none());
    }

    #[test]
    fn test_status_response_hides_error_unless_failed() {
        let mut record = ScanRecord::new(
            "abc".to_string(),
            "https://example.com".to_string(),
            vec![],
            PathBuf::from("/reports/abc"),
        );
        record.error = Some("stale".to_string());

        let response = ScanStatusResponse::from_record(&record);
        assert!(response.error.is_none());
        assert!(response.report_url.is_none());

        record.status = ScanStatus::Completed;
        let response = ScanStatusResponse::from_record(&record);
        assert_eq!(response.report_url.as_deref(), Some("/report/abc"));
    }
}
