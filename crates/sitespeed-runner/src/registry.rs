//! In-memory scan registry
//!
//! Single source of truth for scan status. All mutation goes through
//! [`ScanRegistry::transition`], which validates the requested edge against
//! the state machine before applying it, so readers never observe a skipped
//! or backward transition. `get`/`list` return owned snapshots.

use crate::models::{ScanRecord, ScanStatus};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Registry operation errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Scan not found: {0}")]
    NotFound(String),

    /// Programming-error fault: the state machine forbids this edge
    #[error("Invalid transition {from:?} -> {to:?} for scan {scan_id}")]
    InvalidTransition {
        scan_id: String,
        from: ScanStatus,
        to: ScanStatus,
    },
}

struct RegistryInner {
    records: HashMap<String, ScanRecord>,
    /// Insertion order, for deterministic listing
    order: Vec<String>,
}

/// Concurrency-safe store of scan records, keyed by scan id
pub struct ScanRegistry {
    reports_dir: PathBuf,
    inner: RwLock<RegistryInner>,
}

impl ScanRegistry {
    /// Create an empty registry rooted at `reports_dir`
    pub fn new(reports_dir: PathBuf) -> Self {
        Self {
            reports_dir,
            inner: RwLock::new(RegistryInner {
                records: HashMap::new(),
                order: Vec::new(),
            }),
        }
    }

    /// Root directory under which per-scan output directories live
    pub fn reports_dir(&self) -> &PathBuf {
        &self.reports_dir
    }

    /// Create a new record in `queued` state and return a snapshot of it
    pub async fn create(&self, url: String, options: Vec<String>) -> ScanRecord {
        let mut inner = self.inner.write().await;

        // uuid v4 collisions are vanishingly unlikely; regenerate if one
        // ever shows up rather than clobbering an existing record
        let mut scan_id = Uuid::new_v4().to_string();
        while inner.records.contains_key(&scan_id) {
            warn!("Scan id collision on {}, regenerating", scan_id);
            scan_id = Uuid::new_v4().to_string();
        }

        let output_dir = self.reports_dir.join(&scan_id);
        let record = ScanRecord::new(scan_id.clone(), url, options, output_dir);

        inner.records.insert(scan_id.clone(), record.clone());
        inner.order.push(scan_id.clone());

        info!("Created scan record: {}", scan_id);
        record
    }

    /// Get a snapshot of a record by id
    pub async fn get(&self, scan_id: &str) -> Option<ScanRecord> {
        let inner = self.inner.read().await;
        inner.records.get(scan_id).cloned()
    }

    /// Snapshot of all records, in insertion order
    pub async fn list(&self) -> Vec<ScanRecord> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    /// Number of known records
    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    /// Whether the registry holds no records
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }

    /// Atomically apply a state-machine edge, stamping timestamps and the
    /// error field as the edge requires. Returns a snapshot of the updated
    /// record.
    pub async fn transition(
        &self,
        scan_id: &str,
        next: ScanStatus,
        error: Option<String>,
    ) -> Result<ScanRecord, RegistryError> {
        let mut inner = self.inner.write().await;

        let record = inner
            .records
            .get_mut(scan_id)
            .ok_or_else(|| RegistryError::NotFound(scan_id.to_string()))?;

        if !record.status.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition {
                scan_id: scan_id.to_string(),
                from: record.status,
                to: next,
            });
        }

        record.status = next;
        match next {
            ScanStatus::Running => {
                record.started_at = Some(Utc::now());
            }
            ScanStatus::Completed => {
                record.completed_at = Some(Utc::now());
            }
            ScanStatus::Failed => {
                record.completed_at = Some(Utc::now());
                record.error = error;
            }
            ScanStatus::Queued => unreachable!("no edge enters queued"),
        }

        debug!("Scan {} transitioned to {:?}", scan_id, next);
        Ok(record.clone())
    }

    /// Mark a scan as running
    pub async fn mark_running(&self, scan_id: &str) -> Result<ScanRecord, RegistryError> {
        self.transition(scan_id, ScanStatus::Running, None).await
    }

    /// Mark a scan as completed
    pub async fn mark_completed(&self, scan_id: &str) -> Result<ScanRecord, RegistryError> {
        self.transition(scan_id, ScanStatus::Completed, None).await
    }

    /// Mark a scan as failed with a human-readable cause
    pub async fn mark_failed(
        &self,
        scan_id: &str,
        error: String,
    ) -> Result<ScanRecord, RegistryError> {
        self.transition(scan_id, ScanStatus::Failed, Some(error))
            .await
    }

    /// Remove a record outright, regardless of its status. Returns whether
    /// it existed.
    pub async fn remove(&self, scan_id: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.records.remove(scan_id).is_some() {
            inner.order.retain(|id| id != scan_id);
            true
        } else {
            false
        }
    }

    /// Drop terminal records whose `completed_at` is older than `cutoff`.
    /// Returns the number of evicted records. Queued and running records are
    /// never touched.
    pub async fn evict_finished_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write().await;

        let stale: Vec<String> = inner
            .records
            .values()
            .filter(|r| {
                r.status.is_terminal() && r.completed_at.map(|t| t < cutoff).unwrap_or(false)
            })
            .map(|r| r.scan_id.clone())
            .collect();

        for id in &stale {
            inner.records.remove(id);
        }
        inner.order.retain(|id| !stale.contains(id));

        if !stale.is_empty() {
            info!("Evicted {} finished scan records", stale.len());
        }
        stale.len()
    }
}
