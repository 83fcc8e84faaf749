//! Job dispatch and background execution
//!
//! The dispatcher accepts a scan request, creates the registry record in
//! `queued` state and pushes the id onto an in-process queue. A fixed-size
//! pool of worker tasks consumes the queue and drives each record through
//! `running` to `completed` or `failed`. Workers hold no registry lock while
//! waiting on the subprocess; lock scope is limited to single transitions.

use crate::executor::ScanExecutor;
use crate::models::ScanRecord;
use crate::registry::ScanRegistry;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Caller-visible submission failures
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// The worker queue is gone; nothing can execute the scan
    #[error("Scan queue unavailable")]
    QueueUnavailable,
}

/// Accepts scan submissions and hands them to the worker pool
pub struct Dispatcher {
    registry: Arc<ScanRegistry>,
    queue: mpsc::UnboundedSender<String>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ScanRegistry>, queue: mpsc::UnboundedSender<String>) -> Self {
        Self { registry, queue }
    }

    /// Validate and accept a scan request. Returns the queued record
    /// immediately; execution happens on the worker pool.
    pub async fn submit(
        &self,
        url: String,
        options: Vec<String>,
    ) -> Result<ScanRecord, SubmitError> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(SubmitError::InvalidUrl(
                "URL must start with http:// or https://".to_string(),
            ));
        }

        let record = self.registry.create(url, options).await;

        if self.queue.send(record.scan_id.clone()).is_err() {
            // Only happens when the worker pool is gone, i.e. during
            // shutdown. Drop the record again so listings don't advertise a
            // scan nothing will ever run.
            self.registry.remove(&record.scan_id).await;
            error!("Scan queue closed, rejected scan for {}", record.url);
            return Err(SubmitError::QueueUnavailable);
        }

        info!("Scan queued: {} for {}", record.scan_id, record.url);
        Ok(record)
    }
}

/// Shared receiving end of the scan queue
pub type JobQueue = Arc<Mutex<mpsc::UnboundedReceiver<String>>>;

/// Create the scan queue used between the dispatcher and the workers
pub fn scan_queue() -> (mpsc::UnboundedSender<String>, JobQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Arc::new(Mutex::new(rx)))
}

/// Start `count` worker tasks consuming the shared queue
pub fn spawn_workers(
    count: usize,
    registry: Arc<ScanRegistry>,
    executor: Arc<dyn ScanExecutor>,
    queue: JobQueue,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            let registry = Arc::clone(&registry);
            let executor = Arc::clone(&executor);
            let queue = Arc::clone(&queue);

            tokio::spawn(async move {
                info!("Scan worker {} started", worker_id);
                loop {
                    let scan_id = {
                        let mut rx = queue.lock().await;
                        rx.recv().await
                    };

                    match scan_id {
                        Some(scan_id) => {
                            process_scan(&registry, executor.as_ref(), &scan_id).await;
                        }
                        None => {
                            info!("Scan queue closed, worker {} exiting", worker_id);
                            break;
                        }
                    }
                }
            })
        })
        .collect()
}

/// Execute one queued scan and record the outcome
async fn process_scan(registry: &ScanRegistry, executor: &dyn ScanExecutor, scan_id: &str) {
    let record = match registry.get(scan_id).await {
        Some(record) => record,
        None => {
            // Evicted while still queued; nothing to do
            warn!("Queued scan {} no longer in registry, skipping", scan_id);
            return;
        }
    };

    let record = match registry.mark_running(scan_id).await {
        Ok(updated) => updated,
        Err(e) => {
            error!("Cannot start scan {}: {}", scan_id, e);
            return;
        }
    };

    info!("Processing scan: {}", scan_id);

    let outcome = match executor.execute(&record).await {
        Ok(_) if output_dir_is_empty(&record) => {
            registry
                .mark_failed(scan_id, "scan produced no output".to_string())
                .await
        }
        Ok(_) => registry.mark_completed(scan_id).await,
        Err(e) => registry.mark_failed(scan_id, e.to_string()).await,
    };

    match outcome {
        Ok(updated) => info!("Scan {} finished: {:?}", scan_id, updated.status),
        Err(e) => error!("Failed to record outcome for scan {}: {}", scan_id, e),
    }
}

fn output_dir_is_empty(record: &ScanRecord) -> bool {
    match std::fs::read_dir(&record.output_dir) {
        Ok(mut entries) => entries.next().is_none(),
        Err(_) => true,
    }
}

/// Periodically evict terminal records older than `retention`
pub fn spawn_retention_task(
    registry: Arc<ScanRegistry>,
    retention: Duration,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let retention = chrono::Duration::from_std(retention)
            .unwrap_or_else(|_| chrono::Duration::days(1));
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let cutoff = chrono::Utc::now() - retention;
            registry.evict_finished_before(cutoff).await;
        }
    })
}
