//! External process execution
//!
//! Runs the sitespeed.io command for one scan: spawn, wait with a wall-clock
//! budget, capture diagnostic output. The orchestrator treats the command as
//! an opaque collaborator; it only forwards the target URL, the output
//! directory and the caller's option tokens.

use crate::models::ScanRecord;
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Execution failures, captured into the record's error field by the worker
#[derive(Debug, Error)]
pub enum ExecError {
    /// The command could not be started at all
    #[error("Failed to spawn scan command: {0}")]
    Spawn(String),

    /// The process did not exit within the wall-clock budget
    #[error("Scan timed out after {0} seconds")]
    Timeout(u64),

    /// The process exited with a non-zero status
    #[error("Scan command exited with {code}: {detail}")]
    NonZeroExit { code: String, detail: String },
}

/// Captured output of a successful execution
#[derive(Debug)]
pub struct ExecOutput {
    /// Tail of the combined stdout/stderr, bounded by the configured cap
    pub log: String,
}

/// Seam between the worker and the external process, so tests can drive
/// state transitions without spawning real subprocesses
#[async_trait]
pub trait ScanExecutor: Send + Sync {
    async fn execute(&self, record: &ScanRecord) -> Result<ExecOutput, ExecError>;
}

/// Executor that shells out to the configured sitespeed.io command
pub struct SitespeedExecutor {
    /// Command tokens: program followed by base arguments
    command: Vec<String>,
    timeout: Duration,
    log_cap_bytes: usize,
}

impl SitespeedExecutor {
    /// Build an executor from a whitespace-split command line (e.g.
    /// `sitespeed.io` or a docker wrapper invocation)
    pub fn new(command_line: &str, timeout: Duration, log_cap_bytes: usize) -> Self {
        let command = command_line
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        Self {
            command,
            timeout,
            log_cap_bytes,
        }
    }
}

#[async_trait]
impl ScanExecutor for SitespeedExecutor {
    async fn execute(&self, record: &ScanRecord) -> Result<ExecOutput, ExecError> {
        let program = self
            .command
            .first()
            .ok_or_else(|| ExecError::Spawn("empty scan command".to_string()))?;

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..])
            .arg(&record.url)
            .arg("--outputFolder")
            .arg(&record.output_dir)
            .args(&record.options)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        info!(
            "Running scan {}: {} {}",
            record.scan_id,
            program,
            record.url
        );

        let child = cmd.spawn().map_err(|e| ExecError::Spawn(e.to_string()))?;

        // On timeout the wait future is dropped, and kill_on_drop reaps the
        // child, so no subprocess outlives its budget.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(ExecError::Spawn(e.to_string())),
            Err(_) => return Err(ExecError::Timeout(self.timeout.as_secs())),
        };

        if output.status.success() {
            debug!("Scan {} subprocess exited cleanly", record.scan_id);
            Ok(ExecOutput {
                log: tail(&output.stdout, self.log_cap_bytes),
            })
        } else {
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let mut detail = tail(&output.stderr, self.log_cap_bytes);
            if detail.is_empty() {
                detail = tail(&output.stdout, self.log_cap_bytes);
            }
            Err(ExecError::NonZeroExit { code, detail })
        }
    }
}

/// Lossy UTF-8 view of at most the last `cap` bytes, trimmed
fn tail(bytes: &[u8], cap: usize) -> String {
    let start = bytes.len().saturating_sub(cap);
    String::from_utf8_lossy(&bytes[start..]).trim().to_string()
}
