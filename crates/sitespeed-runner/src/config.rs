//! Configuration management
//!
//! Loads configuration from environment variables with sensible defaults.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// API server host
    pub host: String,

    /// API server port
    pub port: u16,

    /// Root directory for per-scan output directories
    pub reports_dir: PathBuf,

    /// External scan command line, whitespace-split into program + base args
    pub sitespeed_command: String,

    /// Wall-clock budget for one scan subprocess, in seconds
    pub scan_timeout_secs: u64,

    /// Number of concurrent scan workers
    pub worker_count: usize,

    /// Cap on captured subprocess output, in bytes
    pub log_cap_bytes: usize,

    /// How long to keep finished scan records, in seconds; 0 disables eviction
    pub retention_secs: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists (for local development)
        dotenvy::dotenv().ok();

        let config = Config {
            host: env::var("RUNNER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: env::var("RUNNER_PORT")
                .unwrap_or_else(|_| "5679".to_string())
                .parse()
                .context("Invalid RUNNER_PORT")?,

            reports_dir: env::var("REPORTS_DIR")
                .unwrap_or_else(|_| "./reports".to_string())
                .into(),

            sitespeed_command: env::var("SITESPEED_COMMAND")
                .unwrap_or_else(|_| "sitespeed.io".to_string()),

            scan_timeout_secs: env::var("SCAN_TIMEOUT_SECS")
                .unwrap_or_else(|_| "1800".to_string())
                .parse()
                .context("Invalid SCAN_TIMEOUT_SECS")?,

            worker_count: env::var("SCAN_WORKERS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .context("Invalid SCAN_WORKERS")?,

            log_cap_bytes: env::var("SCAN_LOG_CAP_BYTES")
                .unwrap_or_else(|_| "65536".to_string())
                .parse()
                .context("Invalid SCAN_LOG_CAP_BYTES")?,

            retention_secs: env::var("SCAN_RETENTION_SECS")
                .unwrap_or_else(|_| "86400".to_string())
                .parse()
                .context("Invalid SCAN_RETENTION_SECS")?,
        };

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            anyhow::bail!("RUNNER_PORT must be greater than 0");
        }
        if self.sitespeed_command.trim().is_empty() {
            anyhow::bail!("SITESPEED_COMMAND must not be empty");
        }
        if self.scan_timeout_secs == 0 {
            anyhow::bail!("SCAN_TIMEOUT_SECS must be greater than 0");
        }
        if self.worker_count == 0 {
            anyhow::bail!("SCAN_WORKERS must be greater than 0");
        }
        if self.log_cap_bytes == 0 {
            anyhow::bail!("SCAN_LOG_CAP_BYTES must be greater than 0");
        }

        Ok(())
    }

    /// Get the API server address
    pub fn api_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Scan subprocess wall-clock budget
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    /// Finished-record retention window, if eviction is enabled
    pub fn retention(&self) -> Option<Duration> {
        (self.retention_secs > 0).then(|| Duration::from_secs(self.retention_secs))
    }

    /// Ensure the reports directory exists
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.reports_dir).with_context(|| {
            format!(
                "Failed to create reports directory: {}",
                self.reports_dir.display()
            )
        })?;

        Ok(())
    }
}
