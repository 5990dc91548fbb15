//! Configuration management for complyscan.
//!
//! All knobs come from the environment (loaded through dotenvy in main)
//! with working defaults, so a bare `comply` invocation runs against
//! `~/.local/share/complyscan` without any setup.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Explicit database URL; overrides the data-dir default when set.
    pub database_url: Option<String>,
    /// Database filename under the data directory.
    pub database_filename: String,
    /// Directory where finished reports are written.
    pub report_dir: PathBuf,
    /// Orchestrator poll interval.
    pub scan_poll_interval: Duration,
    /// Validator poll interval.
    pub result_poll_interval: Duration,
    /// Reporter poll interval.
    pub report_poll_interval: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Base backoff delay in seconds.
    pub retry_base_delay: f64,
    /// Backoff delay ceiling in seconds.
    pub retry_max_delay: f64,
    /// Identity stamped into result rows by validators.
    pub worker_id: String,
    /// How long a claimed result row stays invisible to other validators.
    pub result_lease: Duration,
    /// Evidence truncation cap in bytes.
    pub max_evidence_chars: usize,
    /// Search hit cap per artifact during evidence extraction.
    pub max_search_hits: usize,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("complyscan");

        Self {
            report_dir: data_dir.join("reports"),
            data_dir,
            database_url: None,
            database_filename: "complyscan.db".to_string(),
            scan_poll_interval: Duration::from_secs(5),
            result_poll_interval: Duration::from_secs(5),
            report_poll_interval: Duration::from_secs(5),
            max_retries: 3,
            retry_base_delay: 1.0,
            retry_max_delay: 30.0,
            worker_id: default_worker_id(),
            result_lease: Duration::from_secs(300),
            max_evidence_chars: 4000,
            max_search_hits: 50,
        }
    }
}

fn default_worker_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{}-validator-1", host)
}

fn env_secs(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_f64(name: &str, default: f64) -> f64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(default)
}

impl Settings {
    /// Build settings from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_dir = std::env::var("COMPLY_DATA_DIR")
            .map(|v| PathBuf::from(shellexpand::tilde(&v).as_ref()))
            .unwrap_or(defaults.data_dir);

        let report_dir = std::env::var("REPORT_OUTPUT_DIR")
            .map(|v| PathBuf::from(shellexpand::tilde(&v).as_ref()))
            .unwrap_or_else(|_| data_dir.join("reports"));

        Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            report_dir,
            data_dir,
            database_filename: defaults.database_filename,
            scan_poll_interval: env_secs("SCAN_POLL_INTERVAL", defaults.scan_poll_interval),
            result_poll_interval: env_secs("RESULT_POLL_INTERVAL", defaults.result_poll_interval),
            report_poll_interval: env_secs("REPORT_POLL_INTERVAL", defaults.report_poll_interval),
            max_retries: std::env::var("MAX_RETRIES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_retries),
            retry_base_delay: env_f64("RETRY_BASE_DELAY", defaults.retry_base_delay),
            retry_max_delay: env_f64("RETRY_MAX_DELAY", defaults.retry_max_delay),
            worker_id: std::env::var("WORKER_ID").unwrap_or(defaults.worker_id),
            result_lease: env_secs("RESULT_LEASE_SECS", defaults.result_lease),
            max_evidence_chars: std::env::var("MAX_EVIDENCE_CHARS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_evidence_chars),
            max_search_hits: std::env::var("MAX_SEARCH_HITS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_search_hits),
        }
    }

    /// Get the full path to the database file.
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Effective database URL for pool creation.
    pub fn database_url(&self) -> String {
        self.database_url
            .clone()
            .unwrap_or_else(|| self.database_path().display().to_string())
    }

    /// Retry behavior for validators and the audit scheduler.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            ..RetryConfig::default()
        }
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.report_dir)?;
        Ok(())
    }
}
