//! Acquisition settings
//! Times in milliseconds. Env vars override file values: AMC_<SETTING>=value

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Where Windows keeps the live Amcache hive
pub const DEFAULT_LIVE_HIVE: &str = r"C:\Windows\AppCompat\Programs\Amcache.hve";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquireConfig {
    /// Hive loaded as an application hive for live acquisition
    pub live_hive_path: PathBuf,
    /// Snapshot attempts before giving up
    pub attempts: u32,
    /// Fixed wait between attempts
    pub backoff_ms: u64,
    /// Keep the raw export here instead of a self-deleting temp file
    pub snapshot_out: Option<PathBuf>,
    /// Directory for the anonymous snapshot (system temp dir if unset)
    pub temp_dir: Option<PathBuf>,
}

impl Default for AcquireConfig {
    fn default() -> Self {
        Self {
            live_hive_path: PathBuf::from(DEFAULT_LIVE_HIVE),
            attempts: 3,
            backoff_ms: 1000,
            snapshot_out: None,
            temp_dir: None,
        }
    }
}

impl AcquireConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.attempts.max(1),
            delay: Duration::from_millis(self.backoff_ms),
        }
    }

    pub fn temp_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Apply AMC_* overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_vars(|name| std::env::var(name).ok());
    }

    /// Apply overrides from `lookup`; unparsable numbers are ignored
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("AMC_LIVE_HIVE_PATH") {
            self.live_hive_path = PathBuf::from(path);
        }
        if let Some(n) = lookup("AMC_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.attempts = n;
        }
        if let Some(ms) = lookup("AMC_BACKOFF_MS").and_then(|v| v.parse().ok()) {
            self.backoff_ms = ms;
        }
        if let Some(path) = lookup("AMC_SNAPSHOT_OUT") {
            self.snapshot_out = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("AMC_TEMP_DIR") {
            self.temp_dir = Some(PathBuf::from(path));
        }
    }
}
