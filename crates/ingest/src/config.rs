//! Ingestion configuration
//!
//! YAML or JSON file, then AMC_* environment variables, then CLI flags.

use crate::error::ConfigError;
use amc_acquire::AcquireConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[cfg(windows)]
const DEFAULT_DATABASE: &str = r"C:\Amcache\amcache.db";
#[cfg(not(windows))]
const DEFAULT_DATABASE: &str = "./amcache.db";

/// What to produce besides the SQLite store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    #[default]
    Sqlite,
    Json,
    Csv,
}

impl std::str::FromStr for OutputKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(OutputKind::Sqlite),
            "json" => Ok(OutputKind::Json),
            "csv" => Ok(OutputKind::Csv),
            other => Err(ConfigError::Invalid(format!(
                "unknown output kind '{}' (expected sqlite, json or csv)",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// SQLite store; exports are written next to it
    pub db_path: PathBuf,
    /// Key holding the categories, relative to the hive root
    pub root_path: String,
    /// Only these categories are ingested when set
    pub search_keys: Option<Vec<String>>,
    pub output: OutputKind,
    pub acquisition: AcquireConfig,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DATABASE),
            root_path: "Root".to_string(),
            search_keys: None,
            output: OutputKind::Sqlite,
            acquisition: AcquireConfig::default(),
        }
    }
}

/// Split a comma-separated category list, dropping blanks
pub fn parse_search_keys(raw: &str) -> Option<Vec<String>> {
    let keys: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect();
    if keys.is_empty() {
        None
    } else {
        Some(keys)
    }
}

impl IngestConfig {
    /// Load from a `.yaml`/`.yml` or `.json` file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let is_json = path
            .extension()
            .map(|e| e.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let parsed = if is_json {
            serde_json::from_str(&content).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(&content).map_err(|e| e.to_string())
        };
        parsed.map_err(|reason| ConfigError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(path) = lookup("AMC_DB_PATH") {
            self.db_path = PathBuf::from(path);
        }
        if let Some(root) = lookup("AMC_ROOT_PATH") {
            self.root_path = root;
        }
        if let Some(keys) = lookup("AMC_SEARCH_KEYS") {
            self.search_keys = parse_search_keys(&keys);
        }
        if let Some(output) = lookup("AMC_OUTPUT") {
            self.output = output.parse()?;
        }
        self.acquisition.apply_vars(&lookup);
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.db_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("database path is empty".to_string()));
        }
        if self.acquisition.attempts == 0 {
            return Err(ConfigError::Invalid(
                "acquisition attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Export file for the configured output kind, next to the store
    pub fn export_path(&self) -> Option<PathBuf> {
        match self.output {
            OutputKind::Sqlite => None,
            OutputKind::Json => Some(self.db_path.with_extension("json")),
            OutputKind::Csv => Some(self.db_path.with_extension("csv")),
        }
    }
}
