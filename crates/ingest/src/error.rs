//! Ingestion error types

use amc_acquire::AcquireError;
use amc_core::{ErrorCode, ErrorReport};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Value map serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Category {category} would overwrite bookkeeping table {table}")]
    ReservedTable { category: String, table: String },
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Hive could not be parsed: {0}")]
    Hive(String),

    #[error("Key path not found in hive: {0}")]
    MissingPath(String),

    #[error("Key nesting deeper than {0} levels")]
    TooDeep(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Anything that aborts a run
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{op} failed: {source}")]
    Io {
        op: String,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            PipelineError::Acquire(err) => err.code(),
            PipelineError::Store(_) => ErrorCode::Store,
            PipelineError::Decode(_) => ErrorCode::Decode,
            PipelineError::Config(_) => ErrorCode::Config,
            PipelineError::Io { .. } => ErrorCode::Io,
        }
    }

    pub fn report(&self) -> ErrorReport {
        match self {
            PipelineError::Acquire(err) => err.report(),
            PipelineError::Io { source, .. } => ErrorReport::new(self.code(), self.to_string())
                .with_native_code(source.raw_os_error().map(i64::from)),
            _ => ErrorReport::new(self.code(), self.to_string()),
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_errors_keep_their_category() {
        let err = PipelineError::from(AcquireError::HiveAccess {
            path: "Amcache.hve".into(),
            code: 32,
        });
        assert_eq!(err.code(), ErrorCode::HiveAccess);
        assert_eq!(err.report().native_code, Some(32));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_ingest_categories() {
        let err = PipelineError::from(DecodeError::MissingPath("Root".into()));
        assert_eq!(err.code(), ErrorCode::Decode);
        assert_eq!(err.to_string(), "Key path not found in hive: Root");

        let err = PipelineError::from(ConfigError::Invalid("attempts must be positive".into()));
        assert_eq!(err.exit_code(), 2);
    }
}
