//! Acquisition error taxonomy
//!
//! Variants carry the native status where the platform supplied one so the
//! operator sees the raw NTSTATUS / Win32 code next to the category.

use amc_core::{ErrorCode, ErrorReport};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("Cannot enable {privilege}: {reason} (error {code})")]
    Privilege {
        privilege: String,
        reason: String,
        code: u32,
    },

    #[error("Unsupported on this host: {capability}")]
    UnsupportedPlatform { capability: String },

    #[error("Cannot open hive key {path} (error {code})")]
    HiveAccess { path: String, code: u32 },

    #[error("Snapshot failed: {reason}")]
    Snapshot { reason: String, status: Option<i32> },

    #[error("{op} failed: {source}")]
    Io {
        op: String,
        #[source]
        source: io::Error,
    },

    #[error("Acquisition failed after {attempts} attempts: {last}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: Box<AcquireError>,
    },
}

impl AcquireError {
    pub(crate) fn io(op: impl Into<String>, code: u32) -> Self {
        AcquireError::Io {
            op: op.into(),
            source: io::Error::from_raw_os_error(code as i32),
        }
    }

    pub(crate) fn invalid_container() -> Self {
        AcquireError::Snapshot {
            reason: "invalid container".to_string(),
            status: None,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AcquireError::Privilege { .. } => ErrorCode::Privilege,
            AcquireError::UnsupportedPlatform { .. } => ErrorCode::UnsupportedPlatform,
            AcquireError::HiveAccess { .. } => ErrorCode::HiveAccess,
            AcquireError::Snapshot { .. } => ErrorCode::Snapshot,
            AcquireError::Io { .. } => ErrorCode::Io,
            AcquireError::ExhaustedRetries { .. } => ErrorCode::ExhaustedRetries,
        }
    }

    /// Raw platform status behind this error, innermost first for retries
    pub fn native_code(&self) -> Option<i64> {
        match self {
            AcquireError::Privilege { code, .. } | AcquireError::HiveAccess { code, .. } => {
                Some(*code as i64)
            }
            AcquireError::Snapshot { status, .. } => status.map(|s| s as u32 as i64),
            AcquireError::Io { source, .. } => source.raw_os_error().map(|c| c as i64),
            AcquireError::ExhaustedRetries { last, .. } => last.native_code(),
            AcquireError::UnsupportedPlatform { .. } => None,
        }
    }

    /// Contention-type failures worth another attempt.
    /// Privilege and platform failures are structural and never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AcquireError::HiveAccess { .. } | AcquireError::Snapshot { .. } | AcquireError::Io { .. }
        )
    }

    pub fn report(&self) -> ErrorReport {
        ErrorReport::new(self.code(), self.to_string()).with_native_code(self.native_code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(AcquireError::HiveAccess {
            path: "x".into(),
            code: 32
        }
        .is_transient());
        assert!(AcquireError::invalid_container().is_transient());
        assert!(!AcquireError::UnsupportedPlatform {
            capability: "app hives".into()
        }
        .is_transient());
        assert!(!AcquireError::Privilege {
            privilege: "SeBackupPrivilege".into(),
            reason: "denied".into(),
            code: 1300
        }
        .is_transient());
    }

    #[test]
    fn test_ntstatus_reported_unsigned() {
        let err = AcquireError::Snapshot {
            reason: "NtSaveKeyEx failed".into(),
            status: Some(0xC000_0022_u32 as i32),
        };
        assert_eq!(err.native_code(), Some(0xC000_0022));
        assert_eq!(err.code(), ErrorCode::Snapshot);
    }

    #[test]
    fn test_exhausted_reports_last_native_code() {
        let err = AcquireError::ExhaustedRetries {
            attempts: 3,
            last: Box::new(AcquireError::HiveAccess {
                path: "Amcache.hve".into(),
                code: 32,
            }),
        };
        assert_eq!(err.code(), ErrorCode::ExhaustedRetries);
        assert_eq!(err.native_code(), Some(32));
        assert!(err.to_string().contains("3 attempts"));
    }
}
