/// Stable error taxonomy shared by acquisition and ingestion.
/// The code is what the operator sees; crate-level error enums map onto it.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Backup privilege could not be resolved or enabled
    Privilege,
    /// Host lacks the capability (app hives, live snapshots)
    UnsupportedPlatform,
    /// Registry key open or application hive load failed
    HiveAccess,
    /// Privileged export failed or produced an invalid container
    Snapshot,
    /// Handle creation, seek or read failure
    Io,
    /// All acquisition attempts failed
    ExhaustedRetries,
    /// Schema or insert failure in the relational store
    Store,
    /// Snapshot bytes could not be decoded into a key tree
    Decode,
    /// Configuration could not be loaded
    Config,
}

impl ErrorCode {
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::Privilege => "privilege",
            ErrorCode::UnsupportedPlatform => "unsupported_platform",
            ErrorCode::HiveAccess => "hive_access",
            ErrorCode::Snapshot => "snapshot",
            ErrorCode::Io => "io",
            ErrorCode::ExhaustedRetries => "exhausted_retries",
            ErrorCode::Store => "store",
            ErrorCode::Decode => "decode",
            ErrorCode::Config => "config",
        }
    }

    /// Process exit code for a run that aborted with this category.
    pub fn exit_code(&self) -> i32 {
        match self {
            ErrorCode::Config => 2,
            ErrorCode::Privilege => 3,
            ErrorCode::UnsupportedPlatform => 4,
            ErrorCode::HiveAccess | ErrorCode::Snapshot | ErrorCode::Io => 5,
            ErrorCode::ExhaustedRetries => 6,
            ErrorCode::Decode => 7,
            ErrorCode::Store => 8,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User-visible report for a fatal error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: ErrorCode,
    pub message: String,
    /// Native status (NTSTATUS, Win32 error) when the platform supplied one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub native_code: Option<i64>,
}

impl ErrorReport {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            native_code: None,
        }
    }

    pub fn with_native_code(mut self, native_code: Option<i64>) -> Self {
        self.native_code = native_code;
        self
    }
}

impl std::fmt::Display for ErrorReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(code) = self.native_code {
            write!(f, " (native code {:#x})", code)?;
        }
        Ok(())
    }
}
