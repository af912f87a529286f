//! Platform capability interface
//!
//! Every native call the acquisition pipeline makes goes through [`Platform`].
//! Handles are opaque integers owned by the caller; whoever receives a handle
//! from a `Platform` method is responsible for passing it back to the matching
//! `close_*` exactly once.
//!
//! Errors are raw platform codes: Win32 error codes (`u32`) everywhere except
//! `save_key`, which reports an NTSTATUS (`i32`).

#[cfg(any(test, feature = "test-util"))]
pub mod memory;
pub mod unsupported;
#[cfg(windows)]
pub mod windows;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Privilege that lets the process read any key for backup purposes
pub const SE_BACKUP_NAME: &str = "SeBackupPrivilege";

/// ERROR_NOT_SUPPORTED
pub const ERROR_NOT_SUPPORTED: u32 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenHandle(pub usize);

/// Locally unique identifier of a privilege
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Luid {
    pub low: u32,
    pub high: i32,
}

/// Raw outcome of adjusting a token privilege.
///
/// The adjust call can report success while leaving a trailing last-error
/// (ERROR_NOT_ALL_ASSIGNED); both are surfaced so the caller can reject it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrivilegeAdjustment {
    pub succeeded: bool,
    pub last_error: u32,
}

/// Predefined registry roots a live subtree can hang off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredefinedKey {
    LocalMachine,
    Users,
    CurrentUser,
    ClassesRoot,
    CurrentConfig,
}

impl PredefinedKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredefinedKey::LocalMachine => "HKEY_LOCAL_MACHINE",
            PredefinedKey::Users => "HKEY_USERS",
            PredefinedKey::CurrentUser => "HKEY_CURRENT_USER",
            PredefinedKey::ClassesRoot => "HKEY_CLASSES_ROOT",
            PredefinedKey::CurrentConfig => "HKEY_CURRENT_CONFIG",
        }
    }
}

/// Origin for [`Platform::seek`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Start,
    Current,
    End,
}

/// Where the privileged export is written
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// Uniquely named file in `dir`, deleted when its handle closes
    Temporary { dir: PathBuf },
    /// Caller-chosen file, created or truncated, kept after close
    Persistent(PathBuf),
}

impl Destination {
    pub fn path(&self) -> Option<&Path> {
        match self {
            Destination::Temporary { .. } => None,
            Destination::Persistent(path) => Some(path),
        }
    }
}

pub trait Platform {
    /// Whether live snapshots can be taken on this host at all
    fn supports_live_acquisition(&self) -> bool;

    /// Whether the process token is elevated
    fn is_elevated(&self) -> bool;

    fn lookup_privilege(&self, name: &str) -> Result<Luid, u32>;

    /// Open the current process token with adjust-privileges access
    fn open_process_token(&self) -> Result<TokenHandle, u32>;

    fn adjust_token_privilege(&self, token: TokenHandle, luid: Luid) -> PrivilegeAdjustment;

    fn close_token(&self, token: TokenHandle);

    /// Open a live subtree for read, optionally through the 64-bit view
    fn open_live_key(&self, root: PredefinedKey, path: &str, wow64: bool)
        -> Result<KeyHandle, u32>;

    fn supports_app_hives(&self) -> bool;

    /// Load a standalone hive file as an isolated key tree
    fn load_app_hive(&self, path: &Path) -> Result<KeyHandle, u32>;

    /// Serialize the key's whole subtree, uncompressed, into `file`
    fn save_key(&self, key: KeyHandle, file: FileHandle) -> Result<(), i32>;

    fn close_key(&self, key: KeyHandle);

    fn create_destination(&self, destination: &Destination) -> Result<FileHandle, u32>;

    /// Move the file pointer; returns the new absolute position
    fn seek(&self, file: FileHandle, offset: i64, origin: SeekOrigin) -> Result<u64, u32>;

    /// Read at the current position; `Ok(0)` means end of file
    fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, u32>;

    fn close_file(&self, file: FileHandle);
}

/// The platform for the host this binary was built for
#[cfg(windows)]
pub fn host_platform() -> Box<dyn Platform> {
    Box::new(windows::WindowsPlatform::new())
}

/// The platform for the host this binary was built for
#[cfg(not(windows))]
pub fn host_platform() -> Box<dyn Platform> {
    Box::new(unsupported::UnsupportedPlatform)
}
