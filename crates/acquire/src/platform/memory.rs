//! In-memory platform for tests.
//!
//! Keys, files and the process token live in a mutex-guarded table. Failure
//! injection covers every error path the snapshotter and elevator handle, and
//! `open_handles()` lets tests assert that nothing leaked.

use super::{
    Destination, FileHandle, KeyHandle, Luid, Platform, PredefinedKey, PrivilegeAdjustment,
    SeekOrigin, TokenHandle, SE_BACKUP_NAME,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const ERROR_FILE_NOT_FOUND: u32 = 2;
const ERROR_ACCESS_DENIED: u32 = 5;
const ERROR_INVALID_HANDLE: u32 = 6;
const ERROR_SHARING_VIOLATION: u32 = 32;
const ERROR_NEGATIVE_SEEK: u32 = 131;
const ERROR_NO_SUCH_PRIVILEGE: u32 = 1313;
/// STATUS_ACCESS_DENIED
pub const STATUS_ACCESS_DENIED: i32 = 0xC000_0022_u32 as i32;

/// Bytes of a minimal hive container: magic, two sequence numbers, padding.
/// `dirty` writes the "not cleanly committed" 1/1 sequence pattern.
pub fn container_bytes(dirty: bool, len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(len.max(12));
    bytes.extend_from_slice(b"regf");
    let seq: u32 = if dirty { 1 } else { 7 };
    bytes.extend_from_slice(&seq.to_le_bytes());
    bytes.extend_from_slice(&seq.to_le_bytes());
    while bytes.len() < len {
        bytes.push((bytes.len() % 251) as u8);
    }
    bytes
}

#[derive(Debug)]
struct MemFile {
    data: Vec<u8>,
    pos: u64,
    persistent_path: Option<PathBuf>,
}

#[derive(Debug)]
enum Entry {
    Key(Vec<u8>),
    File(MemFile),
    Token,
}

#[derive(Debug)]
struct State {
    elevated: bool,
    privilege_known: bool,
    token_openable: bool,
    adjust_succeeds: bool,
    adjust_last_error: u32,
    privilege_enabled: bool,
    app_hives_supported: bool,
    live_keys: HashMap<(PredefinedKey, String), Vec<u8>>,
    app_hives: HashMap<PathBuf, Vec<u8>>,
    open_failures_remaining: u32,
    save_failures_remaining: u32,
    read_failure: Option<u32>,
    destination_fails: bool,
    next_handle: usize,
    handles: HashMap<usize, Entry>,
    persisted: HashMap<PathBuf, Vec<u8>>,
    save_attempts: u32,
    wow64_requests: u32,
}

#[derive(Debug)]
pub struct MemoryPlatform {
    state: Mutex<State>,
}

impl Default for MemoryPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                elevated: true,
                privilege_known: true,
                token_openable: true,
                adjust_succeeds: true,
                adjust_last_error: 0,
                privilege_enabled: false,
                app_hives_supported: true,
                live_keys: HashMap::new(),
                app_hives: HashMap::new(),
                open_failures_remaining: 0,
                save_failures_remaining: 0,
                read_failure: None,
                destination_fails: false,
                next_handle: 0x100,
                handles: HashMap::new(),
                persisted: HashMap::new(),
                save_attempts: 0,
                wow64_requests: 0,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn with_live_key(self, root: PredefinedKey, path: &str, hive: Vec<u8>) -> Self {
        self.state()
            .live_keys
            .insert((root, path.to_ascii_lowercase()), hive);
        self
    }

    pub fn with_app_hive(self, path: impl Into<PathBuf>, hive: Vec<u8>) -> Self {
        self.state().app_hives.insert(path.into(), hive);
        self
    }

    pub fn without_app_hive_support(self) -> Self {
        self.state().app_hives_supported = false;
        self
    }

    pub fn not_elevated(self) -> Self {
        self.state().elevated = false;
        self
    }

    pub fn without_privilege(self) -> Self {
        self.state().privilege_known = false;
        self
    }

    pub fn with_locked_token(self) -> Self {
        self.state().token_openable = false;
        self
    }

    /// Adjust reports success but leaves `code` as the trailing last-error
    pub fn with_trailing_adjust_error(self, code: u32) -> Self {
        self.state().adjust_last_error = code;
        self
    }

    pub fn with_failing_adjust(self) -> Self {
        let mut state = self.state();
        state.adjust_succeeds = false;
        state.adjust_last_error = ERROR_ACCESS_DENIED;
        drop(state);
        self
    }

    /// The next `n` key opens/loads fail with a sharing violation
    pub fn fail_opens(self, n: u32) -> Self {
        self.state().open_failures_remaining = n;
        self
    }

    /// The next `n` saves fail with STATUS_ACCESS_DENIED
    pub fn fail_saves(self, n: u32) -> Self {
        self.state().save_failures_remaining = n;
        self
    }

    pub fn fail_reads(self, code: u32) -> Self {
        self.set_read_failure(Some(code));
        self
    }

    /// Toggle read failures on a platform that already has open handles
    pub fn set_read_failure(&self, code: Option<u32>) {
        self.state().read_failure = code;
    }

    pub fn fail_destination(self) -> Self {
        self.state().destination_fails = true;
        self
    }

    /// Handles of any kind not yet closed
    pub fn open_handles(&self) -> usize {
        self.state().handles.len()
    }

    pub fn save_attempts(&self) -> u32 {
        self.state().save_attempts
    }

    pub fn wow64_requests(&self) -> u32 {
        self.state().wow64_requests
    }

    pub fn privilege_enabled(&self) -> bool {
        self.state().privilege_enabled
    }

    /// Contents of a persistent destination after its handle closed
    pub fn persisted(&self, path: &Path) -> Option<Vec<u8>> {
        self.state().persisted.get(path).cloned()
    }

    fn insert(state: &mut State, entry: Entry) -> usize {
        let id = state.next_handle;
        state.next_handle += 4;
        state.handles.insert(id, entry);
        id
    }

    fn open_key_bytes(&self, bytes: Option<Vec<u8>>) -> Result<KeyHandle, u32> {
        let mut state = self.state();
        if state.open_failures_remaining > 0 {
            state.open_failures_remaining -= 1;
            return Err(ERROR_SHARING_VIOLATION);
        }
        let bytes = bytes.ok_or(ERROR_FILE_NOT_FOUND)?;
        Ok(KeyHandle(Self::insert(&mut state, Entry::Key(bytes))))
    }
}

impl Platform for MemoryPlatform {
    fn supports_live_acquisition(&self) -> bool {
        true
    }

    fn is_elevated(&self) -> bool {
        self.state().elevated
    }

    fn lookup_privilege(&self, name: &str) -> Result<Luid, u32> {
        if name != SE_BACKUP_NAME || !self.state().privilege_known {
            return Err(ERROR_NO_SUCH_PRIVILEGE);
        }
        Ok(Luid { low: 17, high: 0 })
    }

    fn open_process_token(&self) -> Result<TokenHandle, u32> {
        let mut state = self.state();
        if !state.token_openable {
            return Err(ERROR_ACCESS_DENIED);
        }
        Ok(TokenHandle(Self::insert(&mut state, Entry::Token)))
    }

    fn adjust_token_privilege(&self, token: TokenHandle, _luid: Luid) -> PrivilegeAdjustment {
        let mut state = self.state();
        if !matches!(state.handles.get(&token.0), Some(Entry::Token)) {
            return PrivilegeAdjustment {
                succeeded: false,
                last_error: ERROR_INVALID_HANDLE,
            };
        }
        let adjustment = PrivilegeAdjustment {
            succeeded: state.adjust_succeeds,
            last_error: state.adjust_last_error,
        };
        if adjustment.succeeded && adjustment.last_error == 0 {
            state.privilege_enabled = true;
        }
        adjustment
    }

    fn close_token(&self, token: TokenHandle) {
        self.state().handles.remove(&token.0);
    }

    fn open_live_key(
        &self,
        root: PredefinedKey,
        path: &str,
        wow64: bool,
    ) -> Result<KeyHandle, u32> {
        let bytes = {
            let mut state = self.state();
            if wow64 {
                state.wow64_requests += 1;
            }
            state
                .live_keys
                .get(&(root, path.to_ascii_lowercase()))
                .cloned()
        };
        self.open_key_bytes(bytes)
    }

    fn supports_app_hives(&self) -> bool {
        self.state().app_hives_supported
    }

    fn load_app_hive(&self, path: &Path) -> Result<KeyHandle, u32> {
        let bytes = self.state().app_hives.get(path).cloned();
        self.open_key_bytes(bytes)
    }

    fn save_key(&self, key: KeyHandle, file: FileHandle) -> Result<(), i32> {
        let mut state = self.state();
        state.save_attempts += 1;
        if state.save_failures_remaining > 0 {
            state.save_failures_remaining -= 1;
            return Err(STATUS_ACCESS_DENIED);
        }
        let bytes = match state.handles.get(&key.0) {
            Some(Entry::Key(bytes)) => bytes.clone(),
            _ => return Err(0xC000_0008_u32 as i32), // STATUS_INVALID_HANDLE
        };
        match state.handles.get_mut(&file.0) {
            Some(Entry::File(mem)) => {
                mem.data = bytes;
                mem.pos = mem.data.len() as u64;
                Ok(())
            }
            _ => Err(0xC000_0008_u32 as i32),
        }
    }

    fn close_key(&self, key: KeyHandle) {
        self.state().handles.remove(&key.0);
    }

    fn create_destination(&self, destination: &Destination) -> Result<FileHandle, u32> {
        let mut state = self.state();
        if state.destination_fails {
            return Err(ERROR_ACCESS_DENIED);
        }
        let file = MemFile {
            data: Vec::new(),
            pos: 0,
            persistent_path: destination.path().map(Path::to_path_buf),
        };
        Ok(FileHandle(Self::insert(&mut state, Entry::File(file))))
    }

    fn seek(&self, file: FileHandle, offset: i64, origin: SeekOrigin) -> Result<u64, u32> {
        let mut state = self.state();
        let Some(Entry::File(mem)) = state.handles.get_mut(&file.0) else {
            return Err(ERROR_INVALID_HANDLE);
        };
        let base = match origin {
            SeekOrigin::Start => 0i64,
            SeekOrigin::Current => mem.pos as i64,
            SeekOrigin::End => mem.data.len() as i64,
        };
        let target = base.checked_add(offset).ok_or(ERROR_NEGATIVE_SEEK)?;
        if target < 0 {
            return Err(ERROR_NEGATIVE_SEEK);
        }
        mem.pos = target as u64;
        Ok(mem.pos)
    }

    fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, u32> {
        let mut state = self.state();
        if let Some(code) = state.read_failure {
            return Err(code);
        }
        let Some(Entry::File(mem)) = state.handles.get_mut(&file.0) else {
            return Err(ERROR_INVALID_HANDLE);
        };
        let start = (mem.pos as usize).min(mem.data.len());
        let n = buf.len().min(mem.data.len() - start);
        buf[..n].copy_from_slice(&mem.data[start..start + n]);
        mem.pos += n as u64;
        Ok(n)
    }

    fn close_file(&self, file: FileHandle) {
        let mut state = self.state();
        if let Some(Entry::File(mem)) = state.handles.remove(&file.0) {
            if let Some(path) = mem.persistent_path {
                state.persisted.insert(path, mem.data);
            }
        }
    }
}
