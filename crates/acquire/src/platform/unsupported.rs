//! Hosts without the registry save/load primitives.
//!
//! Only pre-exported hive files can be ingested here; every live operation
//! reports ERROR_NOT_SUPPORTED.

use super::{
    Destination, FileHandle, KeyHandle, Luid, Platform, PredefinedKey, PrivilegeAdjustment,
    SeekOrigin, TokenHandle, ERROR_NOT_SUPPORTED,
};
use std::path::Path;

#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedPlatform;

impl Platform for UnsupportedPlatform {
    fn supports_live_acquisition(&self) -> bool {
        false
    }

    fn is_elevated(&self) -> bool {
        false
    }

    fn lookup_privilege(&self, _name: &str) -> Result<Luid, u32> {
        Err(ERROR_NOT_SUPPORTED)
    }

    fn open_process_token(&self) -> Result<TokenHandle, u32> {
        Err(ERROR_NOT_SUPPORTED)
    }

    fn adjust_token_privilege(&self, _token: TokenHandle, _luid: Luid) -> PrivilegeAdjustment {
        PrivilegeAdjustment {
            succeeded: false,
            last_error: ERROR_NOT_SUPPORTED,
        }
    }

    fn close_token(&self, _token: TokenHandle) {}

    fn open_live_key(
        &self,
        _root: PredefinedKey,
        _path: &str,
        _wow64: bool,
    ) -> Result<KeyHandle, u32> {
        Err(ERROR_NOT_SUPPORTED)
    }

    fn supports_app_hives(&self) -> bool {
        false
    }

    fn load_app_hive(&self, _path: &Path) -> Result<KeyHandle, u32> {
        Err(ERROR_NOT_SUPPORTED)
    }

    fn save_key(&self, _key: KeyHandle, _file: FileHandle) -> Result<(), i32> {
        // STATUS_NOT_SUPPORTED
        Err(0xC000_00BB_u32 as i32)
    }

    fn close_key(&self, _key: KeyHandle) {}

    fn create_destination(&self, _destination: &Destination) -> Result<FileHandle, u32> {
        Err(ERROR_NOT_SUPPORTED)
    }

    fn seek(&self, _file: FileHandle, _offset: i64, _origin: SeekOrigin) -> Result<u64, u32> {
        Err(ERROR_NOT_SUPPORTED)
    }

    fn read(&self, _file: FileHandle, _buf: &mut [u8]) -> Result<usize, u32> {
        Err(ERROR_NOT_SUPPORTED)
    }

    fn close_file(&self, _file: FileHandle) {}
}
