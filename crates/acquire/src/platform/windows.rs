// Win32 / NT implementation of the platform capability interface.
// Strict cfg(windows) boundary; nothing here is reachable on other hosts.
//
// Handle ownership: every HANDLE/HKEY produced here is returned to the caller
// as an opaque integer and released only through close_file/close_key/close_token.

use super::{
    Destination, FileHandle, KeyHandle, Luid, Platform, PredefinedKey, PrivilegeAdjustment,
    SeekOrigin, TokenHandle,
};
use std::ffi::OsStr;
use std::mem::MaybeUninit;
use std::os::windows::ffi::OsStrExt;
use std::path::Path;
use std::ptr;

use windows_sys::Win32::Foundation::{
    CloseHandle, GetLastError, ERROR_SUCCESS, GENERIC_READ, GENERIC_WRITE, HANDLE,
    INVALID_HANDLE_VALUE, LUID, MAX_PATH,
};
use windows_sys::Win32::Security::{
    AdjustTokenPrivileges, GetTokenInformation, LookupPrivilegeValueW, TokenElevation,
    LUID_AND_ATTRIBUTES, SE_PRIVILEGE_ENABLED, TOKEN_ADJUST_PRIVILEGES, TOKEN_ELEVATION,
    TOKEN_PRIVILEGES, TOKEN_QUERY,
};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileW, DeleteFileW, GetTempFileNameW, ReadFile, SetFilePointerEx, CREATE_ALWAYS,
    FILE_ATTRIBUTE_NORMAL, FILE_ATTRIBUTE_TEMPORARY, FILE_BEGIN, FILE_CURRENT, FILE_END,
    FILE_FLAG_DELETE_ON_CLOSE, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
};
use windows_sys::Win32::System::Registry::{
    RegCloseKey, RegLoadAppKeyW, RegOpenKeyExW, HKEY, HKEY_CLASSES_ROOT, HKEY_CURRENT_CONFIG,
    HKEY_CURRENT_USER, HKEY_LOCAL_MACHINE, HKEY_USERS, KEY_READ, KEY_WOW64_64KEY,
};
use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

/// NtSaveKeyEx format: standard hive layout, no compression
const REG_NO_COMPRESSION: u32 = 4;

#[link(name = "ntdll")]
extern "system" {
    fn NtSaveKeyEx(key_handle: HANDLE, file_handle: HANDLE, format: u32) -> i32;
}

/// Convert Rust string to UTF-16 null-terminated wide string
fn to_wide(s: &OsStr) -> Vec<u16> {
    s.encode_wide().chain(std::iter::once(0)).collect()
}

fn last_error() -> u32 {
    unsafe { GetLastError() }
}

fn predefined_hkey(root: PredefinedKey) -> HKEY {
    match root {
        PredefinedKey::LocalMachine => HKEY_LOCAL_MACHINE,
        PredefinedKey::Users => HKEY_USERS,
        PredefinedKey::CurrentUser => HKEY_CURRENT_USER,
        PredefinedKey::ClassesRoot => HKEY_CLASSES_ROOT,
        PredefinedKey::CurrentConfig => HKEY_CURRENT_CONFIG,
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsPlatform;

impl WindowsPlatform {
    pub fn new() -> Self {
        Self
    }

    /// Ask the OS for a unique file name in `dir` (prefix "hiv").
    /// GetTempFileNameW creates the file; CreateFileW below truncates it.
    fn unique_temp_path(dir: &Path) -> Result<Vec<u16>, u32> {
        let dir_w = to_wide(dir.as_os_str());
        let prefix_w = to_wide(OsStr::new("hiv"));
        let mut buffer = [0u16; MAX_PATH as usize];

        let unique = unsafe {
            GetTempFileNameW(
                dir_w.as_ptr(),
                prefix_w.as_ptr(),
                0,
                buffer.as_mut_ptr(),
            )
        };
        if unique == 0 {
            return Err(last_error());
        }

        let len = buffer.iter().position(|&c| c == 0).unwrap_or(buffer.len());
        let mut path: Vec<u16> = buffer[..len].to_vec();
        path.push(0);
        Ok(path)
    }

    /// Reserve a unique name in `dir` and open it with `open`.
    /// The name reserved by GetTempFileNameW is removed again if `open` fails.
    fn create_temporary(
        dir: &Path,
        open: impl FnOnce(&[u16]) -> Result<FileHandle, u32>,
    ) -> Result<FileHandle, u32> {
        let path_w = Self::unique_temp_path(dir)?;
        open(&path_w).map_err(|code| {
            unsafe { DeleteFileW(path_w.as_ptr()) };
            code
        })
    }

    fn open_destination(path_w: &[u16], attributes: u32) -> Result<FileHandle, u32> {
        let handle = unsafe {
            CreateFileW(
                path_w.as_ptr(),
                GENERIC_READ | GENERIC_WRITE,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                ptr::null(),
                CREATE_ALWAYS,
                attributes,
                ptr::null_mut(),
            )
        };
        if handle == INVALID_HANDLE_VALUE {
            return Err(last_error());
        }
        Ok(FileHandle(handle as usize))
    }
}

impl Platform for WindowsPlatform {
    fn supports_live_acquisition(&self) -> bool {
        true
    }

    fn is_elevated(&self) -> bool {
        unsafe {
            let mut token_handle: HANDLE = ptr::null_mut();
            if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token_handle) == 0 {
                return false;
            }

            let mut elevation = MaybeUninit::<TOKEN_ELEVATION>::uninit();
            let mut return_length: u32 = 0;
            let result = GetTokenInformation(
                token_handle,
                TokenElevation,
                elevation.as_mut_ptr() as *mut _,
                std::mem::size_of::<TOKEN_ELEVATION>() as u32,
                &mut return_length,
            );

            CloseHandle(token_handle);

            if result == 0 {
                return false;
            }
            elevation.assume_init().TokenIsElevated != 0
        }
    }

    fn lookup_privilege(&self, name: &str) -> Result<Luid, u32> {
        let name_w = to_wide(OsStr::new(name));
        let mut luid = LUID {
            LowPart: 0,
            HighPart: 0,
        };
        let ok = unsafe { LookupPrivilegeValueW(ptr::null(), name_w.as_ptr(), &mut luid) };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(Luid {
            low: luid.LowPart,
            high: luid.HighPart,
        })
    }

    fn open_process_token(&self) -> Result<TokenHandle, u32> {
        let mut token: HANDLE = ptr::null_mut();
        let ok = unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_ADJUST_PRIVILEGES, &mut token) };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(TokenHandle(token as usize))
    }

    fn adjust_token_privilege(&self, token: TokenHandle, luid: Luid) -> PrivilegeAdjustment {
        let privileges = TOKEN_PRIVILEGES {
            PrivilegeCount: 1,
            Privileges: [LUID_AND_ATTRIBUTES {
                Luid: LUID {
                    LowPart: luid.low,
                    HighPart: luid.high,
                },
                Attributes: SE_PRIVILEGE_ENABLED,
            }],
        };

        let ok = unsafe {
            AdjustTokenPrivileges(
                token.0 as HANDLE,
                0,
                &privileges,
                0,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        // Read unconditionally: ERROR_NOT_ALL_ASSIGNED arrives with ok != 0
        let trailing = last_error();

        PrivilegeAdjustment {
            succeeded: ok != 0,
            last_error: trailing,
        }
    }

    fn close_token(&self, token: TokenHandle) {
        unsafe {
            CloseHandle(token.0 as HANDLE);
        }
    }

    fn open_live_key(
        &self,
        root: PredefinedKey,
        path: &str,
        wow64: bool,
    ) -> Result<KeyHandle, u32> {
        let path_w = to_wide(OsStr::new(path));
        let access = KEY_READ | if wow64 { KEY_WOW64_64KEY } else { 0 };
        let mut hkey: HKEY = ptr::null_mut();

        let status =
            unsafe { RegOpenKeyExW(predefined_hkey(root), path_w.as_ptr(), 0, access, &mut hkey) };
        if status != ERROR_SUCCESS {
            return Err(status);
        }
        Ok(KeyHandle(hkey as usize))
    }

    fn supports_app_hives(&self) -> bool {
        // RegLoadAppKeyW is linked statically; every supported release has it
        true
    }

    fn load_app_hive(&self, path: &Path) -> Result<KeyHandle, u32> {
        let path_w = to_wide(path.as_os_str());
        let mut hkey: HKEY = ptr::null_mut();

        let status = unsafe { RegLoadAppKeyW(path_w.as_ptr(), &mut hkey, KEY_READ, 0, 0) };
        if status != ERROR_SUCCESS {
            return Err(status);
        }
        Ok(KeyHandle(hkey as usize))
    }

    fn save_key(&self, key: KeyHandle, file: FileHandle) -> Result<(), i32> {
        let status =
            unsafe { NtSaveKeyEx(key.0 as HANDLE, file.0 as HANDLE, REG_NO_COMPRESSION) };
        if status != 0 {
            return Err(status);
        }
        Ok(())
    }

    fn close_key(&self, key: KeyHandle) {
        unsafe {
            RegCloseKey(key.0 as HKEY);
        }
    }

    fn create_destination(&self, destination: &Destination) -> Result<FileHandle, u32> {
        match destination {
            Destination::Temporary { dir } => Self::create_temporary(dir, |path_w| {
                let attributes = FILE_ATTRIBUTE_TEMPORARY | FILE_FLAG_DELETE_ON_CLOSE;
                Self::open_destination(path_w, attributes)
            }),
            Destination::Persistent(path) => {
                Self::open_destination(&to_wide(path.as_os_str()), FILE_ATTRIBUTE_NORMAL)
            }
        }
    }

    fn seek(&self, file: FileHandle, offset: i64, origin: SeekOrigin) -> Result<u64, u32> {
        let method = match origin {
            SeekOrigin::Start => FILE_BEGIN,
            SeekOrigin::Current => FILE_CURRENT,
            SeekOrigin::End => FILE_END,
        };
        let mut position: i64 = 0;

        let ok = unsafe { SetFilePointerEx(file.0 as HANDLE, offset, &mut position, method) };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(position as u64)
    }

    fn read(&self, file: FileHandle, buf: &mut [u8]) -> Result<usize, u32> {
        let request = buf.len().min(u32::MAX as usize) as u32;
        let mut read: u32 = 0;

        let ok = unsafe {
            ReadFile(
                file.0 as HANDLE,
                buf.as_mut_ptr(),
                request,
                &mut read,
                ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(last_error());
        }
        Ok(read as usize)
    }

    fn close_file(&self, file: FileHandle) {
        unsafe {
            CloseHandle(file.0 as HANDLE);
        }
    }
}
