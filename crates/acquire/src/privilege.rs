//! Backup privilege elevation
//!
//! Enabling SeBackupPrivilege on the process token is what lets the save-key
//! call read a hive regardless of its ACL. The change is process-wide and is
//! never reverted; enabling an already-enabled privilege is not an error.

use crate::error::AcquireError;
use crate::platform::{Platform, TokenHandle, SE_BACKUP_NAME};
use tracing::{debug, info};

/// Closes the process token on every exit path
struct TokenGuard<'p, P: Platform + ?Sized> {
    platform: &'p P,
    token: TokenHandle,
}

impl<P: Platform + ?Sized> Drop for TokenGuard<'_, P> {
    fn drop(&mut self) {
        self.platform.close_token(self.token);
    }
}

pub struct PrivilegeElevator<'p, P: Platform + ?Sized> {
    platform: &'p P,
    privilege: &'static str,
}

impl<'p, P: Platform + ?Sized> PrivilegeElevator<'p, P> {
    pub fn new(platform: &'p P) -> Self {
        Self {
            platform,
            privilege: SE_BACKUP_NAME,
        }
    }

    fn error(&self, reason: &str, code: u32) -> AcquireError {
        AcquireError::Privilege {
            privilege: self.privilege.to_string(),
            reason: reason.to_string(),
            code,
        }
    }

    /// Enable the backup privilege on the current process token
    pub fn elevate(&self) -> Result<(), AcquireError> {
        let luid = self
            .platform
            .lookup_privilege(self.privilege)
            .map_err(|code| self.error("privilege name could not be resolved", code))?;
        debug!(privilege = self.privilege, ?luid, "resolved privilege");

        let token = self
            .platform
            .open_process_token()
            .map_err(|code| self.error("process token denied adjust-privileges access", code))?;
        let guard = TokenGuard {
            platform: self.platform,
            token,
        };

        let adjustment = self.platform.adjust_token_privilege(guard.token, luid);
        if !adjustment.succeeded {
            return Err(self.error("token adjustment failed", adjustment.last_error));
        }
        // Reported success with a trailing error means the privilege was not
        // actually assigned (ERROR_NOT_ALL_ASSIGNED)
        if adjustment.last_error != 0 {
            return Err(self.error(
                "token adjustment only partially applied",
                adjustment.last_error,
            ));
        }

        info!(privilege = self.privilege, "privilege enabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::MemoryPlatform;

    #[test]
    fn test_elevate_enables_privilege() {
        let platform = MemoryPlatform::new();
        PrivilegeElevator::new(&platform).elevate().unwrap();
        assert!(platform.privilege_enabled());
        assert_eq!(platform.open_handles(), 0);
    }

    #[test]
    fn test_elevate_is_idempotent() {
        let platform = MemoryPlatform::new();
        let elevator = PrivilegeElevator::new(&platform);
        elevator.elevate().unwrap();
        elevator.elevate().unwrap();
        assert!(platform.privilege_enabled());
    }

    #[test]
    fn test_unknown_privilege_name() {
        let platform = MemoryPlatform::new().without_privilege();
        let err = PrivilegeElevator::new(&platform).elevate().unwrap_err();
        assert!(matches!(err, AcquireError::Privilege { code: 1313, .. }));
    }

    #[test]
    fn test_token_cannot_be_opened() {
        let platform = MemoryPlatform::new().with_locked_token();
        let err = PrivilegeElevator::new(&platform).elevate().unwrap_err();
        assert!(matches!(err, AcquireError::Privilege { code: 5, .. }));
    }

    #[test]
    fn test_trailing_error_is_failure() {
        // ERROR_NOT_ALL_ASSIGNED
        let platform = MemoryPlatform::new().with_trailing_adjust_error(1300);
        let err = PrivilegeElevator::new(&platform).elevate().unwrap_err();
        assert!(matches!(err, AcquireError::Privilege { code: 1300, .. }));
        assert!(!platform.privilege_enabled());
        // Token closed even on the failure path
        assert_eq!(platform.open_handles(), 0);
    }

    #[test]
    fn test_failed_adjust_closes_token() {
        let platform = MemoryPlatform::new().with_failing_adjust();
        assert!(PrivilegeElevator::new(&platform).elevate().is_err());
        assert_eq!(platform.open_handles(), 0);
    }
}
