//! Acquisition entry point: elevate once, then snapshot with bounded retries.

use crate::error::AcquireError;
use crate::offline::open_exported_hive;
use crate::platform::Platform;
use crate::privilege::PrivilegeElevator;
use crate::retry::{retry_fixed, RetryError, RetryPolicy, Sleeper, ThreadSleeper};
use crate::snapshot::{HiveSnapshotter, Snapshot, SourceSelector};
use crate::stream::RawHandleStream;
use std::cell::Cell;
use std::fmt;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

static THREAD_SLEEPER: ThreadSleeper = ThreadSleeper;

/// Byte source handed to the decoder
pub trait HiveStream: Read + Seek + fmt::Debug {}

impl<T: Read + Seek + fmt::Debug> HiveStream for T {}

/// Where the hive bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HiveSource {
    /// Privileged export of a live or standalone hive
    Snapshot {
        selector: SourceSelector,
        /// Keep the export at this path instead of a self-deleting temp file
        destination: Option<PathBuf>,
    },
    /// Hive file exported earlier; read directly
    Exported { path: PathBuf },
}

impl HiveSource {
    pub fn describe(&self) -> String {
        match self {
            HiveSource::Snapshot { selector, .. } => selector.describe(),
            HiveSource::Exported { path } => path.display().to_string(),
        }
    }
}

/// An acquired, validated hive positioned at offset 0
pub struct Acquisition<'p> {
    pub stream: Box<dyn HiveStream + 'p>,
    pub dirty: bool,
    pub source: String,
}

impl fmt::Debug for Acquisition<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Acquisition")
            .field("dirty", &self.dirty)
            .field("source", &self.source)
            .finish()
    }
}

pub struct AcquisitionOrchestrator<'p, P: Platform + ?Sized> {
    platform: &'p P,
    snapshotter: HiveSnapshotter<'p, P>,
    policy: RetryPolicy,
    sleeper: &'p dyn Sleeper,
    elevated: Cell<bool>,
}

impl<'p, P: Platform + ?Sized> AcquisitionOrchestrator<'p, P> {
    pub fn new(platform: &'p P, temp_dir: impl Into<PathBuf>, policy: RetryPolicy) -> Self {
        Self {
            platform,
            snapshotter: HiveSnapshotter::new(platform, temp_dir),
            policy,
            sleeper: &THREAD_SLEEPER,
            elevated: Cell::new(false),
        }
    }

    pub fn with_sleeper(mut self, sleeper: &'p dyn Sleeper) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn ensure_elevated(&self) -> Result<(), AcquireError> {
        if !self.elevated.get() {
            PrivilegeElevator::new(self.platform).elevate()?;
            self.elevated.set(true);
        }
        Ok(())
    }

    /// Snapshot `selector`, retrying contention-type failures.
    ///
    /// Privilege and platform errors propagate on first sight. Once every
    /// attempt has failed the last error is wrapped in `ExhaustedRetries`.
    pub fn acquire_with_retry(
        &self,
        selector: &SourceSelector,
        destination: Option<&Path>,
    ) -> Result<Snapshot<RawHandleStream<'p, P>>, AcquireError> {
        if !self.platform.supports_live_acquisition() {
            return Err(AcquireError::UnsupportedPlatform {
                capability: "live hive acquisition".to_string(),
            });
        }
        self.ensure_elevated()?;

        let max_attempts = self.policy.max_attempts.max(1);
        let outcome = retry_fixed(
            self.policy,
            self.sleeper,
            AcquireError::is_transient,
            |attempt| {
                self.snapshotter
                    .snapshot(selector, destination)
                    .map_err(|err| {
                        warn!(
                            attempt,
                            max_attempts,
                            source = %selector.describe(),
                            error = %err,
                            "snapshot attempt failed"
                        );
                        err
                    })
            },
        );

        match outcome {
            Ok(snapshot) => Ok(snapshot),
            Err(RetryError::Fatal(err)) => Err(err),
            Err(RetryError::Exhausted { attempts, last }) => Err(AcquireError::ExhaustedRetries {
                attempts,
                last: Box::new(last),
            }),
        }
    }

    /// Acquire from any [`HiveSource`]
    pub fn acquire(&self, source: &HiveSource) -> Result<Acquisition<'p>, AcquireError> {
        let acquisition = match source {
            HiveSource::Snapshot {
                selector,
                destination,
            } => {
                let snapshot = self.acquire_with_retry(selector, destination.as_deref())?;
                Acquisition {
                    stream: Box::new(snapshot.stream),
                    dirty: snapshot.dirty,
                    source: source.describe(),
                }
            }
            HiveSource::Exported { path } => {
                let snapshot = open_exported_hive(path)?;
                Acquisition {
                    stream: Box::new(snapshot.stream),
                    dirty: snapshot.dirty,
                    source: source.describe(),
                }
            }
        };
        info!(source = %acquisition.source, dirty = acquisition.dirty, "hive acquired");
        Ok(acquisition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::{container_bytes, MemoryPlatform};
    use crate::platform::unsupported::UnsupportedPlatform;
    use crate::retry::RecordingSleeper;
    use std::time::Duration;

    const AMCACHE: &str = r"C:\Windows\AppCompat\Programs\Amcache.hve";

    fn selector() -> SourceSelector {
        SourceSelector::AppHive {
            path: PathBuf::from(AMCACHE),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(1000),
        }
    }

    #[test]
    fn test_recovers_from_transient_open_failure() {
        let platform = MemoryPlatform::new()
            .with_app_hive(AMCACHE, container_bytes(false, 64))
            .fail_opens(2);
        let sleeper = RecordingSleeper::new();
        let orchestrator =
            AcquisitionOrchestrator::new(&platform, ".", policy()).with_sleeper(&sleeper);

        let snapshot = orchestrator.acquire_with_retry(&selector(), None).unwrap();
        assert!(!snapshot.dirty);
        assert_eq!(sleeper.delays(), vec![Duration::from_millis(1000); 2]);
        assert!(platform.privilege_enabled());
    }

    #[test]
    fn test_exhausted_after_max_attempts() {
        let platform = MemoryPlatform::new()
            .with_app_hive(AMCACHE, container_bytes(false, 64))
            .fail_saves(10);
        let sleeper = RecordingSleeper::new();
        let orchestrator =
            AcquisitionOrchestrator::new(&platform, ".", policy()).with_sleeper(&sleeper);

        let err = orchestrator.acquire_with_retry(&selector(), None).unwrap_err();
        match &err {
            AcquireError::ExhaustedRetries { attempts, last } => {
                assert_eq!(*attempts, 3);
                assert!(matches!(**last, AcquireError::Snapshot { .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(platform.save_attempts(), 3);
        assert_eq!(platform.open_handles(), 0);
    }

    #[test]
    fn test_privilege_failure_not_retried() {
        let platform = MemoryPlatform::new()
            .with_app_hive(AMCACHE, container_bytes(false, 64))
            .with_trailing_adjust_error(1300);
        let sleeper = RecordingSleeper::new();
        let orchestrator =
            AcquisitionOrchestrator::new(&platform, ".", policy()).with_sleeper(&sleeper);

        let err = orchestrator.acquire_with_retry(&selector(), None).unwrap_err();
        assert!(matches!(err, AcquireError::Privilege { code: 1300, .. }));
        assert_eq!(platform.save_attempts(), 0);
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_missing_app_hive_support_not_retried() {
        let platform = MemoryPlatform::new().without_app_hive_support();
        let sleeper = RecordingSleeper::new();
        let orchestrator =
            AcquisitionOrchestrator::new(&platform, ".", policy()).with_sleeper(&sleeper);

        let err = orchestrator.acquire_with_retry(&selector(), None).unwrap_err();
        assert!(matches!(err, AcquireError::UnsupportedPlatform { .. }));
        assert!(sleeper.delays().is_empty());
    }

    #[test]
    fn test_unsupported_host() {
        let platform = UnsupportedPlatform;
        let orchestrator = AcquisitionOrchestrator::new(&platform, ".", policy());
        let err = orchestrator.acquire_with_retry(&selector(), None).unwrap_err();
        assert!(matches!(err, AcquireError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn test_elevates_only_once() {
        let platform = MemoryPlatform::new().with_app_hive(AMCACHE, container_bytes(false, 64));
        let sleeper = RecordingSleeper::new();
        let orchestrator =
            AcquisitionOrchestrator::new(&platform, ".", policy()).with_sleeper(&sleeper);
        orchestrator.acquire_with_retry(&selector(), None).unwrap();
        assert!(orchestrator.elevated.get());
        orchestrator.acquire_with_retry(&selector(), None).unwrap();
    }

    #[test]
    fn test_acquire_exported_without_elevation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Amcache.hve");
        std::fs::write(&path, container_bytes(false, 64)).unwrap();

        // Exported input works even where nothing live does
        let platform = UnsupportedPlatform;
        let orchestrator = AcquisitionOrchestrator::new(&platform, ".", policy());
        let mut acquisition = orchestrator
            .acquire(&HiveSource::Exported { path: path.clone() })
            .unwrap();
        let mut bytes = Vec::new();
        acquisition.stream.read_to_end(&mut bytes).unwrap();
        assert_eq!(bytes.len(), 64);
        assert_eq!(acquisition.source, path.display().to_string());
    }
}
