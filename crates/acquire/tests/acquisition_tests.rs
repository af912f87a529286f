//! Acquisition pipeline tests against the in-memory platform
//!
//! Cover the paths an operator actually hits: live Amcache export, retries
//! under contention, structural failures and handle hygiene.

use amc_acquire::platform::memory::{container_bytes, MemoryPlatform};
use amc_acquire::retry::RecordingSleeper;
use amc_acquire::{
    AcquireError, AcquisitionOrchestrator, HiveSource, PredefinedKey, RetryPolicy, SourceSelector,
    DEFAULT_LIVE_HIVE,
};
use amc_core::ErrorCode;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::time::Duration;

fn amcache() -> SourceSelector {
    SourceSelector::AppHive {
        path: PathBuf::from(DEFAULT_LIVE_HIVE),
    }
}

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::from_millis(1000),
    }
}

#[test]
fn test_live_amcache_snapshot_is_readable_from_offset_zero() {
    let bytes = container_bytes(false, 4096);
    let platform = MemoryPlatform::new().with_app_hive(DEFAULT_LIVE_HIVE, bytes.clone());
    let sleeper = RecordingSleeper::new();
    let orchestrator =
        AcquisitionOrchestrator::new(&platform, ".", policy(3)).with_sleeper(&sleeper);

    let mut acquisition = orchestrator
        .acquire(&HiveSource::Snapshot {
            selector: amcache(),
            destination: None,
        })
        .unwrap();

    assert_eq!(acquisition.stream.stream_position().unwrap(), 0);
    let mut read = Vec::new();
    acquisition.stream.read_to_end(&mut read).unwrap();
    assert_eq!(read, bytes);
    assert!(!acquisition.dirty);
    assert!(platform.privilege_enabled());

    drop(acquisition);
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn test_bad_magic_fails_every_attempt() {
    let mut bytes = container_bytes(false, 64);
    bytes[..4].copy_from_slice(b"hbin");
    let platform = MemoryPlatform::new().with_app_hive(DEFAULT_LIVE_HIVE, bytes);
    let sleeper = RecordingSleeper::new();
    let orchestrator =
        AcquisitionOrchestrator::new(&platform, ".", policy(3)).with_sleeper(&sleeper);

    let err = orchestrator.acquire_with_retry(&amcache(), None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ExhaustedRetries);
    match err {
        AcquireError::ExhaustedRetries { attempts, last } => {
            assert_eq!(attempts, 3);
            assert_eq!(last.to_string(), "Snapshot failed: invalid container");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(platform.save_attempts(), 3);
    assert_eq!(sleeper.delays().len(), 2);
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn test_contention_then_success() {
    let platform = MemoryPlatform::new()
        .with_app_hive(DEFAULT_LIVE_HIVE, container_bytes(true, 128))
        .fail_opens(1)
        .fail_saves(1);
    let sleeper = RecordingSleeper::new();
    let orchestrator =
        AcquisitionOrchestrator::new(&platform, ".", policy(3)).with_sleeper(&sleeper);

    let snapshot = orchestrator.acquire_with_retry(&amcache(), None).unwrap();
    // Dirty pattern warns but does not block
    assert!(snapshot.dirty);
    assert_eq!(sleeper.delays(), vec![Duration::from_millis(1000); 2]);
    drop(snapshot);
    assert_eq!(platform.open_handles(), 0);
}

#[test]
fn test_single_attempt_policy() {
    let platform = MemoryPlatform::new()
        .with_app_hive(DEFAULT_LIVE_HIVE, container_bytes(false, 64))
        .fail_opens(1);
    let sleeper = RecordingSleeper::new();
    let orchestrator =
        AcquisitionOrchestrator::new(&platform, ".", policy(1)).with_sleeper(&sleeper);

    let err = orchestrator.acquire_with_retry(&amcache(), None).unwrap_err();
    match err {
        AcquireError::ExhaustedRetries { attempts, last } => {
            assert_eq!(attempts, 1);
            assert!(matches!(*last, AcquireError::HiveAccess { code: 32, .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(sleeper.delays().is_empty());
}

#[test]
fn test_privilege_denied_is_structural() {
    let platform = MemoryPlatform::new()
        .with_app_hive(DEFAULT_LIVE_HIVE, container_bytes(false, 64))
        .with_locked_token();
    let sleeper = RecordingSleeper::new();
    let orchestrator =
        AcquisitionOrchestrator::new(&platform, ".", policy(3)).with_sleeper(&sleeper);

    let err = orchestrator.acquire_with_retry(&amcache(), None).unwrap_err();
    assert_eq!(err.code(), ErrorCode::Privilege);
    assert_eq!(err.report().native_code, Some(5));
    assert_eq!(platform.save_attempts(), 0);
    assert!(sleeper.delays().is_empty());
}

#[test]
fn test_live_subtree_through_64bit_view() {
    let platform = MemoryPlatform::new().with_live_key(
        PredefinedKey::LocalMachine,
        r"SOFTWARE\Microsoft",
        container_bytes(false, 256),
    );
    let sleeper = RecordingSleeper::new();
    let orchestrator =
        AcquisitionOrchestrator::new(&platform, ".", policy(3)).with_sleeper(&sleeper);
    let selector = SourceSelector::Live {
        root: PredefinedKey::LocalMachine,
        path: r"software\microsoft".to_string(),
        wow64: true,
    };

    let mut snapshot = orchestrator.acquire_with_retry(&selector, None).unwrap();
    assert_eq!(platform.wow64_requests(), 1);
    assert_eq!(snapshot.stream.len(), 256);
    snapshot.stream.seek(SeekFrom::End(-4)).unwrap();
    assert_eq!(snapshot.stream.read_up_to(None).unwrap().len(), 4);
}

#[test]
fn test_persistent_copy_written() {
    let bytes = container_bytes(false, 300);
    let platform = MemoryPlatform::new().with_app_hive(DEFAULT_LIVE_HIVE, bytes.clone());
    let sleeper = RecordingSleeper::new();
    let orchestrator =
        AcquisitionOrchestrator::new(&platform, ".", policy(3)).with_sleeper(&sleeper);
    let out = PathBuf::from(r"D:\evidence\Amcache.hve");

    let acquisition = orchestrator
        .acquire(&HiveSource::Snapshot {
            selector: amcache(),
            destination: Some(out.clone()),
        })
        .unwrap();
    drop(acquisition);

    assert_eq!(platform.persisted(&out).unwrap(), bytes);
}

#[test]
fn test_exported_file_skips_privilege() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Amcache.hve");
    std::fs::write(&path, container_bytes(false, 96)).unwrap();

    let platform = MemoryPlatform::new().with_locked_token();
    let orchestrator = AcquisitionOrchestrator::new(&platform, ".", policy(3));
    let acquisition = orchestrator
        .acquire(&HiveSource::Exported { path })
        .unwrap();
    assert!(!acquisition.dirty);
    assert!(!platform.privilege_enabled());
}
