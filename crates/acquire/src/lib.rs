//! Point-in-time acquisition of OS-locked registry hives
//!
//! The live hive file cannot be opened with ordinary file I/O. With the
//! backup privilege enabled the registry can serialize the key tree into a
//! file we own; that export is validated and handed out as a seekable stream.
//! Every native call goes through [`platform::Platform`].

pub mod config;
pub mod error;
pub mod offline;
pub mod orchestrator;
pub mod platform;
pub mod privilege;
pub mod retry;
pub mod snapshot;
pub mod stream;

pub use config::{AcquireConfig, DEFAULT_LIVE_HIVE};
pub use error::AcquireError;
pub use offline::open_exported_hive;
pub use orchestrator::{Acquisition, AcquisitionOrchestrator, HiveSource, HiveStream};
pub use platform::{host_platform, Platform, PredefinedKey};
pub use privilege::PrivilegeElevator;
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper};
pub use snapshot::{validate_container, ContainerInfo, HiveSnapshotter, Snapshot, SourceSelector};
pub use stream::RawHandleStream;
