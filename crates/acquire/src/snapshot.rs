//! Privileged hive export
//!
//! The live hive file is locked by the kernel, so it is never read through the
//! filesystem. Instead the key is opened through the registry and the save-key
//! call serializes its whole subtree into a file we own. The result is checked
//! for the container signature before anyone parses it.

use crate::error::AcquireError;
use crate::platform::{Destination, FileHandle, KeyHandle, Platform, PredefinedKey};
use crate::stream::RawHandleStream;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Signature at offset 0 of every hive container
pub const REGF_MAGIC: &[u8; 4] = b"regf";

/// Primary and secondary sequence numbers both at this value mean the hive
/// was never cleanly committed
const UNCOMMITTED_SEQUENCE: u32 = 1;

/// Which key tree to export
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceSelector {
    /// Subtree of a predefined root in the running registry
    Live {
        root: PredefinedKey,
        path: String,
        #[serde(default)]
        wow64: bool,
    },
    /// Standalone hive file loaded as an isolated application hive
    AppHive { path: PathBuf },
}

impl SourceSelector {
    /// Path shown in errors and logs
    pub fn describe(&self) -> String {
        match self {
            SourceSelector::Live { root, path, .. } => format!("{}\\{}", root.as_str(), path),
            SourceSelector::AppHive { path } => path.display().to_string(),
        }
    }
}

/// Result of header validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerInfo {
    /// Sequence numbers show an uncommitted hive; usually means the export
    /// ran inside a container or virtualized filesystem
    pub dirty: bool,
}

/// A validated export, positioned at offset 0
#[derive(Debug)]
pub struct Snapshot<S> {
    pub stream: S,
    pub dirty: bool,
}

fn fill(stream: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match stream.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Check the container signature and sequence numbers, then rewind.
///
/// A bad signature is an error; an uncommitted sequence pattern is only a
/// warning.
pub fn validate_container<S: Read + Seek>(stream: &mut S) -> Result<ContainerInfo, AcquireError> {
    let io_err = |op: &str| {
        let op = op.to_string();
        move |source: io::Error| AcquireError::Io { op, source }
    };

    stream.seek(SeekFrom::Start(0)).map_err(io_err("seek to header"))?;
    let mut header = [0u8; 12];
    let got = fill(stream, &mut header).map_err(io_err("read header"))?;

    if got < REGF_MAGIC.len() || &header[..4] != REGF_MAGIC {
        return Err(AcquireError::invalid_container());
    }

    let mut dirty = false;
    if got == header.len() {
        let primary = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        let secondary = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        dirty = primary == UNCOMMITTED_SEQUENCE && secondary == UNCOMMITTED_SEQUENCE;
    }
    if dirty {
        warn!(
            "Hive sequence numbers indicate an uncommitted hive; the export may have \
             been taken inside a container and may not be fully representative"
        );
    }

    stream.seek(SeekFrom::Start(0)).map_err(io_err("rewind"))?;
    Ok(ContainerInfo { dirty })
}

struct KeyGuard<'p, P: Platform + ?Sized> {
    platform: &'p P,
    key: KeyHandle,
}

impl<P: Platform + ?Sized> Drop for KeyGuard<'_, P> {
    fn drop(&mut self) {
        self.platform.close_key(self.key);
        debug!(key = self.key.0, "closed source key");
    }
}

/// Owns the destination until it is handed to a stream
struct FileGuard<'p, P: Platform + ?Sized> {
    platform: &'p P,
    file: Option<FileHandle>,
}

impl<P: Platform + ?Sized> FileGuard<'_, P> {
    fn handle(&self) -> FileHandle {
        self.file.unwrap_or(FileHandle(usize::MAX))
    }

    fn release(mut self) -> FileHandle {
        self.file.take().unwrap_or(FileHandle(usize::MAX))
    }
}

impl<P: Platform + ?Sized> Drop for FileGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            self.platform.close_file(file);
        }
    }
}

pub struct HiveSnapshotter<'p, P: Platform + ?Sized> {
    platform: &'p P,
    temp_dir: PathBuf,
}

impl<'p, P: Platform + ?Sized> HiveSnapshotter<'p, P> {
    /// Anonymous snapshots are created in `temp_dir`
    pub fn new(platform: &'p P, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            platform,
            temp_dir: temp_dir.into(),
        }
    }

    fn open_source(&self, selector: &SourceSelector) -> Result<KeyGuard<'p, P>, AcquireError> {
        let opened = match selector {
            SourceSelector::Live { root, path, wow64 } => {
                self.platform.open_live_key(*root, path, *wow64)
            }
            SourceSelector::AppHive { path } => {
                if !self.platform.supports_app_hives() {
                    return Err(AcquireError::UnsupportedPlatform {
                        capability: "loading application hives".to_string(),
                    });
                }
                self.platform.load_app_hive(path)
            }
        };
        let key = opened.map_err(|code| AcquireError::HiveAccess {
            path: selector.describe(),
            code,
        })?;
        Ok(KeyGuard {
            platform: self.platform,
            key,
        })
    }

    /// Export `selector` into `destination` (or an anonymous temp file),
    /// validate it and return it rewound to offset 0.
    ///
    /// Source and destination handles are closed on every error path; on
    /// success the destination is owned by the returned stream.
    pub fn snapshot(
        &self,
        selector: &SourceSelector,
        destination: Option<&Path>,
    ) -> Result<Snapshot<RawHandleStream<'p, P>>, AcquireError> {
        let destination = match destination {
            Some(path) => Destination::Persistent(path.to_path_buf()),
            None => Destination::Temporary {
                dir: self.temp_dir.clone(),
            },
        };
        let file = self
            .platform
            .create_destination(&destination)
            .map_err(|code| AcquireError::io("CreateFileW", code))?;
        let file = FileGuard {
            platform: self.platform,
            file: Some(file),
        };
        debug!(?destination, "created snapshot destination");

        let key = self.open_source(selector)?;
        let saved = self.platform.save_key(key.key, file.handle());
        drop(key);

        if let Err(status) = saved {
            return Err(AcquireError::Snapshot {
                reason: format!(
                    "NtSaveKeyEx failed for {} with status {:#x}",
                    selector.describe(),
                    status as u32
                ),
                status: Some(status),
            });
        }

        let mut stream = RawHandleStream::from_handle(self.platform, file.release())?;
        let info = validate_container(&mut stream)?;
        info!(
            source = %selector.describe(),
            bytes = stream.len(),
            dirty = info.dirty,
            "hive snapshot taken"
        );

        Ok(Snapshot {
            stream,
            dirty: info.dirty,
        })
    }
}
