//! Hive files that were exported beforehand (disk image, earlier snapshot).
//! Plain file I/O, same container checks as a live snapshot.

use crate::error::AcquireError;
use crate::snapshot::{validate_container, Snapshot};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

pub fn open_exported_hive(path: &Path) -> Result<Snapshot<BufReader<File>>, AcquireError> {
    let file = File::open(path).map_err(|source| AcquireError::Io {
        op: format!("open {}", path.display()),
        source,
    })?;
    let mut stream = BufReader::new(file);
    let container = validate_container(&mut stream)?;
    info!(path = %path.display(), dirty = container.dirty, "opened exported hive");

    Ok(Snapshot {
        stream,
        dirty: container.dirty,
    })
}
