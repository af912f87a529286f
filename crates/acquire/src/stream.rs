//! Seekable byte stream over a raw platform file handle.
//!
//! The snapshot destination is opened with share/delete-on-close flags that a
//! std `File` cannot be built from portably, so reads and seeks go straight
//! through the platform. The total size is measured once at construction so
//! "read the rest" needs no bookkeeping from callers.

use crate::error::AcquireError;
use crate::platform::{FileHandle, Platform, SeekOrigin};
use std::io;

/// Largest single ReadFile request
const READ_CHUNK: usize = 64 * 1024;

pub struct RawHandleStream<'p, P: Platform + ?Sized> {
    platform: &'p P,
    /// None once closed
    handle: Option<FileHandle>,
    end: u64,
}

impl<'p, P: Platform + ?Sized> RawHandleStream<'p, P> {
    /// Take ownership of `handle` and measure its size.
    ///
    /// The file position is restored afterwards. On error the handle has
    /// already been closed.
    pub fn from_handle(platform: &'p P, handle: FileHandle) -> Result<Self, AcquireError> {
        let mut stream = Self {
            platform,
            handle: Some(handle),
            end: 0,
        };
        let origin = stream.tell()?;
        stream.end = stream.seek_to(0, SeekOrigin::End)?;
        stream.seek_to(origin as i64, SeekOrigin::Start)?;
        Ok(stream)
    }

    fn handle(&self) -> FileHandle {
        // close() consumes self, so a live stream always has its handle
        self.handle.unwrap_or(FileHandle(usize::MAX))
    }

    /// Move the file pointer and return the new absolute position
    pub fn seek_to(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64, AcquireError> {
        self.platform
            .seek(self.handle(), offset, origin)
            .map_err(|code| AcquireError::io("SetFilePointerEx", code))
    }

    pub fn tell(&mut self) -> Result<u64, AcquireError> {
        self.seek_to(0, SeekOrigin::Current)
    }

    /// Size measured at construction
    pub fn len(&self) -> u64 {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    /// Read up to `n` bytes, or through the measured end when `n` is `None`.
    ///
    /// Returns fewer than `n` bytes only at end of stream, and an empty
    /// vector when already there.
    pub fn read_up_to(&mut self, n: Option<usize>) -> Result<Vec<u8>, AcquireError> {
        let pos = self.tell()?;
        let remaining = usize::try_from(self.end.saturating_sub(pos)).unwrap_or(usize::MAX);
        let want = n.unwrap_or(remaining);
        if want == 0 {
            return Ok(Vec::new());
        }

        // Sized by what is left, not by the request; a short file never
        // costs a huge allocation
        let mut buf = Vec::with_capacity(want.min(remaining));
        let mut chunk = vec![0u8; READ_CHUNK.min(want)];
        while buf.len() < want {
            let take = chunk.len().min(want - buf.len());
            let got = self
                .platform
                .read(self.handle(), &mut chunk[..take])
                .map_err(|code| AcquireError::io("ReadFile", code))?;
            if got == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..got]);
        }
        Ok(buf)
    }

    /// Release the handle. Consuming `self` rules out a second close.
    pub fn close(mut self) {
        if let Some(handle) = self.handle.take() {
            self.platform.close_file(handle);
        }
    }
}

impl<P: Platform + ?Sized> Drop for RawHandleStream<'_, P> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.platform.close_file(handle);
        }
    }
}

impl<P: Platform + ?Sized> std::fmt::Debug for RawHandleStream<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawHandleStream")
            .field("handle", &self.handle)
            .field("end", &self.end)
            .finish()
    }
}

impl<P: Platform + ?Sized> io::Read for RawHandleStream<'_, P> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.platform
            .read(self.handle(), buf)
            .map_err(|code| io::Error::from_raw_os_error(code as i32))
    }
}

impl<P: Platform + ?Sized> io::Seek for RawHandleStream<'_, P> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let (offset, origin) = match pos {
            io::SeekFrom::Start(offset) => (offset as i64, SeekOrigin::Start),
            io::SeekFrom::Current(offset) => (offset, SeekOrigin::Current),
            io::SeekFrom::End(offset) => (offset, SeekOrigin::End),
        };
        self.platform
            .seek(self.handle(), offset, origin)
            .map_err(|code| io::Error::from_raw_os_error(code as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::memory::{container_bytes, MemoryPlatform};
    use crate::platform::{Destination, PredefinedKey};
    use std::io::{Read, Seek, SeekFrom};
    use std::path::PathBuf;

    /// Platform holding `bytes` under a single live key
    fn fixture(bytes: Vec<u8>) -> MemoryPlatform {
        MemoryPlatform::new().with_live_key(PredefinedKey::LocalMachine, "fixture", bytes)
    }

    /// Save the fixture key into a fresh file and wrap it
    fn stream_over(platform: &MemoryPlatform) -> RawHandleStream<'_, MemoryPlatform> {
        let key = platform
            .open_live_key(PredefinedKey::LocalMachine, "fixture", false)
            .unwrap();
        let file = platform
            .create_destination(&Destination::Temporary {
                dir: PathBuf::from("."),
            })
            .unwrap();
        platform.save_key(key, file).unwrap();
        platform.close_key(key);
        RawHandleStream::from_handle(platform, file).unwrap()
    }

    #[test]
    fn test_size_check_restores_position() {
        let bytes = container_bytes(false, 100);
        let platform = fixture(bytes.clone());
        let mut stream = stream_over(&platform);
        // save_key leaves the pointer at the end; measuring must not move it
        assert_eq!(stream.len(), 100);
        assert_eq!(stream.tell().unwrap(), 100);
    }

    #[test]
    fn test_read_rest_and_eof() {
        let bytes = container_bytes(false, 100);
        let platform = fixture(bytes.clone());
        let mut stream = stream_over(&platform);
        stream.seek_to(0, SeekOrigin::Start).unwrap();

        assert_eq!(stream.read_up_to(Some(4)).unwrap(), b"regf");
        let rest = stream.read_up_to(None).unwrap();
        assert_eq!(rest.len(), 96);
        assert_eq!(rest, bytes[4..]);
        assert!(stream.read_up_to(None).unwrap().is_empty());
        assert!(stream.read_up_to(Some(10)).unwrap().is_empty());
    }

    #[test]
    fn test_short_read_only_at_eof() {
        let bytes = container_bytes(false, 10);
        let platform = fixture(bytes.clone());
        let mut stream = stream_over(&platform);
        stream.seek_to(-3, SeekOrigin::End).unwrap();
        assert_eq!(stream.read_up_to(Some(8)).unwrap().len(), 3);
    }

    #[test]
    fn test_oversized_request_returns_rest() {
        let bytes = container_bytes(false, 16);
        let platform = fixture(bytes.clone());
        let mut stream = stream_over(&platform);
        stream.seek_to(0, SeekOrigin::Start).unwrap();
        assert_eq!(stream.read_up_to(Some(usize::MAX)).unwrap(), bytes);
        assert!(stream.read_up_to(Some(usize::MAX)).unwrap().is_empty());
    }

    #[test]
    fn test_read_spanning_several_chunks() {
        let bytes = container_bytes(false, READ_CHUNK * 2 + 17);
        let platform = fixture(bytes.clone());
        let mut stream = stream_over(&platform);
        stream.seek_to(0, SeekOrigin::Start).unwrap();
        assert_eq!(stream.read_up_to(Some(READ_CHUNK + 1)).unwrap(), bytes[..READ_CHUNK + 1]);
        assert_eq!(stream.read_up_to(None).unwrap(), bytes[READ_CHUNK + 1..]);
    }

    #[test]
    fn test_invalid_seek_is_io_error() {
        let bytes = container_bytes(false, 10);
        let platform = fixture(bytes.clone());
        let mut stream = stream_over(&platform);
        let err = stream.seek_to(-1, SeekOrigin::Start).unwrap_err();
        assert!(matches!(err, AcquireError::Io { .. }));
        assert_eq!(err.native_code(), Some(131));
    }

    #[test]
    fn test_failed_read_carries_code() {
        let bytes = container_bytes(false, 10);
        let platform = fixture(bytes.clone());
        let mut stream = stream_over(&platform);
        platform.set_read_failure(Some(23));
        let err = stream.read_up_to(Some(4)).unwrap_err();
        assert_eq!(err.native_code(), Some(23));
    }

    #[test]
    fn test_std_io_traits() {
        let bytes = container_bytes(false, 32);
        let platform = fixture(bytes.clone());
        let mut stream = stream_over(&platform);
        stream.seek(SeekFrom::Start(0)).unwrap();
        let mut all = Vec::new();
        stream.read_to_end(&mut all).unwrap();
        assert_eq!(all, bytes);
    }

    #[test]
    fn test_close_and_drop_release_handle() {
        let bytes = container_bytes(false, 16);
        let platform = fixture(bytes.clone());
        let stream = stream_over(&platform);
        assert_eq!(platform.open_handles(), 1);
        stream.close();
        assert_eq!(platform.open_handles(), 0);

        {
            let _stream = stream_over(&platform);
            assert_eq!(platform.open_handles(), 1);
        }
        assert_eq!(platform.open_handles(), 0);
    }
}
