//! Block device transport.
//!
//! Each call opens the device node, seeks, transfers and closes it again.
//! Reopening per transfer is what forces the kernel to push every register
//! update to the card instead of holding it in the page cache.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use super::traits::{RegisterTransport, TransportError};

/// Transport over a block device node (or any seekable file).
#[derive(Debug, Clone)]
pub struct BlockDeviceTransport {
    path: PathBuf,
}

impl BlockDeviceTransport {
    /// Create a transport for `path`. The device is not touched until the
    /// first transfer.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self, write: bool) -> Result<File, TransportError> {
        let mut options = OpenOptions::new();
        if write {
            options.write(true);
        } else {
            options.read(true);
        }
        options.open(&self.path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => TransportError::DeviceNotFound {
                path: self.path.clone(),
            },
            ErrorKind::PermissionDenied => TransportError::PermissionDenied {
                path: self.path.clone(),
            },
            _ => TransportError::OpenFailed {
                path: self.path.clone(),
                source: e,
            },
        })
    }

    fn seek(file: &mut File, offset: u64) -> Result<(), TransportError> {
        file.seek(SeekFrom::Start(offset))
            .map_err(|source| TransportError::SeekFailed { offset, source })?;
        Ok(())
    }
}

impl RegisterTransport for BlockDeviceTransport {
    #[instrument(level = "trace", skip(self), fields(offset = format!("0x{:X}", offset)))]
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut file = self.open(false)?;
        Self::seek(&mut file, offset)?;

        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            match file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled != len {
            return Err(TransportError::ShortRead {
                offset,
                expected: len,
                actual: filled,
            });
        }

        debug!(bytes_read = filled, "Read complete");
        Ok(buf)
    }

    #[instrument(level = "trace", skip(self, data), fields(offset = format!("0x{:X}", offset), len = data.len()))]
    fn write(&self, offset: u64, data: &[u8]) -> Result<usize, TransportError> {
        let mut file = self.open(true)?;
        Self::seek(&mut file, offset)?;

        let mut written = 0;
        while written < data.len() {
            match file.write(&data[written..]) {
                Ok(0) => break,
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if written != data.len() {
            return Err(TransportError::ShortWrite {
                offset,
                expected: data.len(),
                actual: written,
            });
        }

        file.sync_data()?;
        debug!(bytes_written = written, "Write complete");
        Ok(written)
    }
}
