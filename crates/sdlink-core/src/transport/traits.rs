//! Register transport abstraction.
//!
//! Defines the `RegisterTransport` trait for byte-addressed access to the
//! device, allowing different implementations (block device, mock, etc.).

use byteorder::{ByteOrder, LittleEndian};
use std::path::PathBuf;
use thiserror::Error;

use crate::protocol::registers::{RegisterError, WORD_SIZE};

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: {path}")]
    DeviceNotFound { path: PathBuf },

    #[error("Permission denied opening {path}; try running with root privileges")]
    PermissionDenied { path: PathBuf },

    #[error("Failed to open {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Seek to offset 0x{offset:X} failed: {source}")]
    SeekFailed {
        offset: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Short read at 0x{offset:X}: expected {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Short write at 0x{offset:X}: expected {expected} bytes, wrote {actual}")]
    ShortWrite {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Access 0x{offset:X}+{len} is outside the {size}-byte register space")]
    OutOfRange { offset: u64, len: usize, size: u64 },

    #[error(transparent)]
    Register(#[from] RegisterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract byte-range access to the device.
///
/// Every call is a complete transaction: once it returns `Ok`, the transfer
/// has reached the device and nothing is buffered for a later call.
///
/// This trait enables:
/// - Production implementation on a block device node
/// - Mock implementation for unit testing
pub trait RegisterTransport: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Write all of `data` at `offset`. Returns the committed length.
    fn write(&self, offset: u64, data: &[u8]) -> Result<usize, TransportError>;

    /// Read a little-endian 32-bit register.
    fn read_u32(&self, offset: u64) -> Result<u32, TransportError> {
        let bytes = self.read(offset, WORD_SIZE)?;
        if bytes.len() != WORD_SIZE {
            return Err(TransportError::ShortRead {
                offset,
                expected: WORD_SIZE,
                actual: bytes.len(),
            });
        }
        Ok(LittleEndian::read_u32(&bytes))
    }

    /// Write a little-endian 32-bit register.
    fn write_u32(&self, offset: u64, value: u32) -> Result<(), TransportError> {
        self.write(offset, &value.to_le_bytes())?;
        Ok(())
    }
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for &T {
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(offset, len)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<usize, TransportError> {
        (**self).write(offset, data)
    }
}

impl<T: RegisterTransport + ?Sized> RegisterTransport for std::sync::Arc<T> {
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, TransportError> {
        (**self).read(offset, len)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<usize, TransportError> {
        (**self).write(offset, data)
    }
}
