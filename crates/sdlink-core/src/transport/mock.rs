//! Mock register transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{RegisterTransport, TransportError};
use crate::protocol::registers::RegisterMap;

/// In-memory register space for unit testing protocol logic.
///
/// Clones share the same memory, so one clone can be handed to a host
/// session while another backs a simulated device.
#[derive(Clone)]
pub struct MockTransport {
    /// Backing memory for the host window.
    memory: Arc<Mutex<Vec<u8>>>,
    /// Queued status values returned by reads of the status register.
    status_queue: Arc<Mutex<VecDeque<u32>>>,
    /// Captured writes as (offset, data).
    write_log: Arc<Mutex<Vec<(u64, Vec<u8>)>>>,
    /// Whether the device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_size(RegisterMap::HOST.end() as usize)
    }

    pub fn with_size(size: usize) -> Self {
        Self {
            memory: Arc::new(Mutex::new(vec![0u8; size])),
            status_queue: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue a status value for the next read of the status register.
    /// While the queue is non-empty it takes precedence over memory.
    pub fn queue_status(&self, status: u32) {
        self.status_queue.lock().unwrap().push_back(status);
    }

    pub fn queue_statuses(&self, statuses: &[u32]) {
        self.status_queue.lock().unwrap().extend(statuses);
    }

    /// Place bytes directly in memory without logging a write.
    pub fn poke(&self, offset: u64, data: &[u8]) {
        let start = offset as usize;
        self.memory.lock().unwrap()[start..start + data.len()].copy_from_slice(data);
    }

    /// Read bytes directly from memory.
    pub fn peek(&self, offset: u64, len: usize) -> Vec<u8> {
        let start = offset as usize;
        self.memory.lock().unwrap()[start..start + len].to_vec()
    }

    pub fn peek_u32(&self, offset: u64) -> u32 {
        let b = self.peek(offset, 4);
        u32::from_le_bytes([b[0], b[1], b[2], b[3]])
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<(u64, Vec<u8>)> {
        self.write_log.lock().unwrap().clone()
    }

    /// Values written to one 32-bit register, in order.
    pub fn writes_to(&self, offset: u64) -> Vec<u32> {
        self.get_writes()
            .into_iter()
            .filter(|(o, d)| *o == offset && d.len() == 4)
            .map(|(_, d)| u32::from_le_bytes([d[0], d[1], d[2], d[3]]))
            .collect()
    }

    /// Simulate device removal.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }

    fn check(&self, offset: u64, len: usize) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::DeviceNotFound {
                path: "mock".into(),
            });
        }
        let size = self.memory.lock().unwrap().len() as u64;
        match offset.checked_add(len as u64) {
            Some(end) if end <= size => {}
            _ => return Err(TransportError::OutOfRange { offset, len, size }),
        }
        Ok(offset as usize)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterTransport for MockTransport {
    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, TransportError> {
        let start = self.check(offset, len)?;
        if offset == RegisterMap::HOST.status
            && len == 4
            && let Some(status) = self.status_queue.lock().unwrap().pop_front()
        {
            return Ok(status.to_le_bytes().to_vec());
        }
        Ok(self.memory.lock().unwrap()[start..start + len].to_vec())
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<usize, TransportError> {
        let start = self.check(offset, data.len())?;
        self.memory.lock().unwrap()[start..start + data.len()].copy_from_slice(data);
        self.write_log.lock().unwrap().push((offset, data.to_vec()));
        Ok(data.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_status_queue() {
        let mock = MockTransport::new();
        mock.queue_statuses(&[1, 2]);
        mock.poke(RegisterMap::HOST.status, &0u32.to_le_bytes());

        assert_eq!(mock.read_u32(RegisterMap::HOST.status).unwrap(), 1);
        assert_eq!(mock.read_u32(RegisterMap::HOST.status).unwrap(), 2);

        // Queue is empty now, falls back to memory
        assert_eq!(mock.read_u32(RegisterMap::HOST.status).unwrap(), 0);
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        mock.write_u32(RegisterMap::HOST.command, 3).unwrap();
        mock.write_u32(RegisterMap::HOST.command, 0).unwrap();
        mock.write(RegisterMap::HOST.mosi, b"data").unwrap();

        assert_eq!(mock.get_writes().len(), 3);
        assert_eq!(mock.writes_to(RegisterMap::HOST.command), vec![3, 0]);
        assert_eq!(mock.peek(RegisterMap::HOST.mosi, 4), b"data");
    }

    #[test]
    fn test_mock_out_of_range() {
        let mock = MockTransport::with_size(16);
        assert!(matches!(
            mock.read(12, 8),
            Err(TransportError::OutOfRange { size: 16, .. })
        ));
        assert!(matches!(
            mock.read(u64::MAX - 1, 8),
            Err(TransportError::OutOfRange { .. })
        ));
        assert!(matches!(
            mock.write(u64::MAX, b"data"),
            Err(TransportError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        mock.disconnect();
        assert!(mock.write(0, b"test").is_err());
        mock.reconnect();
        assert!(mock.write(0, b"test").is_ok());
    }
}
