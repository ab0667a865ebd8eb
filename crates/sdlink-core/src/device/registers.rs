//! Device-side register access.

use crate::protocol::registers::{RegisterError, RegisterMap};
use crate::transport::{RegisterTransport, TransportError};

/// Word access to the register space as seen by the firmware.
///
/// Implementations must reject any address that is not a word inside the
/// register map; `DeviceBuffers` reports bad buffer indices through the same
/// error type.
pub trait DeviceRegisters {
    type Error: From<RegisterError>;

    fn read_u32(&mut self, addr: u64) -> Result<u32, Self::Error>;

    fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), Self::Error>;
}

impl<R: DeviceRegisters + ?Sized> DeviceRegisters for &mut R {
    type Error = R::Error;

    fn read_u32(&mut self, addr: u64) -> Result<u32, Self::Error> {
        (**self).read_u32(addr)
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), Self::Error> {
        (**self).write_u32(addr, value)
    }
}

/// Raw memory-mapped registers, for firmware running on the SoC itself.
///
/// Every access is checked against the map before it is dereferenced, so
/// only words inside the map's regions are ever touched.
#[derive(Debug)]
pub struct VolatileRegisters {
    map: RegisterMap,
}

impl VolatileRegisters {
    /// # Safety
    ///
    /// Every region of `map` must be mapped, readable and writable memory,
    /// word aligned and owned by this program for the lifetime of the value.
    pub unsafe fn new(map: RegisterMap) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    fn pointer(&self, addr: u64) -> Result<*mut u32, RegisterError> {
        self.map.check_word(addr)?;
        Ok(addr as usize as *mut u32)
    }
}

impl DeviceRegisters for VolatileRegisters {
    type Error = RegisterError;

    fn read_u32(&mut self, addr: u64) -> Result<u32, RegisterError> {
        let ptr = self.pointer(addr)?;
        // SAFETY: `ptr` is an aligned word inside the map, which the caller
        // of `new` guarantees is valid memory.
        Ok(unsafe { core::ptr::read_volatile(ptr) })
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), RegisterError> {
        let ptr = self.pointer(addr)?;
        // SAFETY: as in `read_u32`.
        unsafe { core::ptr::write_volatile(ptr, value) };
        Ok(())
    }
}

/// Device view of a host transport.
///
/// Translates device addresses to host offsets so the device loop can run
/// against the same space a host session talks to: an in-memory mock in
/// tests, or an image file in the simulator.
pub struct HostWindow<T: RegisterTransport> {
    transport: T,
}

impl<T: RegisterTransport> HostWindow<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn into_inner(self) -> T {
        self.transport
    }

    fn host_offset(addr: u64) -> Result<u64, RegisterError> {
        let (region, offset) = RegisterMap::DEVICE.check_word(addr)?;
        Ok(RegisterMap::HOST.base(region) + offset)
    }
}

impl<T: RegisterTransport> DeviceRegisters for HostWindow<T> {
    type Error = TransportError;

    fn read_u32(&mut self, addr: u64) -> Result<u32, TransportError> {
        self.transport.read_u32(Self::host_offset(addr)?)
    }

    fn write_u32(&mut self, addr: u64, value: u32) -> Result<(), TransportError> {
        self.transport.write_u32(Self::host_offset(addr)?, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceLoop, DevicePhase};
    use crate::payload::ArithmeticHandler;
    use crate::protocol::registers::{MISO_BUFFER_WORDS, MOSI_BUFFER_WORDS};
    use crate::protocol::{Region, SocStatus};
    use crate::transport::MockTransport;

    #[test]
    fn test_host_window_translates() {
        let mock = MockTransport::new();
        let mut window = HostWindow::new(mock.clone());

        window.write_u32(RegisterMap::DEVICE.status, 2).unwrap();
        assert_eq!(mock.peek_u32(RegisterMap::HOST.status), 2);

        mock.poke(RegisterMap::HOST.mosi + 4, &7u32.to_le_bytes());
        assert_eq!(
            window
                .read_u32(RegisterMap::DEVICE.word(Region::Mosi, 1))
                .unwrap(),
            7
        );
    }

    #[test]
    fn test_host_window_unmapped() {
        let mut window = HostWindow::new(MockTransport::new());
        assert!(window.read_u32(0x1234).is_err());
    }

    #[test]
    fn test_host_window_rejects_straddling_access() {
        let mock = MockTransport::new();
        let mut window = HostWindow::new(mock.clone());
        let dev = RegisterMap::DEVICE;

        // Two bytes into the last MOSI word would read past the buffer.
        let last = dev.word(Region::Mosi, MOSI_BUFFER_WORDS - 1);
        assert!(matches!(
            window.read_u32(last + 2),
            Err(TransportError::Register(RegisterError::Unaligned { .. }))
        ));
        assert!(matches!(
            window.write_u32(dev.status + 1, 1),
            Err(TransportError::Register(RegisterError::Unaligned { .. }))
        ));
        assert!(matches!(
            window.write_u32(dev.word(Region::Miso, MISO_BUFFER_WORDS), 1),
            Err(TransportError::Register(RegisterError::Unmapped { .. }))
        ));
        assert!(mock.get_writes().is_empty());
    }

    /// Compact map over a heap block: status, soc_control, command, one pad
    /// word, then MISO and MOSI.
    struct Scratch {
        mem: *mut [u32],
        map: RegisterMap,
    }

    impl Scratch {
        const WORDS: usize = 4 + MISO_BUFFER_WORDS + MOSI_BUFFER_WORDS;

        fn new() -> Self {
            let mem = Box::into_raw(vec![0u32; Self::WORDS].into_boxed_slice());
            let base = mem as *mut u32 as u64;
            let map = RegisterMap {
                status: base,
                soc_control: base + 4,
                command: base + 8,
                miso: base + 16,
                mosi: base + 16 + (MISO_BUFFER_WORDS * 4) as u64,
            };
            Self { mem, map }
        }

        fn poke(&self, addr: u64, value: u32) {
            unsafe { core::ptr::write_volatile(addr as usize as *mut u32, value) }
        }

        fn peek(&self, addr: u64) -> u32 {
            unsafe { core::ptr::read_volatile(addr as usize as *const u32) }
        }
    }

    impl Drop for Scratch {
        fn drop(&mut self) {
            drop(unsafe { Box::from_raw(self.mem) });
        }
    }

    #[test]
    fn test_volatile_registers_run_transaction() {
        let scratch = Scratch::new();
        let map = scratch.map;
        let regs = unsafe { VolatileRegisters::new(map) };
        let mut device = DeviceLoop::with_map(regs, ArithmeticHandler, map);

        assert_eq!(device.step().unwrap(), DevicePhase::AwaitCommand);
        assert_eq!(scratch.peek(map.status), SocStatus::WaitingForCommand.as_u32());

        scratch.poke(map.word(Region::Mosi, 0), 6.0f32.to_bits());
        scratch.poke(map.word(Region::Mosi, 1), 7.0f32.to_bits());
        scratch.poke(map.command, 3);

        device
            .run_until(|d| d.phase() == DevicePhase::AwaitClear)
            .unwrap();
        assert_eq!(scratch.peek(map.status), SocStatus::Done.as_u32());
        assert_eq!(f32::from_bits(scratch.peek(map.miso)), 42.0);

        scratch.poke(map.command, 0);
        device.run_until(|d| d.transactions() == 1).unwrap();
        device.step().unwrap();
        assert_eq!(scratch.peek(map.status), SocStatus::WaitingForCommand.as_u32());
    }

    #[test]
    fn test_volatile_registers_refuse_out_of_map() {
        let scratch = Scratch::new();
        let mut regs = unsafe { VolatileRegisters::new(scratch.map) };
        let past_mosi = scratch.map.word(Region::Mosi, MOSI_BUFFER_WORDS);

        assert_eq!(
            regs.write_u32(past_mosi, 1),
            Err(RegisterError::Unmapped { addr: past_mosi })
        );
        assert_eq!(
            regs.read_u32(scratch.map.command + 1),
            Err(RegisterError::Unaligned {
                addr: scratch.map.command + 1
            })
        );
        assert_eq!(regs.read_u32(scratch.map.command), Ok(0));
    }
}
