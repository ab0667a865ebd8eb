//! Device command loop.
//!
//! Mirror image of the host session. The device owns the status register
//! and the MISO buffer; the host owns the command register and the MOSI
//! buffer.
//!
//! ```text
//! Publish(WAITING) -> AwaitCommand -> Execute -> AwaitClear -> Publish ...
//! ```

use std::fmt;

use tracing::{debug, trace};

use super::registers::DeviceRegisters;
use crate::protocol::registers::{
    MISO_BUFFER_WORDS, MOSI_BUFFER_WORDS, Region, RegisterError, RegisterMap,
};
use crate::protocol::{Command, SocStatus};

/// Result of running a command on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Result published, report `Done`.
    Done,
    /// Command not recognized, report `InvalidCommand`.
    Invalid,
}

/// Word-indexed access to the MOSI and MISO buffers. Indices past the end
/// of a buffer are refused with `RegisterError::IndexOutOfRange`.
pub struct DeviceBuffers<'a, R: DeviceRegisters> {
    regs: &'a mut R,
    map: RegisterMap,
}

impl<'a, R: DeviceRegisters> DeviceBuffers<'a, R> {
    pub fn new(regs: &'a mut R, map: RegisterMap) -> Self {
        Self { regs, map }
    }

    /// Read word `index` of the MOSI (input) buffer.
    pub fn input_word(&mut self, index: usize) -> Result<u32, R::Error> {
        if index >= MOSI_BUFFER_WORDS {
            return Err(RegisterError::IndexOutOfRange {
                region: Region::Mosi,
                index,
            }
            .into());
        }
        self.regs.read_u32(self.map.word(Region::Mosi, index))
    }

    /// Write word `index` of the MISO (output) buffer.
    pub fn set_output_word(&mut self, index: usize, value: u32) -> Result<(), R::Error> {
        if index >= MISO_BUFFER_WORDS {
            return Err(RegisterError::IndexOutOfRange {
                region: Region::Miso,
                index,
            }
            .into());
        }
        self.regs.write_u32(self.map.word(Region::Miso, index), value)
    }

    pub fn input_f32(&mut self, index: usize) -> Result<f32, R::Error> {
        self.input_word(index).map(f32::from_bits)
    }

    pub fn set_output_f32(&mut self, index: usize, value: f32) -> Result<(), R::Error> {
        self.set_output_word(index, value.to_bits())
    }
}

/// The "execute" step of the loop: application logic for each command.
pub trait CommandHandler {
    /// Run `command`. Unknown commands must return `Invalid` without
    /// touching the buffers.
    fn execute<R: DeviceRegisters>(
        &mut self,
        command: Command,
        buffers: &mut DeviceBuffers<'_, R>,
    ) -> Result<CommandOutcome, R::Error>;
}

/// Where the loop is between two steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DevicePhase {
    /// About to publish `WaitingForCommand`.
    #[default]
    Publish,
    /// Spinning until the command register is non-zero.
    AwaitCommand,
    /// Command seen and `Calculating` published.
    Execute(Command),
    /// Result published, spinning until the host clears the command.
    AwaitClear,
}

impl fmt::Display for DevicePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePhase::Publish => write!(f, "PUBLISH"),
            DevicePhase::AwaitCommand => write!(f, "AWAIT_COMMAND"),
            DevicePhase::Execute(c) => write!(f, "EXECUTE({})", c),
            DevicePhase::AwaitClear => write!(f, "AWAIT_CLEAR"),
        }
    }
}

/// Firmware side of the protocol as an explicit state machine.
pub struct DeviceLoop<R: DeviceRegisters, H: CommandHandler> {
    regs: R,
    handler: H,
    map: RegisterMap,
    phase: DevicePhase,
    transactions: u64,
}

impl<R: DeviceRegisters, H: CommandHandler> DeviceLoop<R, H> {
    /// Loop over the device-side addresses.
    pub fn new(regs: R, handler: H) -> Self {
        Self::with_map(regs, handler, RegisterMap::DEVICE)
    }

    pub fn with_map(regs: R, handler: H, map: RegisterMap) -> Self {
        Self {
            regs,
            handler,
            map,
            phase: DevicePhase::Publish,
            transactions: 0,
        }
    }

    pub fn phase(&self) -> DevicePhase {
        self.phase
    }

    /// Commands completed (acknowledged by the host) so far.
    pub fn transactions(&self) -> u64 {
        self.transactions
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn registers(&mut self) -> &mut R {
        &mut self.regs
    }

    fn publish(&mut self, status: SocStatus) -> Result<(), R::Error> {
        trace!(status = %status, "Publish status");
        self.regs.write_u32(self.map.status, status.as_u32())
    }

    fn command(&mut self) -> Result<Command, R::Error> {
        self.regs.read_u32(self.map.command).map(Command)
    }

    /// Advance by at most one transition and return the new phase. The
    /// waiting phases read the command register once and stay put if
    /// nothing changed.
    pub fn step(&mut self) -> Result<DevicePhase, R::Error> {
        self.phase = match self.phase {
            DevicePhase::Publish => {
                self.publish(SocStatus::WaitingForCommand)?;
                DevicePhase::AwaitCommand
            }
            DevicePhase::AwaitCommand => {
                let command = self.command()?;
                if command.is_none() {
                    DevicePhase::AwaitCommand
                } else {
                    self.publish(SocStatus::Calculating)?;
                    DevicePhase::Execute(command)
                }
            }
            DevicePhase::Execute(command) => {
                let mut buffers = DeviceBuffers::new(&mut self.regs, self.map);
                let outcome = self.handler.execute(command, &mut buffers)?;
                debug!(command = command.value(), outcome = ?outcome, "Command executed");
                match outcome {
                    CommandOutcome::Done => self.publish(SocStatus::Done)?,
                    CommandOutcome::Invalid => self.publish(SocStatus::InvalidCommand)?,
                }
                DevicePhase::AwaitClear
            }
            DevicePhase::AwaitClear => {
                if self.command()?.is_none() {
                    self.transactions += 1;
                    DevicePhase::Publish
                } else {
                    DevicePhase::AwaitClear
                }
            }
        };
        Ok(self.phase)
    }

    /// Step until `stop` returns true, spinning while waiting.
    pub fn run_until(&mut self, mut stop: impl FnMut(&Self) -> bool) -> Result<(), R::Error> {
        while !stop(&*self) {
            let before = self.phase;
            if self.step()? == before {
                std::hint::spin_loop();
            }
        }
        Ok(())
    }

    /// Serve commands forever. Only returns on a register access error.
    pub fn run(&mut self) -> Result<std::convert::Infallible, R::Error> {
        loop {
            self.step()?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::registers::HostWindow;
    use crate::transport::{MockTransport, TransportError};

    /// Adds words 0 and 1 into output word 0 for command 1.
    struct AddWords;

    impl CommandHandler for AddWords {
        fn execute<R: DeviceRegisters>(
            &mut self,
            command: Command,
            buffers: &mut DeviceBuffers<'_, R>,
        ) -> Result<CommandOutcome, R::Error> {
            if command != Command(1) {
                return Ok(CommandOutcome::Invalid);
            }
            let sum = buffers.input_word(0)? + buffers.input_word(1)?;
            buffers.set_output_word(0, sum)?;
            Ok(CommandOutcome::Done)
        }
    }

    const HOST: RegisterMap = RegisterMap::HOST;

    fn device(mock: &MockTransport) -> DeviceLoop<HostWindow<MockTransport>, AddWords> {
        DeviceLoop::new(HostWindow::new(mock.clone()), AddWords)
    }

    #[test]
    fn test_full_cycle() {
        let mock = MockTransport::new();
        let mut dev = device(&mock);
        mock.poke(HOST.status, &0xFFu32.to_le_bytes());

        assert_eq!(dev.step().unwrap(), DevicePhase::AwaitCommand);
        assert_eq!(mock.peek_u32(HOST.status), 0);

        // No command yet: stays put
        assert_eq!(dev.step().unwrap(), DevicePhase::AwaitCommand);

        mock.poke(HOST.mosi, &20u32.to_le_bytes());
        mock.poke(HOST.mosi + 4, &22u32.to_le_bytes());
        mock.poke(HOST.command, &1u32.to_le_bytes());

        assert_eq!(dev.step().unwrap(), DevicePhase::Execute(Command(1)));
        assert_eq!(mock.peek_u32(HOST.status), SocStatus::Calculating.as_u32());

        assert_eq!(dev.step().unwrap(), DevicePhase::AwaitClear);
        assert_eq!(mock.peek_u32(HOST.status), SocStatus::Done.as_u32());
        assert_eq!(mock.peek_u32(HOST.miso), 42);

        // Host has not acknowledged yet
        assert_eq!(dev.step().unwrap(), DevicePhase::AwaitClear);
        assert_eq!(dev.transactions(), 0);

        mock.poke(HOST.command, &0u32.to_le_bytes());
        assert_eq!(dev.step().unwrap(), DevicePhase::Publish);
        assert_eq!(dev.transactions(), 1);
        assert_eq!(dev.step().unwrap(), DevicePhase::AwaitCommand);
        assert_eq!(mock.peek_u32(HOST.status), 0);
    }

    #[test]
    fn test_unknown_command_leaves_buffers() {
        let mock = MockTransport::new();
        let mut dev = device(&mock);
        mock.poke(HOST.miso, &0xAAAA_AAAAu32.to_le_bytes());
        mock.poke(HOST.command, &99u32.to_le_bytes());

        dev.step().unwrap();
        dev.step().unwrap();
        assert_eq!(dev.step().unwrap(), DevicePhase::AwaitClear);
        assert_eq!(mock.peek_u32(HOST.status), SocStatus::InvalidCommand.as_u32());
        assert_eq!(mock.peek_u32(HOST.miso), 0xAAAA_AAAA);
    }

    #[test]
    fn test_run_until() {
        let mock = MockTransport::new();
        let mut dev = device(&mock);
        mock.poke(HOST.command, &1u32.to_le_bytes());
        dev.run_until(|d| d.phase() == DevicePhase::AwaitClear)
            .unwrap();
        assert_eq!(mock.peek_u32(HOST.status), SocStatus::Done.as_u32());
    }

    #[test]
    fn test_buffer_index_checked() {
        let mock = MockTransport::new();
        let mut window = HostWindow::new(mock.clone());
        let mut buffers = DeviceBuffers::new(&mut window, RegisterMap::DEVICE);

        assert!(matches!(
            buffers.set_output_word(MISO_BUFFER_WORDS, 1),
            Err(TransportError::Register(RegisterError::IndexOutOfRange {
                region: Region::Miso,
                index: MISO_BUFFER_WORDS,
            }))
        ));
        assert!(matches!(
            buffers.input_word(MOSI_BUFFER_WORDS),
            Err(TransportError::Register(RegisterError::IndexOutOfRange {
                region: Region::Mosi,
                ..
            }))
        ));
        assert!(mock.get_writes().is_empty());

        buffers.set_output_word(MISO_BUFFER_WORDS - 1, 5).unwrap();
        assert_eq!(
            mock.peek_u32(HOST.word(Region::Miso, MISO_BUFFER_WORDS - 1)),
            5
        );
    }

    /// Writes one word past the end of MISO.
    struct Overrun;

    impl CommandHandler for Overrun {
        fn execute<R: DeviceRegisters>(
            &mut self,
            _command: Command,
            buffers: &mut DeviceBuffers<'_, R>,
        ) -> Result<CommandOutcome, R::Error> {
            buffers.set_output_word(MISO_BUFFER_WORDS, 0xDEAD)?;
            Ok(CommandOutcome::Done)
        }
    }

    #[test]
    fn test_handler_overrun_stops_loop() {
        let mock = MockTransport::new();
        let mut dev = DeviceLoop::new(HostWindow::new(mock.clone()), Overrun);
        mock.poke(HOST.command, &1u32.to_le_bytes());

        dev.step().unwrap();
        dev.step().unwrap();
        assert!(dev.step().is_err());
        assert_eq!(mock.writes_to(HOST.status), vec![0, 1]);
    }
}
