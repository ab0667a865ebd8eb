//! Status and command register values.
//!
//! The status register is the only synchronization variable between the
//! host and the device. The device writes it, the host only reads it.

use std::fmt;

/// Status word published by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocStatus {
    /// Idle, waiting for the host to issue a command.
    WaitingForCommand = 0,
    /// Executing the current command.
    Calculating = 1,
    /// Command finished, result is in the MISO buffer.
    Done = 2,
    /// Command code not understood by the device.
    InvalidCommand = 3,
}

impl SocStatus {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(SocStatus::WaitingForCommand),
            1 => Some(SocStatus::Calculating),
            2 => Some(SocStatus::Done),
            3 => Some(SocStatus::InvalidCommand),
            _ => None,
        }
    }

    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for SocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocStatus::WaitingForCommand => write!(f, "WAITING_FOR_COMMAND"),
            SocStatus::Calculating => write!(f, "CALCULATING"),
            SocStatus::Done => write!(f, "DONE"),
            SocStatus::InvalidCommand => write!(f, "INVALID_COMMAND"),
        }
    }
}

/// Command word written by the host.
///
/// Zero is reserved as the idle/acknowledge value; every other value is
/// interpreted by the firmware's command handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Command(pub u32);

impl Command {
    /// No command pending. Also used to acknowledge a finished command.
    pub const NONE: Command = Command(0);

    pub const fn value(self) -> u32 {
        self.0
    }

    pub const fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Command {
    fn from(value: u32) -> Self {
        Command(value)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
