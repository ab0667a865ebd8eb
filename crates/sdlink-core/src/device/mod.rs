//! Device side of the protocol.
//!
//! - `registers`: word access to the register space (MMIO or host window)
//! - `command_loop`: the wait/execute/publish/await-ack state machine

pub mod command_loop;
pub mod registers;

pub use command_loop::{CommandHandler, CommandOutcome, DeviceBuffers, DeviceLoop, DevicePhase};
pub use registers::{DeviceRegisters, HostWindow, VolatileRegisters};
