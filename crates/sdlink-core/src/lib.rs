//! sdlink-core: command/response channel to a compute module that is
//! addressed as a block storage device.
//!
//! The host writes operands into a shared input buffer, issues a command
//! code, polls a status register until the device reports completion, then
//! reads the result back. All traffic is plain byte-offset reads and writes
//! on the device node.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Register map, status/command codes, configuration block
//! - **Transport**: Byte-range access abstraction (block device, mock)
//! - **State**: Host transaction state machine
//! - **Session**: Host orchestrator (connect, execute, acknowledge)
//! - **Device**: Firmware command loop and register access
//! - **Events**: Observer pattern for UI decoupling
//! - **Payload**: Calculator and LED demo programs
//!
//! # Example
//!
//! ```no_run
//! use sdlink_core::payload::{ArithmeticOp, pack_operands, unpack_result};
//! use sdlink_core::session::{SessionConfig, SocSession};
//!
//! let config = SessionConfig {
//!     device_path: Some("/dev/sdb".to_string()),
//!     ..Default::default()
//! };
//!
//! let mut session = SocSession::open(config)?;
//! session.connect()?;
//! let out = session.execute(ArithmeticOp::Add, &pack_operands(10.0, 3.0))?;
//! assert_eq!(unpack_result(&out), Some(13.0));
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod clock;
pub mod device;
pub mod error;
pub mod events;
pub mod payload;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use clock::{NoSleep, Sleeper, ThreadSleeper};
pub use device::{CommandHandler, CommandOutcome, DeviceLoop, DevicePhase, DeviceRegisters, HostWindow};
pub use error::ProtocolError;
pub use events::{NullObserver, SocEvent, SocObserver, TracingObserver};
pub use protocol::{
    Command, ConfigurationDescriptor, Identity, RegisterError, RegisterMap, SocStatus, Version,
};
pub use session::{DeviceInfo, SessionConfig, SocSession};
pub use transport::{BlockDeviceTransport, MockTransport, RegisterTransport, TransportError};
