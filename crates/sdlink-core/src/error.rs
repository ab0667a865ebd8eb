//! Errors surfaced by a host session.

use thiserror::Error;

use crate::protocol::{Command, ConfigError};
use crate::state::machine::HostPhase;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session not connected; read and validate the configuration first")]
    NotReady,

    #[error("Payload of {len} bytes exceeds the {max}-byte input buffer")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("Device rejected command {command}")]
    Rejected { command: Command },

    #[error("Unexpected status 0x{raw:08X} while waiting for command {command}")]
    UnexpectedStatus { command: Command, raw: u32 },

    #[error("Timed out in {phase} after {polls} polls")]
    Timeout { phase: HostPhase, polls: u32 },
}

impl ProtocolError {
    /// The device understood the request but refused it. The session is
    /// still usable.
    pub fn is_rejection(&self) -> bool {
        matches!(self, ProtocolError::Rejected { .. })
    }

    /// Errors after which the run should stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Transport(_) | ProtocolError::Config(_) | ProtocolError::Timeout { .. }
        )
    }
}
