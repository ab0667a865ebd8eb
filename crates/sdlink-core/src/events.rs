//! Event system for UI decoupling.
//!
//! Allows the CLI (or any other front end) to follow a session without
//! tight coupling to the protocol logic.

use std::fmt;

use crate::protocol::{Command, ConfigurationDescriptor, SocStatus};
use crate::state::machine::HostPhase;

/// How a transaction ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
    Completed,
    Rejected,
    Failed,
}

impl fmt::Display for TransactionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionOutcome::Completed => write!(f, "completed"),
            TransactionOutcome::Rejected => write!(f, "rejected"),
            TransactionOutcome::Failed => write!(f, "failed"),
        }
    }
}

/// Events emitted by a session.
#[derive(Debug, Clone)]
pub enum SocEvent {
    /// Configuration block read and decoded.
    Configuration { descriptor: ConfigurationDescriptor },
    /// Host state machine moved to a new phase.
    PhaseChanged { from: HostPhase, to: HostPhase },
    /// Command word written.
    CommandIssued { command: Command },
    /// Status register read while polling.
    StatusPolled {
        raw: u32,
        status: Option<SocStatus>,
        poll: u32,
    },
    /// Transaction finished and the device is back to idle.
    TransactionFinished {
        command: Command,
        outcome: TransactionOutcome,
    },
    /// Register access performed by the transport.
    Access {
        direction: AccessDirection,
        offset: u64,
        length: usize,
    },
}

/// Register access direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDirection {
    Read,  // Device -> Host
    Write, // Host -> Device
}

impl fmt::Display for AccessDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessDirection::Read => write!(f, "RD"),
            AccessDirection::Write => write!(f, "WR"),
        }
    }
}

/// Observer trait for receiving session events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait SocObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &SocEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl SocObserver for NullObserver {
    fn on_event(&self, _event: &SocEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl SocObserver for TracingObserver {
    fn on_event(&self, event: &SocEvent) {
        match event {
            SocEvent::Configuration { descriptor } => {
                tracing::info!(
                    identity = %descriptor.identity,
                    state = %format!("0x{:08X}", descriptor.state),
                    "{}",
                    descriptor
                );
            }
            SocEvent::PhaseChanged { from, to } => {
                tracing::debug!(from = %from, to = %to, "Phase changed");
            }
            SocEvent::CommandIssued { command } => {
                tracing::info!(command = command.value(), "Command issued");
            }
            SocEvent::StatusPolled { raw, status, poll } => match status {
                Some(s) => tracing::trace!(status = %s, poll = poll, "Status"),
                None => tracing::warn!(raw = raw, poll = poll, "Unrecognized status"),
            },
            SocEvent::TransactionFinished { command, outcome } => {
                tracing::info!(command = command.value(), outcome = %outcome, "Transaction finished");
            }
            SocEvent::Access {
                direction,
                offset,
                length,
            } => {
                tracing::trace!(
                    dir = %direction,
                    offset = %format!("0x{:05X}", offset),
                    len = length,
                    "Register access"
                );
            }
        }
    }
}
