//! Host-side transaction state machine.

use std::fmt;

use crate::protocol::{Command, SocStatus};

/// Phase of the host side of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostPhase {
    /// Device idle, no transaction in flight.
    #[default]
    Idle,
    /// Command word being written.
    Issuing,
    /// Waiting for the device to leave `Calculating`.
    Polling,
    /// Device reported `Done`; result read back.
    Completed,
    /// Device reported `InvalidCommand`.
    Rejected,
    /// Writing the no-op command until the device is idle again.
    Acknowledging,
}

impl fmt::Display for HostPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostPhase::Idle => write!(f, "IDLE"),
            HostPhase::Issuing => write!(f, "ISSUING"),
            HostPhase::Polling => write!(f, "POLLING"),
            HostPhase::Completed => write!(f, "COMPLETED"),
            HostPhase::Rejected => write!(f, "REJECTED"),
            HostPhase::Acknowledging => write!(f, "ACKNOWLEDGING"),
        }
    }
}

/// What to do after one status read in the `Polling` phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollAction {
    /// Sleep and read the status again.
    Wait,
    /// Result is ready in the MISO buffer.
    Complete,
    /// Device refused the command.
    Reject,
    /// Status makes no sense at this point of the transaction.
    Unexpected(u32),
}

/// Runtime state of one transaction.
#[derive(Debug)]
pub struct TransactionState {
    pub command: Command,
    pub phase: HostPhase,
    /// Status reads performed while polling.
    pub polls: u32,
    /// `WaitingForCommand` reads tolerated so far while polling.
    pub idle_reads: u32,
    /// No-op writes performed while acknowledging.
    pub ack_writes: u32,
}

impl TransactionState {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            phase: HostPhase::Idle,
            polls: 0,
            idle_reads: 0,
            ack_writes: 0,
        }
    }

    /// Transition to a new phase, returning the previous one.
    pub fn goto_phase(&mut self, next: HostPhase) -> HostPhase {
        tracing::trace!(from = %self.phase, to = %next, command = self.command.value(), "Phase transition");
        std::mem::replace(&mut self.phase, next)
    }

    /// Classify a status read taken while polling.
    ///
    /// A device that has not yet noticed the command still reports
    /// `WaitingForCommand`; up to `idle_grace` such reads are waited out
    /// before the status is treated as unexpected.
    pub fn on_status(&mut self, raw: u32, idle_grace: u32) -> PollAction {
        self.polls += 1;
        match SocStatus::from_raw(raw) {
            Some(SocStatus::Calculating) => PollAction::Wait,
            Some(SocStatus::Done) => PollAction::Complete,
            Some(SocStatus::InvalidCommand) => PollAction::Reject,
            Some(SocStatus::WaitingForCommand) if self.idle_reads < idle_grace => {
                self.idle_reads += 1;
                PollAction::Wait
            }
            _ => PollAction::Unexpected(raw),
        }
    }
}
