//! Host transaction state machine.

pub mod machine;

pub use machine::{HostPhase, PollAction, TransactionState};
