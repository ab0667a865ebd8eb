//! Application payloads running on top of the protocol.

pub mod arithmetic;
pub mod breathe;

pub use arithmetic::{ArithmeticHandler, ArithmeticOp, pack_operands, unpack_result};
pub use breathe::BreathingLed;
