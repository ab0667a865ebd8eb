//! Two-operand floating point calculator.
//!
//! Host stages two `f32` operands in MOSI words 0 and 1, issues one of the
//! commands below, and reads the `f32` result from MISO word 0.

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;

use crate::device::{CommandHandler, CommandOutcome, DeviceBuffers, DeviceRegisters};
use crate::protocol::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add = 1,
    Subtract = 2,
    Multiply = 3,
    Divide = 4,
}

impl ArithmeticOp {
    pub const ALL: [ArithmeticOp; 4] = [
        ArithmeticOp::Add,
        ArithmeticOp::Subtract,
        ArithmeticOp::Multiply,
        ArithmeticOp::Divide,
    ];

    pub fn from_command(command: Command) -> Option<Self> {
        match command.value() {
            1 => Some(ArithmeticOp::Add),
            2 => Some(ArithmeticOp::Subtract),
            3 => Some(ArithmeticOp::Multiply),
            4 => Some(ArithmeticOp::Divide),
            _ => None,
        }
    }

    pub fn command(self) -> Command {
        Command(self as u32)
    }

    /// IEEE-754 semantics: division by zero yields an infinity, 0/0 NaN.
    pub fn apply(self, a: f32, b: f32) -> f32 {
        match self {
            ArithmeticOp::Add => a + b,
            ArithmeticOp::Subtract => a - b,
            ArithmeticOp::Multiply => a * b,
            ArithmeticOp::Divide => a / b,
        }
    }
}

impl From<ArithmeticOp> for Command {
    fn from(op: ArithmeticOp) -> Self {
        op.command()
    }
}

impl fmt::Display for ArithmeticOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArithmeticOp::Add => write!(f, "addition"),
            ArithmeticOp::Subtract => write!(f, "subtraction"),
            ArithmeticOp::Multiply => write!(f, "multiplication"),
            ArithmeticOp::Divide => write!(f, "division"),
        }
    }
}

/// Device-side handler for the calculator commands.
#[derive(Debug, Default)]
pub struct ArithmeticHandler;

impl CommandHandler for ArithmeticHandler {
    fn execute<R: DeviceRegisters>(
        &mut self,
        command: Command,
        buffers: &mut DeviceBuffers<'_, R>,
    ) -> Result<CommandOutcome, R::Error> {
        let Some(op) = ArithmeticOp::from_command(command) else {
            return Ok(CommandOutcome::Invalid);
        };
        let a = buffers.input_f32(0)?;
        let b = buffers.input_f32(1)?;
        buffers.set_output_f32(0, op.apply(a, b))?;
        Ok(CommandOutcome::Done)
    }
}

/// Encode the two operands as MOSI words 0 and 1.
pub fn pack_operands(a: f32, b: f32) -> [u8; 8] {
    let mut buf = [0u8; 8];
    LittleEndian::write_f32(&mut buf[0..4], a);
    LittleEndian::write_f32(&mut buf[4..8], b);
    buf
}

/// Decode the result from MISO word 0. `None` if the buffer is too short.
pub fn unpack_result(miso: &[u8]) -> Option<f32> {
    miso.get(0..4).map(LittleEndian::read_f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply() {
        assert_eq!(ArithmeticOp::Add.apply(10.0, 3.0), 13.0);
        assert_eq!(ArithmeticOp::Subtract.apply(10.0, 3.0), 7.0);
        assert_eq!(ArithmeticOp::Multiply.apply(10.0, 3.0), 30.0);
        assert!((ArithmeticOp::Divide.apply(10.0, 3.0) - 3.333_333).abs() < 1e-5);
    }

    #[test]
    fn test_divide_by_zero() {
        assert_eq!(ArithmeticOp::Divide.apply(1.0, 0.0), f32::INFINITY);
        assert_eq!(ArithmeticOp::Divide.apply(-1.0, 0.0), f32::NEG_INFINITY);
        assert!(ArithmeticOp::Divide.apply(0.0, 0.0).is_nan());
    }

    #[test]
    fn test_command_codes() {
        assert_eq!(ArithmeticOp::Add.command(), Command(1));
        assert_eq!(ArithmeticOp::Divide.command(), Command(4));
        assert_eq!(ArithmeticOp::from_command(Command(0)), None);
        assert_eq!(ArithmeticOp::from_command(Command(99)), None);
        for op in ArithmeticOp::ALL {
            assert_eq!(ArithmeticOp::from_command(op.command()), Some(op));
        }
    }

    #[test]
    fn test_pack_layout() {
        let buf = pack_operands(10.0, 3.0);
        assert_eq!(&buf[0..4], &10.0f32.to_le_bytes());
        assert_eq!(&buf[4..8], &3.0f32.to_le_bytes());
        assert_eq!(unpack_result(&buf), Some(10.0));
        assert_eq!(unpack_result(&buf[..3]), None);
    }
}
