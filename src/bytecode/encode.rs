//! Fixed-width operand encoding.
//!
//! Operands are 16-bit unsigned values stored low byte first.

use thiserror::Error;

/// Largest value an operand can hold.
pub const MAX_OPERAND: usize = u16::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("operand {value} does not fit in 16 bits (max {})", MAX_OPERAND)]
pub struct OperandOverflow {
    pub value: usize,
}

/// Splits `index` into `(low_byte, high_byte)` so that
/// `index == low + 256 * high`.
pub fn encode(index: usize) -> Result<(u8, u8), OperandOverflow> {
    let value = u16::try_from(index).map_err(|_| OperandOverflow { value: index })?;
    let [lo, hi] = value.to_le_bytes();
    Ok((lo, hi))
}
