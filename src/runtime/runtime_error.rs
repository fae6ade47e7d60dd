use thiserror::Error;

use crate::bytecode::ir::DecodeError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("runtime error: name '{0}' is not defined")]
    UndefinedName(String),

    #[error("runtime error: type error: {0}")]
    Type(String),

    #[error("runtime error: integer overflow in {0}")]
    Overflow(&'static str),

    #[error("runtime error: stack underflow at offset {offset} ({op})")]
    StackUnderflow { offset: usize, op: &'static str },

    #[error("runtime error: operand {index} out of range for {pool} pool at offset {offset}")]
    BadOperand {
        index: usize,
        pool: &'static str,
        offset: usize,
    },

    #[error("runtime error: code object ended without RETURN_VALUE")]
    MissingReturn,

    #[error("runtime error: {0}")]
    Limit(String),

    #[error("runtime error: {0}")]
    Decode(#[from] DecodeError),

    #[error("runtime error: output failed: {0}")]
    Io(#[from] std::io::Error),
}

pub fn type_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::Type(message.into())
}
