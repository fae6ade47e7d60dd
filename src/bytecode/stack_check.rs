use thiserror::Error;

use crate::bytecode::op::{Instruction, Opcode};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("stack-check error: {message}")]
pub struct StackCheckError {
    pub message: String,
}

impl StackCheckError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Returns (pops, pushes) for an instruction.
pub fn effect(instr: &Instruction) -> (usize, usize) {
    match instr.opcode() {
        Opcode::LoadConst | Opcode::LoadGlobal => (0, 1),
        Opcode::StoreGlobal => (1, 0),
        Opcode::BinaryAdd => (2, 1),
        // callee plus its arguments
        Opcode::CallFunction => (instr.arg() + 1, 1),
        Opcode::ReturnValue => (1, 0),
        Opcode::PopTop => (1, 0),
        Opcode::DupTop => (1, 2),
    }
}

/// Simulates `instrs` from an empty stack and returns the deepest point
/// reached.
///
/// The code generator emits straight-line code only, so a linear scan is
/// exact.
pub fn max_stack_depth(instrs: &[Instruction]) -> Result<usize, StackCheckError> {
    let mut h: usize = 0;
    let mut max = 0;

    for (ip, instr) in instrs.iter().enumerate() {
        let (pops, pushes) = effect(instr);
        h = h.checked_sub(pops).ok_or_else(|| {
            StackCheckError::new(format!(
                "stack underflow at ip={}, op={}, needed {} items, had {}",
                ip, instr, pops, h
            ))
        })?;
        h += pushes;
        max = max.max(h);
    }

    Ok(max)
}

/// Net stack height after running `instrs` from an empty stack.
pub fn final_height(instrs: &[Instruction]) -> Result<usize, StackCheckError> {
    let mut h: usize = 0;
    for (ip, instr) in instrs.iter().enumerate() {
        let (pops, pushes) = effect(instr);
        h = h.checked_sub(pops).ok_or_else(|| {
            StackCheckError::new(format!("stack underflow at ip={}, op={}", ip, instr))
        })? + pushes;
    }
    Ok(h)
}

/// Checks that `instrs` leave nothing on the stack, as a complete unit
/// ending in `RETURN_VALUE` must.
pub fn check_balanced(instrs: &[Instruction]) -> Result<(), StackCheckError> {
    match final_height(instrs)? {
        0 => Ok(()),
        h => Err(StackCheckError::new(format!(
            "{} value(s) left on the stack at end of unit",
            h
        ))),
    }
}
