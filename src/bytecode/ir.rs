use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bytecode::op::{Instruction, Opcode, OpcodeTable};
use crate::lang::value::Constant;

bitflags! {
    /// Code object flags, numbered as the host expects them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
    pub struct CodeFlags: u32 {
        const OPTIMIZED = 0x0001;
        const NEWLOCALS = 0x0002;
        const VARARGS = 0x0004;
        const VARKEYWORDS = 0x0008;
        const NESTED = 0x0010;
        const GENERATOR = 0x0020;
        const NOFREE = 0x0040;
        const COROUTINE = 0x0080;
    }
}

impl CodeFlags {
    /// Optimized, fresh locals, no free or cell variables, not a generator or
    /// coroutine.
    pub fn module_default() -> Self {
        CodeFlags::OPTIMIZED | CodeFlags::NEWLOCALS | CodeFlags::NOFREE
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode byte {byte} at offset {offset}")]
    UnknownOpcode { byte: u8, offset: usize },

    #[error("truncated operand for {opcode} at offset {offset}")]
    TruncatedOperand { opcode: Opcode, offset: usize },
}

#[derive(Debug, Error)]
#[error("malformed code object: {0}")]
pub struct SerializeError(postcard::Error);

/// A single compiled unit: instruction bytes, pools and metadata.
///
/// Built once by the assembler and never mutated afterwards; fields are only
/// readable through accessors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeObject {
    pub(crate) argcount: u32,
    pub(crate) kwonlyargcount: u32,
    pub(crate) nlocals: u32,
    pub(crate) stacksize: u32,
    pub(crate) flags: CodeFlags,
    pub(crate) code: Vec<u8>,
    pub(crate) consts: Vec<Constant>,
    pub(crate) names: Vec<String>,
    pub(crate) varnames: Vec<String>,
    pub(crate) filename: String,
    pub(crate) name: String,
    pub(crate) firstlineno: u32,
    pub(crate) lnotab: Vec<u8>,
    pub(crate) freevars: Vec<String>,
    pub(crate) cellvars: Vec<String>,
}

impl CodeObject {
    pub fn argcount(&self) -> u32 {
        self.argcount
    }

    pub fn kwonlyargcount(&self) -> u32 {
        self.kwonlyargcount
    }

    pub fn nlocals(&self) -> u32 {
        self.nlocals
    }

    /// Upper bound on the value stack depth, computed from stack effects.
    pub fn stacksize(&self) -> u32 {
        self.stacksize
    }

    pub fn flags(&self) -> CodeFlags {
        self.flags
    }

    /// Serialized instruction stream.
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn consts(&self) -> &[Constant] {
        &self.consts
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn varnames(&self) -> &[String] {
        &self.varnames
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn firstlineno(&self) -> u32 {
        self.firstlineno
    }

    pub fn lnotab(&self) -> &[u8] {
        &self.lnotab
    }

    pub fn freevars(&self) -> &[String] {
        &self.freevars
    }

    pub fn cellvars(&self) -> &[String] {
        &self.cellvars
    }

    /// Decodes the byte stream into `(offset, instruction)` pairs.
    pub fn instructions(
        &self,
        table: &OpcodeTable,
    ) -> Result<Vec<(usize, Instruction)>, DecodeError> {
        decode(&self.code, table)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SerializeError> {
        postcard::to_allocvec(self).map_err(SerializeError)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SerializeError> {
        postcard::from_bytes(bytes).map_err(SerializeError)
    }
}

/// Decodes an instruction byte stream.
pub fn decode(
    code: &[u8],
    table: &OpcodeTable,
) -> Result<Vec<(usize, Instruction)>, DecodeError> {
    let mut out = Vec::new();
    let mut offset = 0;

    while offset < code.len() {
        let byte = code[offset];
        let opcode = table
            .opcode(byte)
            .ok_or(DecodeError::UnknownOpcode { byte, offset })?;

        let instr = Instruction::read(opcode, &code[offset + 1..])
            .ok_or(DecodeError::TruncatedOperand { opcode, offset })?;

        out.push((offset, instr));
        offset += opcode.width();
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_default_flags() {
        assert_eq!(CodeFlags::module_default().bits(), 67);
        assert!(!CodeFlags::module_default().contains(CodeFlags::GENERATOR));
        assert!(!CodeFlags::module_default().contains(CodeFlags::COROUTINE));
    }

    #[test]
    fn test_decode() {
        let table = OpcodeTable::classic();
        let decoded = decode(&[100, 44, 1, 23, 83], &table).unwrap();

        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].0, 0);
        assert_eq!(decoded[0].1.opcode(), Opcode::LoadConst);
        assert_eq!(decoded[0].1.operand(), Some(300));
        assert_eq!(decoded[1], (3, Instruction::BINARY_ADD));
        assert_eq!(decoded[2], (4, Instruction::RETURN_VALUE));
    }

    #[test]
    fn test_decode_unknown_byte() {
        let table = OpcodeTable::classic();
        assert_eq!(
            decode(&[1, 250], &table),
            Err(DecodeError::UnknownOpcode {
                byte: 250,
                offset: 1
            })
        );
    }

    #[test]
    fn test_decode_truncated_operand() {
        let table = OpcodeTable::classic();
        assert_eq!(
            decode(&[100, 0], &table),
            Err(DecodeError::TruncatedOperand {
                opcode: Opcode::LoadConst,
                offset: 0
            })
        );
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        assert!(CodeObject::from_bytes(&[0xff]).is_err());
    }
}
