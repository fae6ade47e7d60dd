use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bytecode::encode::{OperandOverflow, encode};

// =============================================================================
// OPCODE - Stack machine operations
// =============================================================================

/// The operations the code generator can emit.
///
/// The numeric value of each opcode is owned by the host and supplied through
/// an [`OpcodeTable`]; nothing here depends on a particular numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Opcode {
    /// Push `consts[arg]`. ( -- x )
    LoadConst,
    /// Push the global named `names[arg]`. ( -- x )
    LoadGlobal,
    /// Bind the global named `names[arg]`. ( x -- )
    StoreGlobal,
    /// ( a b -- a+b )
    BinaryAdd,
    /// Call with `arg` positional arguments. ( f a1 .. an -- result )
    CallFunction,
    /// ( x -- )
    ReturnValue,
    /// ( x -- )
    PopTop,
    /// ( x -- x x )
    DupTop,
}

const OPCODE_COUNT: usize = 8;

impl Opcode {
    pub const ALL: [Opcode; OPCODE_COUNT] = [
        Opcode::LoadConst,
        Opcode::LoadGlobal,
        Opcode::StoreGlobal,
        Opcode::BinaryAdd,
        Opcode::CallFunction,
        Opcode::ReturnValue,
        Opcode::PopTop,
        Opcode::DupTop,
    ];

    /// Whether the instruction carries a two-byte operand.
    pub fn has_operand(self) -> bool {
        matches!(
            self,
            Opcode::LoadConst | Opcode::LoadGlobal | Opcode::StoreGlobal | Opcode::CallFunction
        )
    }

    /// Encoded width in bytes.
    pub fn width(self) -> usize {
        if self.has_operand() { 3 } else { 1 }
    }

    /// Conventional mnemonic, also used as the key in configuration files.
    pub fn name(self) -> &'static str {
        match self {
            Opcode::LoadConst => "LOAD_CONST",
            Opcode::LoadGlobal => "LOAD_GLOBAL",
            Opcode::StoreGlobal => "STORE_GLOBAL",
            Opcode::BinaryAdd => "BINARY_ADD",
            Opcode::CallFunction => "CALL_FUNCTION",
            Opcode::ReturnValue => "RETURN_VALUE",
            Opcode::PopTop => "POP_TOP",
            Opcode::DupTop => "DUP_TOP",
        }
    }

    pub fn from_name(name: &str) -> Option<Opcode> {
        Opcode::ALL.into_iter().find(|op| op.name() == name)
    }

    fn slot(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

// =============================================================================
// INSTRUCTION
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InstructionError {
    #[error("{0} requires an operand")]
    MissingOperand(Opcode),

    #[error("{0} takes no operand")]
    UnexpectedOperand(Opcode),

    #[error(transparent)]
    Overflow(#[from] OperandOverflow),
}

/// One opcode plus its operand, if the opcode carries one.
///
/// Instructions can only be built through checked constructors, so the
/// operand is present exactly when [`Opcode::has_operand`] says so.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    opcode: Opcode,
    operand: Option<u16>,
}

impl Instruction {
    pub const BINARY_ADD: Self = Self::bare(Opcode::BinaryAdd);
    pub const RETURN_VALUE: Self = Self::bare(Opcode::ReturnValue);
    pub const POP_TOP: Self = Self::bare(Opcode::PopTop);
    pub const DUP_TOP: Self = Self::bare(Opcode::DupTop);

    const fn bare(opcode: Opcode) -> Self {
        Self {
            opcode,
            operand: None,
        }
    }

    /// Builds an instruction from its parts, rejecting an operand that does
    /// not match the opcode.
    pub fn new(opcode: Opcode, operand: Option<u16>) -> Result<Self, InstructionError> {
        match (opcode.has_operand(), operand) {
            (true, None) => Err(InstructionError::MissingOperand(opcode)),
            (false, Some(_)) => Err(InstructionError::UnexpectedOperand(opcode)),
            _ => Ok(Self { opcode, operand }),
        }
    }

    /// An instruction without operand.
    pub fn simple(opcode: Opcode) -> Result<Self, InstructionError> {
        Self::new(opcode, None)
    }

    /// An instruction with an operand, validated through the operand encoder.
    pub fn with_arg(opcode: Opcode, index: usize) -> Result<Self, InstructionError> {
        if !opcode.has_operand() {
            return Err(InstructionError::UnexpectedOperand(opcode));
        }
        let (lo, hi) = encode(index)?;
        Ok(Self {
            opcode,
            operand: Some(u16::from_le_bytes([lo, hi])),
        })
    }

    /// Reads the instruction for `opcode` whose operand bytes, if any, start
    /// at `rest`. Returns `None` when the operand is cut short.
    pub(crate) fn read(opcode: Opcode, rest: &[u8]) -> Option<Self> {
        if !opcode.has_operand() {
            return Some(Self::bare(opcode));
        }
        match rest {
            [lo, hi, ..] => Some(Self {
                opcode,
                operand: Some(u16::from_le_bytes([*lo, *hi])),
            }),
            _ => None,
        }
    }

    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    pub fn operand(&self) -> Option<u16> {
        self.operand
    }

    /// Operand as an index, `0` for operand-less instructions.
    pub fn arg(&self) -> usize {
        self.operand.map(usize::from).unwrap_or(0)
    }

    /// Appends the encoded form of this instruction to `out`.
    pub fn write_to(&self, table: &OpcodeTable, out: &mut Vec<u8>) {
        out.push(table.code(self.opcode));
        if let Some(arg) = self.operand {
            out.extend_from_slice(&arg.to_le_bytes());
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.operand {
            Some(arg) => write!(f, "{} {}", self.opcode, arg),
            None => write!(f, "{}", self.opcode),
        }
    }
}

// =============================================================================
// OPCODE TABLE - Host-owned numbering
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OpcodeTableError {
    #[error("opcode table has no entry for {0}")]
    Missing(Opcode),

    #[error("byte {byte} is assigned to both {first} and {second}")]
    Duplicate {
        byte: u8,
        first: Opcode,
        second: Opcode,
    },

    #[error("unknown opcode name '{0}'")]
    UnknownName(String),
}

/// Bidirectional mapping between [`Opcode`]s and the bytes a host expects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpcodeTable {
    codes: [u8; OPCODE_COUNT],
    by_byte: FxHashMap<u8, Opcode>,
}

impl OpcodeTable {
    /// Builds a table from `(opcode, byte)` pairs.
    ///
    /// Every opcode must be present and every byte must be distinct; a later
    /// entry for the same opcode replaces an earlier one.
    pub fn new(
        entries: impl IntoIterator<Item = (Opcode, u8)>,
    ) -> Result<Self, OpcodeTableError> {
        let mut assigned: [Option<u8>; OPCODE_COUNT] = [None; OPCODE_COUNT];
        for (op, byte) in entries {
            assigned[op.slot()] = Some(byte);
        }

        let mut codes = [0u8; OPCODE_COUNT];
        let mut by_byte = FxHashMap::default();
        for op in Opcode::ALL {
            let byte = assigned[op.slot()].ok_or(OpcodeTableError::Missing(op))?;
            if let Some(first) = by_byte.insert(byte, op) {
                return Err(OpcodeTableError::Duplicate {
                    byte,
                    first,
                    second: op,
                });
            }
            codes[op.slot()] = byte;
        }

        Ok(Self { codes, by_byte })
    }

    /// Builds a table from mnemonic names, as found in configuration files.
    pub fn from_names<'a>(
        entries: impl IntoIterator<Item = (&'a str, u8)>,
    ) -> Result<Self, OpcodeTableError> {
        let pairs = entries
            .into_iter()
            .map(|(name, byte)| {
                Opcode::from_name(name)
                    .map(|op| (op, byte))
                    .ok_or_else(|| OpcodeTableError::UnknownName(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(pairs)
    }

    /// The classic (pre-wordcode) CPython 3 numbering.
    pub fn classic() -> Self {
        let mut by_byte = FxHashMap::default();
        let mut codes = [0u8; OPCODE_COUNT];
        for (op, byte) in Self::CLASSIC {
            codes[op.slot()] = byte;
            by_byte.insert(byte, op);
        }
        Self { codes, by_byte }
    }

    const CLASSIC: [(Opcode, u8); OPCODE_COUNT] = [
        (Opcode::PopTop, 1),
        (Opcode::DupTop, 4),
        (Opcode::BinaryAdd, 23),
        (Opcode::ReturnValue, 83),
        (Opcode::StoreGlobal, 97),
        (Opcode::LoadConst, 100),
        (Opcode::LoadGlobal, 116),
        (Opcode::CallFunction, 131),
    ];

    /// Returns a copy with `entries` replacing the current assignments.
    pub fn with_overrides(
        &self,
        entries: impl IntoIterator<Item = (Opcode, u8)>,
    ) -> Result<Self, OpcodeTableError> {
        let current = Opcode::ALL.into_iter().map(|op| (op, self.code(op)));
        Self::new(current.chain(entries))
    }

    pub fn code(&self, op: Opcode) -> u8 {
        self.codes[op.slot()]
    }

    pub fn opcode(&self, byte: u8) -> Option<Opcode> {
        self.by_byte.get(&byte).copied()
    }
}

impl Default for OpcodeTable {
    fn default() -> Self {
        Self::classic()
    }
}
