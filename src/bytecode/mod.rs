pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod encode;
pub mod ir;
pub mod op;
pub mod stack_check;
pub mod table;

pub use compile::{CodeGen, CodegenOptions, compile};
pub use compile_error::CompileError;
pub use ir::{CodeFlags, CodeObject};
pub use op::{Instruction, InstructionError, Opcode, OpcodeTable};
