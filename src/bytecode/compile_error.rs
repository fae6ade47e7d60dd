use thiserror::Error;

use crate::bytecode::op::InstructionError;
use crate::bytecode::stack_check::StackCheckError;
use crate::lang::node::{BinOp, Target};

/// Errors that abort a compilation.
///
/// Compilation is all-or-nothing: any of these means no code object was
/// produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A binary operator without a code-generation rule.
    #[error("compile error: unsupported binary operator '{op}'\n  hint: only '+' can be compiled")]
    UnsupportedOperator { op: BinOp },

    /// Zero or several targets, or a target that is not a plain name.
    #[error("compile error: cannot assign to {reason}\n  hint: assign to exactly one plain name")]
    UnsupportedAssignmentTarget { targets: usize, reason: String },

    /// An index or argument count too large for a 16-bit operand.
    #[error("compile error: {context} operand {value} exceeds the 16-bit operand width")]
    OperandOverflow { value: usize, context: &'static str },

    /// An instruction was built with an operand its opcode does not take.
    #[error("compile error: internal error: {0}")]
    Instruction(InstructionError),

    /// The emitted code failed stack simulation.
    #[error("compile error: internal error: {0}")]
    StackCheck(#[from] StackCheckError),
}

impl CompileError {
    pub fn unsupported_operator(op: BinOp) -> Self {
        CompileError::UnsupportedOperator { op }
    }

    /// Create an error for an assignment whose target list cannot be compiled.
    pub fn unsupported_targets(targets: &[Target]) -> Self {
        let reason = match targets {
            [] => "nothing".to_string(),
            [single] => describe_target(single),
            many => format!("{} targets at once", many.len()),
        };
        CompileError::UnsupportedAssignmentTarget {
            targets: targets.len(),
            reason,
        }
    }

    /// Attach the node or pool that produced an out-of-range operand.
    pub fn operand(err: InstructionError, context: &'static str) -> Self {
        match err {
            InstructionError::Overflow(overflow) => CompileError::OperandOverflow {
                value: overflow.value,
                context,
            },
            other => CompileError::Instruction(other),
        }
    }
}

fn describe_target(target: &Target) -> String {
    match target {
        Target::Name(name) => format!("name '{}'", name),
        Target::Tuple(items) => format!("a tuple of {} targets", items.len()),
        Target::Expr(node) => format!("a {}", node.kind()),
    }
}
