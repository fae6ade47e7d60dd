//! Reference host for compiled code objects.

pub mod runtime_error;
pub mod vm;

pub use runtime_error::RuntimeError;
pub use vm::{Value, Vm, VmConfig};
