//! Compiles a small expression/statement language into stack-machine code
//! objects.
//!
//! The pipeline is `frontend` (source to tree), `bytecode` (tree to
//! [`CodeObject`](bytecode::CodeObject)) and `runtime` (a reference host that
//! executes code objects).

pub mod bytecode;
pub mod config;
pub mod frontend;
pub mod lang;
pub mod runtime;
