//! # Abstract Syntax Tree
//!
//! This module defines the tree consumed by the code generator. The tree is
//! produced by the front end (or built by hand in tests) and is never mutated
//! by the compiler.
//!
//! ## Documentation conventions
//!
//! - Stack effects are written as `( before -- after )`.
//! - Source examples use the surface syntax accepted by `frontend::parser`.

pub mod node;
pub mod value;
