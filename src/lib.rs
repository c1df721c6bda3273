//! Monkey: a small dynamically typed language with a bytecode compiler, a
//! stack-based virtual machine and a tree-walking evaluator.
//!
//! ```text
//! source ──frontend──▶ Program ──bytecode::compile──▶ Bytecode ──runtime::vm_bc──▶ Value
//!                         └──────────────runtime::vm_ast──────────────────────────▶ Value
//! ```

pub mod bytecode;
pub mod frontend;
pub mod lang;
pub mod runtime;
