//! Execution engines: the bytecode VM, the tree-walking evaluator and the
//! incremental session used by the REPL.

pub mod frame;
pub mod ops;
pub mod runtime_error;
pub mod session;
pub mod vm_ast;
pub mod vm_bc;
