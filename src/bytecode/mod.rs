pub mod compile;
pub mod compile_error;
pub mod disasm;
pub mod ir;
pub mod op;
pub mod symbol_table;

pub use ir::{Bytecode, CompiledFunction, Constant, Instructions};
pub use op::Opcode;
