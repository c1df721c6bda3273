use crate::bytecode::compile::Compiler;
use crate::bytecode::compile_error::CompileError;
use crate::bytecode::ir::{Bytecode, Constant};
use crate::bytecode::symbol_table::SymbolTable;
use crate::frontend::{self, SyntaxError};
use crate::lang::builtins::BUILTINS;
use crate::lang::value::Value;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm_bc::{GLOBALS_SIZE, Vm, VmConfig};
use std::mem;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Compiles and runs one input after another against shared state.
///
/// Every input gets a fresh compiler and VM, but the symbol table, the
/// constant pool and the globals array carry over, so later inputs see the
/// bindings of earlier ones.
pub struct Session {
    symbol_table: SymbolTable,
    constants: Vec<Constant>,
    globals: Vec<Value>,
    config: VmConfig,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(VmConfig::default())
    }

    pub fn with_config(config: VmConfig) -> Self {
        let (symbol_table, constants) = Compiler::new().into_state();
        Session {
            symbol_table,
            constants,
            globals: vec![Value::Nil; GLOBALS_SIZE],
            config,
        }
    }

    /// Compiles `source` on top of everything compiled so far without running
    /// it. Definitions made by `source` are kept.
    pub fn compile(&mut self, source: &str) -> Result<Bytecode, SessionError> {
        let program = frontend::parse(source)?;

        let mut compiler = Compiler::with_state(
            mem::take(&mut self.symbol_table),
            mem::take(&mut self.constants),
        );
        let compiled = compiler.compile(&program);
        let bytecode = compiler.bytecode();
        (self.symbol_table, self.constants) = compiler.into_state();

        compiled?;
        Ok(bytecode)
    }

    /// Runs `source` and returns the last value popped off the stack.
    ///
    /// A failed input leaves the session usable: the symbol table is back at
    /// its global scope and the globals array is recovered from the VM.
    pub fn eval(&mut self, source: &str) -> Result<Value, SessionError> {
        log::debug!("session: eval {:?}", source);

        let bytecode = self.compile(source)?;

        let mut vm = Vm::with_config(
            bytecode,
            mem::take(&mut self.globals),
            self.config.clone(),
            BUILTINS,
        );
        let result = vm.run();
        let value = vm.last_popped_stack_elem();
        self.globals = vm.into_globals();

        result?;
        Ok(value)
    }
}
