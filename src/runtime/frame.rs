use crate::bytecode::ir::Instructions;
use crate::lang::value::Closure;
use std::rc::Rc;

/// Activation record of one closure call.
#[derive(Debug, Clone)]
pub struct Frame {
    pub closure: Rc<Closure>,
    /// Offset of the next instruction to execute.
    pub ip: usize,
    /// Stack slot of the first local; the callee sits just below it.
    pub base_pointer: usize,
}

impl Frame {
    pub fn new(closure: Rc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: 0,
            base_pointer,
        }
    }

    pub fn instructions(&self) -> &Instructions {
        &self.closure.function.instructions
    }
}
