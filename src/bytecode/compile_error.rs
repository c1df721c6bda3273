use crate::bytecode::op::Opcode;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// An identifier that resolves in no enclosing scope.
    #[error("compile error: undefined variable \"{0}\"")]
    UndefinedVariable(String),

    #[error("compile error: unknown unary operator: {0}")]
    UnknownPrefixOperator(String),

    #[error("compile error: unknown operator: {0}")]
    UnknownInfixOperator(String),

    /// The left side of `=` is neither an identifier nor an index expression.
    #[error("compile error: cannot assign to '{0}'")]
    InvalidAssignmentTarget(String),

    /// An operand does not fit the width the instruction format gives it,
    /// e.g. more than 65535 constants or more than 255 locals.
    #[error("compile error: operand {operand} does not fit {opcode:?}")]
    OperandOverflow { opcode: Opcode, operand: usize },
}

impl CompileError {
    /// A suggestion for the user, shown under the error by the CLI.
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            CompileError::UndefinedVariable(_) => {
                Some("bind the name with 'let' before using it")
            }
            CompileError::InvalidAssignmentTarget(_) => {
                Some("only names and index expressions like 'a[0]' can be assigned")
            }
            CompileError::OperandOverflow { .. } => {
                Some("split the program or function into smaller pieces")
            }
            CompileError::UnknownPrefixOperator(_) | CompileError::UnknownInfixOperator(_) => None,
        }
    }
}
