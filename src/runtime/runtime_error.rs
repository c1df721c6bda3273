use thiserror::Error;

/// A fault that stops execution.
///
/// Misuse of a builtin is not a `RuntimeError`: builtins return
/// `Value::Error`, which the program can keep using like any other value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("stack overflow")]
    StackOverflow,

    /// An instruction wanted more operands than the stack holds.
    #[error("stack underflow")]
    StackUnderflow,

    #[error("frame overflow: more than {0} nested calls")]
    FrameOverflow(usize),

    #[error("calling non-function and non-built-in: type {0}")]
    NotCallable(&'static str),

    #[error("wrong number of arguments: want={want}, got={got}")]
    WrongArgumentCount { want: usize, got: usize },

    #[error("unsupported types for binary operation {operator}: {left} and {right}")]
    UnsupportedBinaryOperation {
        operator: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("unsupported type for negation: {0}")]
    UnsupportedNegation(&'static str),

    #[error("unknown operator {operator}: {left} and {right}")]
    UnknownComparison {
        operator: String,
        left: &'static str,
        right: &'static str,
    },

    #[error("unusable as hash key: {0}")]
    UnusableHashKey(&'static str),

    #[error("index operator not supported: {0}")]
    IndexNotSupported(&'static str),

    /// Only raised by index assignment; reading out of range yields nil.
    #[error("array index {0} out of range")]
    ArrayIndexOutOfRange(i64),

    #[error("not a function: {0}")]
    NotAFunction(String),

    #[error("opcode {byte} undefined at {offset:04}")]
    UndefinedOpcode { byte: u8, offset: usize },

    #[error("truncated operands for {opcode} at {offset:04}")]
    TruncatedInstruction { opcode: &'static str, offset: usize },

    #[error("constant {0} out of range")]
    UndefinedConstant(usize),

    #[error("undefined builtin {0}")]
    UndefinedBuiltin(usize),

    #[error("free variable {0} out of range")]
    UndefinedFree(usize),

    // Tree-walking evaluator only; the compiler rejects these up front.
    #[error("identifier not found: {0}")]
    UndefinedVariable(String),

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("cannot assign to '{0}'")]
    InvalidAssignmentTarget(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            RuntimeError::WrongArgumentCount { want: 0, got: 1 }.to_string(),
            "wrong number of arguments: want=0, got=1"
        );
        assert_eq!(
            RuntimeError::UnsupportedBinaryOperation {
                operator: "+".to_string(),
                left: "Integer",
                right: "String",
            }
            .to_string(),
            "unsupported types for binary operation +: Integer and String"
        );
        assert_eq!(
            RuntimeError::UndefinedOpcode { byte: 200, offset: 3 }.to_string(),
            "opcode 200 undefined at 0003"
        );
        assert_eq!(
            RuntimeError::ArrayIndexOutOfRange(10).to_string(),
            "array index 10 out of range"
        );
        assert_eq!(RuntimeError::StackUnderflow.to_string(), "stack underflow");
        assert_eq!(
            RuntimeError::UndefinedFree(2).to_string(),
            "free variable 2 out of range"
        );
    }
}
