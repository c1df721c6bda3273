use super::builtins::Builtin;
use super::environment::Environment;
use super::node::BlockStatement;
use crate::bytecode::ir::{CompiledFunction, Constant};
use indexmap::IndexMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Storage behind a hash value. Insertion order is kept so printing is stable.
pub type HashPairs = IndexMap<HashKey, HashPair>;

/// Runtime value in the Monkey language.
///
/// Scalars are stored inline. Arrays and hashes are shared and mutable: two
/// values that came from the same literal alias the same storage, so an index
/// assignment through one is visible through the other.
#[derive(Clone)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Nil,
    String(Rc<str>),
    Array(Rc<RefCell<Vec<Value>>>),
    Hash(Rc<RefCell<HashPairs>>),

    /// A function body straight from the constant pool, before it is wrapped
    /// into a closure.
    CompiledFunction(Rc<CompiledFunction>),

    /// A compiled function together with the values it captured.
    Closure(Rc<Closure>),

    Builtin(&'static Builtin),

    /// A function of the tree-walking evaluator, closing over its environment.
    Function(Rc<Function>),

    /// An in-language error, produced by builtins. It is an ordinary value and
    /// does not stop execution.
    Error(Rc<str>),
}

#[derive(Debug)]
pub struct Closure {
    pub function: Rc<CompiledFunction>,
    pub free: Vec<Value>,
}

pub struct Function {
    /// Set when the literal was bound by `let` or assignment; the body can
    /// call itself through this name.
    pub name: Option<String>,
    pub parameters: Vec<String>,
    pub body: BlockStatement,
    pub env: Rc<RefCell<Environment>>,
}

impl fmt::Debug for Function {
    // The environment usually contains the function itself.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}

/// Identity of a hashable value. Two values with equal keys address the same
/// hash slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HashKey {
    Integer(i64),
    /// Bit pattern of the float.
    Float(u64),
    Boolean(bool),
    Nil,
    String(Rc<str>),
}

/// A stored hash entry. The original key is kept so it can be printed.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

impl Value {
    pub fn error(message: impl Into<String>) -> Value {
        Value::Error(message.into().into())
    }

    pub fn string(s: &str) -> Value {
        Value::String(s.into())
    }

    pub fn array(elements: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(elements)))
    }

    pub fn hash(pairs: HashPairs) -> Value {
        Value::Hash(Rc::new(RefCell::new(pairs)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "Integer",
            Value::Float(_) => "Float",
            Value::Boolean(_) => "Boolean",
            Value::Nil => "Nil",
            Value::String(_) => "String",
            Value::Array(_) => "Array",
            Value::Hash(_) => "Hash",
            Value::CompiledFunction(_) => "CompiledFunction",
            Value::Closure(_) => "Closure",
            Value::Builtin(_) => "Builtin",
            Value::Function(_) => "Function",
            Value::Error(_) => "Error",
        }
    }

    /// Booleans are themselves, nil is false, everything else is true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(b) => *b,
            Value::Nil => false,
            _ => true,
        }
    }

    /// `None` when the value cannot be used as a hash key.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(n) => Some(HashKey::Integer(*n)),
            Value::Float(x) => Some(HashKey::Float(x.to_bits())),
            Value::Boolean(b) => Some(HashKey::Boolean(*b)),
            Value::Nil => Some(HashKey::Nil),
            Value::String(s) => Some(HashKey::String(Rc::clone(s))),
            _ => None,
        }
    }

    /// Equality as seen by `==` and `!=` for operands that are not numbers.
    ///
    /// Booleans, nil and strings compare by value; containers and callables
    /// compare by identity; values of different kinds are never equal.
    pub fn identical(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => std::ptr::eq(*a, *b),
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            (Value::Error(a), Value::Error(b)) => a == b,
            _ => false,
        }
    }
}

impl From<&Constant> for Value {
    fn from(constant: &Constant) -> Self {
        match constant {
            Constant::Integer(n) => Value::Integer(*n),
            Constant::Float(x) => Value::Float(*x),
            Constant::String(s) => Value::String(Rc::clone(s)),
            Constant::Function(function) => Value::CompiledFunction(Rc::clone(function)),
        }
    }
}

/// Structural equality, used by tests and host code. Arrays and hashes are
/// compared by content here, unlike the language's `==`.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Hash(a), Value::Hash(b)) => Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::CompiledFunction(a), Value::CompiledFunction(b)) => a == b,
            _ => self.identical(other),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Error(message) => write!(f, "Error({:?})", message),
            Value::CompiledFunction(function) => write!(f, "{:?}", function),
            Value::Closure(closure) => write!(f, "{:?}", closure),
            Value::Function(function) => write!(f, "{:?}", function),
            other => write!(f, "{}({})", other.type_name(), other),
        }
    }
}

impl fmt::Display for Value {
    /// Format a value the way `puts` and the REPL show it.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "nil"),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(elements) => {
                write!(f, "[")?;
                for (i, element) in elements.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, "]")
            }
            Value::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, pair) in pairs.borrow().values().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", pair.key, pair.value)?;
                }
                write!(f, "}}")
            }
            Value::CompiledFunction(function) => {
                write!(f, "CompiledFunction[{:p}]", Rc::as_ptr(function))
            }
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Rc::as_ptr(closure)),
            Value::Builtin(_) => write!(f, "builtin function"),
            Value::Function(function) => {
                write!(f, "fn({}) {}", function.parameters.join(", "), function.body)
            }
            Value::Error(message) => write!(f, "Error: {}", message),
        }
    }
}
