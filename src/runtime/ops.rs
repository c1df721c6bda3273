//! Operator semantics shared by both engines.
//!
//! The VM dispatches here by opcode; the tree-walking evaluator maps its
//! operator strings onto the same opcodes so the two cannot drift apart.

use crate::bytecode::op::Opcode;
use crate::lang::value::{HashPair, HashPairs, Value};
use crate::runtime::runtime_error::RuntimeError;

/// Source spelling of an operator opcode, for error messages.
pub fn symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::Add => "+",
        Opcode::Sub => "-",
        Opcode::Mul => "*",
        Opcode::Div => "/",
        Opcode::Equal => "==",
        Opcode::NotEqual => "!=",
        Opcode::GreaterThan => ">",
        Opcode::GreaterThanOrEqual => ">=",
        Opcode::And => "&&",
        Opcode::Or => "||",
        Opcode::Minus => "-",
        Opcode::Bang => "!",
        other => other.name(),
    }
}

fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(n) => Some(*n as f64),
        Value::Float(x) => Some(*x),
        _ => None,
    }
}

/// `+ - * /`.
///
/// Division, or a float on either side, computes in floating point. Two
/// integers otherwise stay integers and wrap on overflow. Strings only
/// support `+`.
pub fn arithmetic(op: Opcode, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let unsupported = || RuntimeError::UnsupportedBinaryOperation {
        operator: symbol(op).to_string(),
        left: left.type_name(),
        right: right.type_name(),
    };

    let float_required = op == Opcode::Div
        || matches!(left, Value::Float(_))
        || matches!(right, Value::Float(_));

    if float_required {
        let (Some(l), Some(r)) = (as_float(left), as_float(right)) else {
            return Err(unsupported());
        };
        let result = match op {
            Opcode::Add => l + r,
            Opcode::Sub => l - r,
            Opcode::Mul => l * r,
            Opcode::Div => l / r,
            _ => return Err(unsupported()),
        };
        return Ok(Value::Float(result));
    }

    match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => {
            let result = match op {
                Opcode::Add => l.wrapping_add(*r),
                Opcode::Sub => l.wrapping_sub(*r),
                Opcode::Mul => l.wrapping_mul(*r),
                _ => return Err(unsupported()),
            };
            Ok(Value::Integer(result))
        }
        (Value::String(l), Value::String(r)) if op == Opcode::Add => {
            Ok(Value::String(format!("{}{}", l, r).into()))
        }
        _ => Err(unsupported()),
    }
}

/// `== != > >=`. (`<` and `<=` arrive with their operands swapped.)
///
/// Numbers compare numerically, mixing integers and floats freely. A float
/// only compares with another number. Any other pair only supports equality,
/// which follows `Value::identical`.
pub fn compare(op: Opcode, left: &Value, right: &Value) -> Result<Value, RuntimeError> {
    let has_float = matches!(left, Value::Float(_)) || matches!(right, Value::Float(_));
    if has_float && (as_float(left).is_none() || as_float(right).is_none()) {
        return Err(unknown_comparison(op, left, right));
    }

    let numeric = match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => Some(match op {
            Opcode::Equal => l == r,
            Opcode::NotEqual => l != r,
            Opcode::GreaterThan => l > r,
            Opcode::GreaterThanOrEqual => l >= r,
            _ => return Err(unknown_comparison(op, left, right)),
        }),
        _ => match (as_float(left), as_float(right)) {
            (Some(l), Some(r)) => Some(match op {
                Opcode::Equal => l == r,
                Opcode::NotEqual => l != r,
                Opcode::GreaterThan => l > r,
                Opcode::GreaterThanOrEqual => l >= r,
                _ => return Err(unknown_comparison(op, left, right)),
            }),
            _ => None,
        },
    };

    let result = match numeric {
        Some(result) => result,
        None => match op {
            Opcode::Equal => left.identical(right),
            Opcode::NotEqual => !left.identical(right),
            _ => return Err(unknown_comparison(op, left, right)),
        },
    };

    Ok(Value::Boolean(result))
}

fn unknown_comparison(op: Opcode, left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::UnknownComparison {
        operator: symbol(op).to_string(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

/// `&&` and `||`. Both operands are already evaluated; the result is one of
/// them, picked by the truthiness of `left`.
pub fn logical(op: Opcode, left: Value, right: Value) -> Value {
    let pick_left = match op {
        Opcode::Or => left.is_truthy(),
        _ => !left.is_truthy(),
    };
    if pick_left { left } else { right }
}

pub fn negate(value: &Value) -> Result<Value, RuntimeError> {
    match value {
        Value::Integer(n) => Ok(Value::Integer(n.wrapping_neg())),
        Value::Float(x) => Ok(Value::Float(-x)),
        other => Err(RuntimeError::UnsupportedNegation(other.type_name())),
    }
}

pub fn bang(value: &Value) -> Value {
    Value::Boolean(!value.is_truthy())
}

/// `left[index]`. Out-of-range array reads and missing hash keys are nil.
pub fn get_index(left: &Value, index: &Value) -> Result<Value, RuntimeError> {
    match (left, index) {
        (Value::Array(elements), Value::Integer(i)) => {
            let elements = elements.borrow();
            let element = usize::try_from(*i)
                .ok()
                .and_then(|i| elements.get(i))
                .cloned();
            Ok(element.unwrap_or(Value::Nil))
        }
        (Value::Hash(pairs), key) => {
            let key = key
                .hash_key()
                .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
            Ok(pairs
                .borrow()
                .get(&key)
                .map(|pair| pair.value.clone())
                .unwrap_or(Value::Nil))
        }
        (other, _) => Err(RuntimeError::IndexNotSupported(other.type_name())),
    }
}

/// `left[index] = value`. Unlike reads, writing outside an array is an
/// error.
pub fn set_index(left: &Value, index: &Value, value: Value) -> Result<(), RuntimeError> {
    match (left, index) {
        (Value::Array(elements), Value::Integer(i)) => {
            let mut elements = elements.borrow_mut();
            let slot = usize::try_from(*i)
                .ok()
                .and_then(|i| elements.get_mut(i))
                .ok_or(RuntimeError::ArrayIndexOutOfRange(*i))?;
            *slot = value;
            Ok(())
        }
        (Value::Hash(pairs), key) => {
            let hash_key = key
                .hash_key()
                .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
            pairs.borrow_mut().insert(
                hash_key,
                HashPair {
                    key: key.clone(),
                    value,
                },
            );
            Ok(())
        }
        (other, _) => Err(RuntimeError::IndexNotSupported(other.type_name())),
    }
}

/// Builds a hash from alternating keys and values. Later duplicates win.
pub fn build_hash(items: &[Value]) -> Result<Value, RuntimeError> {
    let mut pairs = HashPairs::with_capacity(items.len() / 2);
    for chunk in items.chunks(2) {
        let [key, value] = chunk else {
            break;
        };
        let hash_key = key
            .hash_key()
            .ok_or(RuntimeError::UnusableHashKey(key.type_name()))?;
        pairs.insert(
            hash_key,
            HashPair {
                key: key.clone(),
                value: value.clone(),
            },
        );
    }
    Ok(Value::hash(pairs))
}
