use super::value::Value;

pub type BuiltinFn = fn(&[Value]) -> Value;

/// A host function callable from Monkey code.
///
/// Builtins report misuse by returning `Value::Error`, which is an ordinary
/// in-language value; they never abort execution.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

/// The builtin table. The position of each entry is its index in
/// `GET_BUILTIN` instructions, so entries may only be appended.
pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "len",
        func: len,
    },
    Builtin {
        name: "puts",
        func: puts,
    },
    Builtin {
        name: "first",
        func: first,
    },
    Builtin {
        name: "last",
        func: last,
    },
    Builtin {
        name: "rest",
        func: rest,
    },
    Builtin {
        name: "push",
        func: push,
    },
];

pub fn lookup(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|builtin| builtin.name == name)
}

fn wrong_arity(want: usize, got: usize) -> Value {
    Value::error(format!(
        "wrong number of arguments. want={}, got={}",
        want, got
    ))
}

fn len(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arity(1, args.len());
    }

    match &args[0] {
        Value::String(s) => Value::Integer(s.len() as i64),
        Value::Array(elements) => Value::Integer(elements.borrow().len() as i64),
        other => Value::error(format!(
            "argument to `len` not supported, got {}",
            other.type_name()
        )),
    }
}

fn puts(args: &[Value]) -> Value {
    for arg in args {
        println!("{}", arg);
    }
    Value::Nil
}

fn first(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arity(1, args.len());
    }

    match &args[0] {
        Value::Array(elements) => elements.borrow().first().cloned().unwrap_or(Value::Nil),
        other => Value::error(format!(
            "argument to `first` must be Array, got {}",
            other.type_name()
        )),
    }
}

fn last(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arity(1, args.len());
    }

    match &args[0] {
        Value::Array(elements) => elements.borrow().last().cloned().unwrap_or(Value::Nil),
        other => Value::error(format!(
            "argument to `last` must be Array, got {}",
            other.type_name()
        )),
    }
}

fn rest(args: &[Value]) -> Value {
    if args.len() != 1 {
        return wrong_arity(1, args.len());
    }

    match &args[0] {
        Value::Array(elements) => {
            let elements = elements.borrow();
            if elements.is_empty() {
                Value::Nil
            } else {
                Value::array(elements[1..].to_vec())
            }
        }
        other => Value::error(format!(
            "argument to `rest` must be Array, got {}",
            other.type_name()
        )),
    }
}

fn push(args: &[Value]) -> Value {
    if args.len() != 2 {
        return wrong_arity(2, args.len());
    }

    match &args[0] {
        Value::Array(elements) => {
            let mut pushed = elements.borrow().clone();
            pushed.push(args[1].clone());
            Value::array(pushed)
        }
        other => Value::error(format!(
            "first argument to `push` must be Array, got {}",
            other.type_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Value {
        let builtin = lookup(name).unwrap();
        (builtin.func)(&args)
    }

    fn ints(values: &[i64]) -> Value {
        Value::array(values.iter().copied().map(Value::Integer).collect())
    }

    #[test]
    fn test_table_order() {
        let names: Vec<_> = BUILTINS.iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["len", "puts", "first", "last", "rest", "push"]);
    }

    #[test]
    fn test_len() {
        assert_eq!(call("len", vec![Value::string("")]), Value::Integer(0));
        assert_eq!(call("len", vec![Value::string("four")]), Value::Integer(4));
        assert_eq!(call("len", vec![ints(&[1, 2, 3])]), Value::Integer(3));
        assert_eq!(
            call("len", vec![Value::Integer(1)]),
            Value::error("argument to `len` not supported, got Integer")
        );
        assert_eq!(
            call("len", vec![Value::string("one"), Value::string("two")]),
            Value::error("wrong number of arguments. want=1, got=2")
        );
    }

    #[test]
    fn test_first_last_rest() {
        assert_eq!(call("first", vec![ints(&[1, 2, 3])]), Value::Integer(1));
        assert_eq!(call("first", vec![ints(&[])]), Value::Nil);
        assert_eq!(
            call("first", vec![Value::Integer(1)]),
            Value::error("argument to `first` must be Array, got Integer")
        );
        assert_eq!(call("last", vec![ints(&[1, 2, 3])]), Value::Integer(3));
        assert_eq!(call("last", vec![ints(&[])]), Value::Nil);
        assert_eq!(call("rest", vec![ints(&[1, 2, 3])]), ints(&[2, 3]));
        assert_eq!(call("rest", vec![ints(&[])]), Value::Nil);
    }

    #[test]
    fn test_push_does_not_mutate_its_argument() {
        let original = ints(&[1]);
        assert_eq!(
            call("push", vec![original.clone(), Value::Integer(2)]),
            ints(&[1, 2])
        );
        assert_eq!(original, ints(&[1]));
        assert_eq!(
            call("push", vec![Value::Integer(1), Value::Integer(1)]),
            Value::error("first argument to `push` must be Array, got Integer")
        );
    }

    #[test]
    fn test_puts_returns_nil() {
        assert_eq!(call("puts", vec![Value::string("hello")]), Value::Nil);
    }
}
