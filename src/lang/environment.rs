use super::value::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Name bindings of one function activation (or of the top level), linked to
/// the environment the function was defined in.
#[derive(Debug, Default)]
pub struct Environment {
    store: HashMap<String, Value>,
    outer: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment::default()))
    }

    pub fn enclosed(outer: Rc<RefCell<Environment>>) -> Rc<RefCell<Environment>> {
        Rc::new(RefCell::new(Environment {
            store: HashMap::new(),
            outer: Some(outer),
        }))
    }

    /// Looks `name` up here and then outwards.
    pub fn get(&self, name: &str) -> Option<Value> {
        match self.store.get(name) {
            Some(value) => Some(value.clone()),
            None => self.outer.as_ref()?.borrow().get(name),
        }
    }

    pub fn contains_local(&self, name: &str) -> bool {
        self.store.contains_key(name)
    }

    pub fn set(&mut self, name: &str, value: Value) {
        self.store.insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_bindings_shadow_outer() {
        let outer = Environment::new();
        outer.borrow_mut().set("a", Value::Integer(1));
        outer.borrow_mut().set("b", Value::Integer(2));

        let inner = Environment::enclosed(Rc::clone(&outer));
        inner.borrow_mut().set("a", Value::Integer(10));

        assert_eq!(inner.borrow().get("a"), Some(Value::Integer(10)));
        assert_eq!(inner.borrow().get("b"), Some(Value::Integer(2)));
        assert_eq!(outer.borrow().get("a"), Some(Value::Integer(1)));
        assert!(!inner.borrow().contains_local("b"));
        assert_eq!(inner.borrow().get("c"), None);
    }
}
