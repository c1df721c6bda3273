use crate::bytecode::op::Opcode;
use crate::lang::builtins;
use crate::lang::environment::Environment;
use crate::lang::node::{BlockStatement, Expression, Statement};
use crate::lang::program::Program;
use crate::lang::value::{Function, Value};
use crate::runtime::ops;
use crate::runtime::runtime_error::RuntimeError;
use crate::runtime::vm_bc::MAX_FRAMES;
use std::cell::RefCell;
use std::rc::Rc;

/// Why evaluation of a subtree stopped early.
enum Unwind {
    Return(Value),
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(err: RuntimeError) -> Self {
        Unwind::Error(err)
    }
}

type Eval = Result<Value, Unwind>;

/// Tree-walking evaluator.
///
/// Runs a `Program` straight off the syntax tree with the same operator,
/// indexing and builtin behaviour as the VM. Top-level bindings live in an
/// environment that persists across `eval_program` calls, so one evaluator
/// can serve a whole REPL session.
///
/// Functions close over their defining environment by reference, whereas VM
/// closures copy captured values when they are created.
pub struct Evaluator {
    env: Rc<RefCell<Environment>>,
    depth: usize,
    max_frames: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::with_max_frames(MAX_FRAMES)
    }

    /// Limits call nesting the way `VmConfig::max_frames` does: the top level
    /// counts as the first frame.
    pub fn with_max_frames(max_frames: usize) -> Self {
        Evaluator {
            env: Environment::new(),
            depth: 0,
            max_frames,
        }
    }

    /// Evaluates every statement and returns the value of the last
    /// expression statement, or the value of a top-level `return`.
    pub fn eval_program(&mut self, program: &Program) -> Result<Value, RuntimeError> {
        self.depth = 0;
        let env = Rc::clone(&self.env);
        let mut last = Value::Nil;

        for statement in &program.statements {
            match self.eval_statement(statement, &env) {
                Ok(value) => {
                    if matches!(statement, Statement::Expression(_)) {
                        last = value;
                    }
                }
                Err(Unwind::Return(value)) => return Ok(value),
                Err(Unwind::Error(err)) => return Err(err),
            }
        }

        Ok(last)
    }

    // Statements

    fn eval_statement(&mut self, statement: &Statement, env: &Rc<RefCell<Environment>>) -> Eval {
        match statement {
            Statement::Let { name, value } => {
                let value = self.eval_expression(value, env)?;
                env.borrow_mut().set(name, value);
                Ok(Value::Nil)
            }

            Statement::Assign { target, value } => {
                self.eval_assignment(target, value, env)?;
                Ok(Value::Nil)
            }

            Statement::Return(value) => {
                let value = self.eval_expression(value, env)?;
                Err(Unwind::Return(value))
            }

            Statement::Expression(expression) => self.eval_expression(expression, env),

            Statement::Block(block) => self.eval_block(block, env),
        }
    }

    /// A block's value is the value of its last statement when that is an
    /// expression statement, otherwise nil.
    fn eval_block(&mut self, block: &BlockStatement, env: &Rc<RefCell<Environment>>) -> Eval {
        let mut value = Value::Nil;
        for statement in &block.statements {
            value = self.eval_statement(statement, env)?;
        }
        Ok(value)
    }

    fn eval_assignment(
        &mut self,
        target: &Expression,
        value: &Expression,
        env: &Rc<RefCell<Environment>>,
    ) -> Result<(), Unwind> {
        match target {
            // Binds in the current environment; an outer binding of the same
            // name is shadowed, not overwritten.
            Expression::Identifier(name) => {
                let value = self.eval_expression(value, env)?;
                env.borrow_mut().set(name, value);
                Ok(())
            }

            Expression::Index { left, index } => {
                let left = self.eval_expression(left, env)?;
                let index = self.eval_expression(index, env)?;
                let value = self.eval_expression(value, env)?;
                ops::set_index(&left, &index, value)?;
                Ok(())
            }

            other => Err(RuntimeError::InvalidAssignmentTarget(other.to_string()).into()),
        }
    }

    // Expressions

    fn eval_expression(&mut self, expression: &Expression, env: &Rc<RefCell<Environment>>) -> Eval {
        match expression {
            Expression::Identifier(name) => {
                if let Some(value) = env.borrow().get(name) {
                    return Ok(value);
                }
                builtins::lookup(name)
                    .map(Value::Builtin)
                    .ok_or_else(|| RuntimeError::UndefinedVariable(name.clone()).into())
            }

            Expression::Integer(n) => Ok(Value::Integer(*n)),
            Expression::Float(x) => Ok(Value::Float(*x)),
            Expression::String(s) => Ok(Value::string(s)),
            Expression::Boolean(b) => Ok(Value::Boolean(*b)),
            Expression::Nil => Ok(Value::Nil),

            Expression::Array(elements) => {
                let elements = self.eval_expressions(elements, env)?;
                Ok(Value::array(elements))
            }

            Expression::Hash(pairs) => {
                // Same key order as the compiler, so duplicate keys resolve
                // identically.
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                sorted.sort_by_cached_key(|(key, _)| key.to_string());

                let mut items = Vec::with_capacity(pairs.len() * 2);
                for (key, value) in sorted {
                    items.push(self.eval_expression(key, env)?);
                    items.push(self.eval_expression(value, env)?);
                }
                Ok(ops::build_hash(&items)?)
            }

            Expression::Function(literal) => Ok(Value::Function(Rc::new(Function {
                name: literal.name.clone(),
                parameters: literal.parameters.clone(),
                body: literal.body.clone(),
                env: Rc::clone(env),
            }))),

            Expression::Prefix { operator, right } => {
                let right = self.eval_expression(right, env)?;
                match operator.as_str() {
                    "-" => Ok(ops::negate(&right)?),
                    "!" => Ok(ops::bang(&right)),
                    other => Err(RuntimeError::UnknownOperator(other.to_string()).into()),
                }
            }

            Expression::Infix {
                operator,
                left,
                right,
            } => self.eval_infix(operator, left, right, env),

            Expression::Index { left, index } => {
                let left = self.eval_expression(left, env)?;
                let index = self.eval_expression(index, env)?;
                Ok(ops::get_index(&left, &index)?)
            }

            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                let condition = self.eval_expression(condition, env)?;
                if condition.is_truthy() {
                    self.eval_block(consequence, env)
                } else if let Some(alternative) = alternative {
                    self.eval_block(alternative, env)
                } else {
                    Ok(Value::Nil)
                }
            }

            Expression::Call {
                function,
                arguments,
            } => {
                let callee = self.eval_expression(function, env)?;
                let arguments = self.eval_expressions(arguments, env)?;
                Ok(self.apply(callee, arguments)?)
            }
        }
    }

    fn eval_expressions(
        &mut self,
        expressions: &[Expression],
        env: &Rc<RefCell<Environment>>,
    ) -> Result<Vec<Value>, Unwind> {
        expressions
            .iter()
            .map(|expression| self.eval_expression(expression, env))
            .collect()
    }

    fn eval_infix(
        &mut self,
        operator: &str,
        left: &Expression,
        right: &Expression,
        env: &Rc<RefCell<Environment>>,
    ) -> Eval {
        // `<` and `<=` are `>` and `>=` with the operands swapped, evaluated
        // right side first.
        if let Some(op) = match operator {
            "<" => Some(Opcode::GreaterThan),
            "<=" => Some(Opcode::GreaterThanOrEqual),
            _ => None,
        } {
            let right = self.eval_expression(right, env)?;
            let left = self.eval_expression(left, env)?;
            return Ok(ops::compare(op, &right, &left)?);
        }

        let left = self.eval_expression(left, env)?;
        let right = self.eval_expression(right, env)?;

        let result = match operator {
            "+" => ops::arithmetic(Opcode::Add, &left, &right)?,
            "-" => ops::arithmetic(Opcode::Sub, &left, &right)?,
            "*" => ops::arithmetic(Opcode::Mul, &left, &right)?,
            "/" => ops::arithmetic(Opcode::Div, &left, &right)?,
            "==" => ops::compare(Opcode::Equal, &left, &right)?,
            "!=" => ops::compare(Opcode::NotEqual, &left, &right)?,
            ">" => ops::compare(Opcode::GreaterThan, &left, &right)?,
            ">=" => ops::compare(Opcode::GreaterThanOrEqual, &left, &right)?,
            "&&" => ops::logical(Opcode::And, left, right),
            "||" => ops::logical(Opcode::Or, left, right),
            other => return Err(RuntimeError::UnknownOperator(other.to_string()).into()),
        };
        Ok(result)
    }

    // Calls

    fn apply(&mut self, callee: Value, arguments: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::Function(function) => self.call_function(function, arguments),
            Value::Builtin(builtin) => Ok((builtin.func)(&arguments)),
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    fn call_function(
        &mut self,
        function: Rc<Function>,
        arguments: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        if arguments.len() != function.parameters.len() {
            return Err(RuntimeError::WrongArgumentCount {
                want: function.parameters.len(),
                got: arguments.len(),
            });
        }
        if self.depth + 1 >= self.max_frames {
            return Err(RuntimeError::FrameOverflow(self.max_frames));
        }

        let env = Environment::enclosed(Rc::clone(&function.env));
        {
            let mut scope = env.borrow_mut();
            if let Some(name) = &function.name {
                scope.set(name, Value::Function(Rc::clone(&function)));
            }
            for (parameter, argument) in function.parameters.iter().zip(arguments) {
                scope.set(parameter, argument);
            }
        }

        self.depth += 1;
        let result = self.eval_block(&function.body, &env);
        self.depth -= 1;

        match result {
            Ok(value) | Err(Unwind::Return(value)) => Ok(value),
            Err(Unwind::Error(err)) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parse;
    use indoc::indoc;

    // ============================================================
    // Helpers
    // ============================================================

    fn eval_with(evaluator: &mut Evaluator, source: &str) -> Result<Value, RuntimeError> {
        let program = parse(source).unwrap();
        evaluator.eval_program(&program)
    }

    fn eval(source: &str) -> Value {
        match eval_with(&mut Evaluator::new(), source) {
            Ok(value) => value,
            Err(err) => panic!("eval error for {:?}: {}", source, err),
        }
    }

    fn eval_err(source: &str) -> RuntimeError {
        eval_with(&mut Evaluator::new(), source).unwrap_err()
    }

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    // ============================================================
    // Expressions
    // ============================================================

    #[test]
    fn test_arithmetic_matches_vm_rules() {
        let cases = [
            ("5 + 5 * 2", int(15)),
            ("50 / 2 * 2 + 10 - 5", Value::Float(55.0)),
            ("-(3 - 10)", int(7)),
            (r#""mon" + "key""#, Value::string("monkey")),
        ];
        for (source, expected) in cases {
            assert_eq!(eval(source), expected, "source: {}", source);
        }
    }

    #[test]
    fn test_comparisons_and_logic() {
        let cases = [
            ("1 < 2", Value::Boolean(true)),
            ("2 <= 1", Value::Boolean(false)),
            ("1 == 1.0", Value::Boolean(true)),
            ("[1] == [1]", Value::Boolean(false)),
            ("1 && 2", int(2)),
            ("nil || 3", int(3)),
            ("!(if (false) { 5 })", Value::Boolean(true)),
        ];
        for (source, expected) in cases {
            assert_eq!(eval(source), expected, "source: {}", source);
        }
    }

    #[test]
    fn test_block_values() {
        assert_eq!(eval("if (true) { 1; 2 }"), int(2));
        assert_eq!(eval("if (true) { let x = 1; }"), Value::Nil);
        assert_eq!(eval("if (false) { 1 }"), Value::Nil);
    }

    #[test]
    fn test_hashes_and_arrays() {
        assert_eq!(eval(r#"{"a": 1, "b": 2}["b"]"#), int(2));
        assert_eq!(eval("[1, 2, 3][5]"), Value::Nil);
        assert_eq!(eval("let a = [1, 2]; let b = a; b[1] = 7; a[1]"), int(7));
        assert_eq!(
            eval_err("let a = [1]; a[3] = 1"),
            RuntimeError::ArrayIndexOutOfRange(3)
        );
    }

    // ============================================================
    // Functions
    // ============================================================

    #[test]
    fn test_functions_and_closures() {
        let source = indoc! {"
            let newAdder = fn(a, b) { fn(c) { a + b + c }; };
            let adder = newAdder(1, 2);
            adder(8);
        "};
        assert_eq!(eval(source), int(11));
    }

    #[test]
    fn test_return_unwinds_to_call() {
        assert_eq!(
            eval("let f = fn(x) { if (x > 0) { return 1; } 2 }; f(5) + f(0)"),
            int(3)
        );
        assert_eq!(eval("return 4; 5"), int(4));
    }

    #[test]
    fn test_named_function_recursion() {
        let source = indoc! {"
            let wrapper = fn() {
                let countDown = fn(x) {
                    if (x == 0) { return 0; } else { countDown(x - 1); }
                };
                countDown(3);
            };
            wrapper();
        "};
        assert_eq!(eval(source), int(0));
    }

    #[test]
    fn test_assignment_shadows_inside_functions() {
        assert_eq!(
            eval("len = 1; push = fn() { len = 2; len; }(); len + push;"),
            int(3)
        );
        assert_eq!(eval("let a = 1; let f = fn() { a = 5; a }; f() + a"), int(6));
    }

    #[test]
    fn test_builtins_resolve_by_name() {
        assert_eq!(eval("len([1, 2])"), int(2));
        assert_eq!(
            eval("first(1)"),
            Value::error("argument to `first` must be Array, got Integer")
        );
    }

    // ============================================================
    // Errors
    // ============================================================

    #[test]
    fn test_runtime_errors() {
        assert_eq!(eval_err("foo"), RuntimeError::UndefinedVariable("foo".into()));
        assert_eq!(
            eval_err("fn() { 1; }(1);"),
            RuntimeError::WrongArgumentCount { want: 0, got: 1 }
        );
        assert_eq!(eval_err("5()"), RuntimeError::NotCallable("Integer"));
        assert_eq!(eval_err("-true"), RuntimeError::UnsupportedNegation("Boolean"));
        assert_eq!(
            eval_err("1 = 2"),
            RuntimeError::InvalidAssignmentTarget("1".into())
        );
    }

    #[test]
    fn test_frame_limit() {
        let mut evaluator = Evaluator::with_max_frames(32);
        assert_eq!(
            eval_with(&mut evaluator, "let f = fn() { f() }; f()"),
            Err(RuntimeError::FrameOverflow(32))
        );
    }

    #[test]
    fn test_bindings_persist_between_programs() {
        let mut evaluator = Evaluator::new();
        eval_with(&mut evaluator, "let a = 2;").unwrap();
        assert_eq!(eval_with(&mut evaluator, "a * 21"), Ok(int(42)));
    }
}
