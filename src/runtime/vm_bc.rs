use crate::bytecode::ir::{Bytecode, CompiledFunction};
use crate::bytecode::op::{Opcode, read_u8, read_u16};
use crate::lang::builtins::{BUILTINS, Builtin};
use crate::lang::value::{Closure, Value};
use crate::runtime::frame::Frame;
use crate::runtime::ops;
use crate::runtime::runtime_error::RuntimeError;
use std::rc::Rc;

pub const STACK_SIZE: usize = 2048;
pub const GLOBALS_SIZE: usize = 65536;
pub const MAX_FRAMES: usize = 1024;

#[derive(Debug, Clone)]
pub struct VmConfig {
    pub stack_size: usize,
    pub max_frames: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            stack_size: STACK_SIZE,
            max_frames: MAX_FRAMES,
        }
    }
}

/// Stack machine executing compiled bytecode.
///
/// The operand stack is preallocated and never shrinks; `sp` points at the
/// next free slot, so the slot at `sp` still holds the most recently popped
/// value. Locals of a call live on the same stack, starting at the frame's
/// base pointer.
pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
    builtins: &'static [Builtin],
    config: VmConfig,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, vec![Value::Nil; GLOBALS_SIZE])
    }

    /// Runs `bytecode` against globals left behind by an earlier VM.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        Self::with_config(bytecode, globals, VmConfig::default(), BUILTINS)
    }

    pub fn with_config(
        bytecode: Bytecode,
        mut globals: Vec<Value>,
        config: VmConfig,
        builtins: &'static [Builtin],
    ) -> Self {
        if globals.len() < GLOBALS_SIZE {
            globals.resize(GLOBALS_SIZE, Value::Nil);
        }

        let main = CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        };
        let main = Closure {
            function: Rc::new(main),
            free: Vec::new(),
        };

        let mut frames = Vec::with_capacity(config.max_frames.min(64));
        frames.push(Frame::new(Rc::new(main), 0));

        Vm {
            constants: bytecode.constants.iter().map(Value::from).collect(),
            stack: vec![Value::Nil; config.stack_size],
            sp: 0,
            globals,
            frames,
            builtins,
            config,
        }
    }

    /// The value most recently popped off the stack: the result of the last
    /// top-level expression statement.
    pub fn last_popped_stack_elem(&self) -> Value {
        self.stack.get(self.sp).cloned().unwrap_or(Value::Nil)
    }

    pub fn globals(&self) -> &[Value] {
        &self.globals
    }

    /// Hands the globals back so the next VM of a session can continue with
    /// them.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    // Execution

    pub fn run(&mut self) -> Result<(), RuntimeError> {
        log::debug!(
            "vm: run start, {} constants, {} bytes of main code",
            self.constants.len(),
            self.frames
                .first()
                .map(|frame| frame.instructions().len())
                .unwrap_or(0)
        );

        while let Some(frame) = self.frames.last() {
            let ip = frame.ip;
            let function = Rc::clone(&frame.closure.function);
            let code = function.instructions.as_bytes();

            if ip >= code.len() {
                if self.frames.len() == 1 {
                    break;
                }
                self.return_from_call(Value::Nil)?;
                continue;
            }

            let op = Opcode::try_from(code[ip])
                .map_err(|byte| RuntimeError::UndefinedOpcode { byte, offset: ip })?;
            let width = op.definition().operand_bytes();
            let operands =
                code.get(ip + 1..ip + 1 + width)
                    .ok_or(RuntimeError::TruncatedInstruction {
                        opcode: op.name(),
                        offset: ip,
                    })?;
            self.set_ip(ip + 1 + width);

            match op {
                Opcode::Constant => {
                    let index = read_u16(operands) as usize;
                    let constant = self
                        .constants
                        .get(index)
                        .cloned()
                        .ok_or(RuntimeError::UndefinedConstant(index))?;
                    self.push(constant)?;
                }

                Opcode::Pop => {
                    self.pop();
                }

                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                    let right = self.pop();
                    let left = self.pop();
                    self.push(ops::arithmetic(op, &left, &right)?)?;
                }

                Opcode::True => self.push(Value::Boolean(true))?,
                Opcode::False => self.push(Value::Boolean(false))?,
                Opcode::Nil => self.push(Value::Nil)?,

                Opcode::Equal
                | Opcode::NotEqual
                | Opcode::GreaterThan
                | Opcode::GreaterThanOrEqual => {
                    let right = self.pop();
                    let left = self.pop();
                    self.push(ops::compare(op, &left, &right)?)?;
                }

                Opcode::And | Opcode::Or => {
                    let right = self.pop();
                    let left = self.pop();
                    self.push(ops::logical(op, left, right))?;
                }

                Opcode::Minus => {
                    let operand = self.pop();
                    self.push(ops::negate(&operand)?)?;
                }

                Opcode::Bang => {
                    let operand = self.pop();
                    self.push(ops::bang(&operand))?;
                }

                Opcode::JumpNotTruthy => {
                    let target = read_u16(operands) as usize;
                    if !self.pop().is_truthy() {
                        self.set_ip(target);
                    }
                }

                Opcode::Jump => {
                    let target = read_u16(operands) as usize;
                    self.set_ip(target);
                }

                Opcode::SetGlobal => {
                    let index = read_u16(operands) as usize;
                    let value = self.pop();
                    self.globals[index] = value;
                }

                Opcode::GetGlobal => {
                    let index = read_u16(operands) as usize;
                    self.push(self.globals[index].clone())?;
                }

                Opcode::Array => {
                    let count = read_u16(operands) as usize;
                    let start = self.stack_start(count)?;
                    let elements = self.stack[start..self.sp].to_vec();
                    self.sp = start;
                    self.push(Value::array(elements))?;
                }

                Opcode::Hash => {
                    let count = read_u16(operands) as usize;
                    let start = self.stack_start(count)?;
                    let hash = ops::build_hash(&self.stack[start..self.sp])?;
                    self.sp = start;
                    self.push(hash)?;
                }

                Opcode::SetIndex => {
                    let value = self.pop();
                    let index = self.pop();
                    let left = self.pop();
                    ops::set_index(&left, &index, value)?;
                }

                Opcode::GetIndex => {
                    let index = self.pop();
                    let left = self.pop();
                    self.push(ops::get_index(&left, &index)?)?;
                }

                Opcode::Call => {
                    let num_args = read_u8(operands) as usize;
                    self.call(num_args)?;
                }

                Opcode::ReturnValue => {
                    let value = self.pop();
                    // A top-level `return` ends the program; the value stays
                    // visible as the last popped element.
                    if self.frames.len() == 1 {
                        break;
                    }
                    self.return_from_call(value)?;
                }

                Opcode::Return => {
                    if self.frames.len() == 1 {
                        break;
                    }
                    self.return_from_call(Value::Nil)?;
                }

                Opcode::SetLocal => {
                    let index = read_u8(operands) as usize;
                    let slot = self.base_pointer() + index;
                    let value = self.pop();
                    *self
                        .stack
                        .get_mut(slot)
                        .ok_or(RuntimeError::StackOverflow)? = value;
                }

                Opcode::GetLocal => {
                    let index = read_u8(operands) as usize;
                    let slot = self.base_pointer() + index;
                    let value = self
                        .stack
                        .get(slot)
                        .cloned()
                        .ok_or(RuntimeError::StackOverflow)?;
                    self.push(value)?;
                }

                Opcode::GetBuiltin => {
                    let index = read_u8(operands) as usize;
                    let builtin = self
                        .builtins
                        .get(index)
                        .ok_or(RuntimeError::UndefinedBuiltin(index))?;
                    self.push(Value::Builtin(builtin))?;
                }

                Opcode::Closure => {
                    let index = read_u16(operands) as usize;
                    let num_free = read_u8(&operands[2..]) as usize;
                    self.push_closure(index, num_free)?;
                }

                Opcode::GetFree => {
                    let index = read_u8(operands) as usize;
                    let closure = self.current_closure();
                    let value = closure
                        .free
                        .get(index)
                        .cloned()
                        .ok_or(RuntimeError::UndefinedFree(index))?;
                    self.push(value)?;
                }

                Opcode::CurrentClosure => {
                    let closure = self.current_closure();
                    self.push(Value::Closure(closure))?;
                }
            }
        }

        log::debug!("vm: run finished, sp={}", self.sp);
        Ok(())
    }

    // Frames

    fn set_ip(&mut self, ip: usize) {
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = ip;
        }
    }

    fn base_pointer(&self) -> usize {
        self.frames
            .last()
            .map(|frame| frame.base_pointer)
            .unwrap_or(0)
    }

    fn current_closure(&self) -> Rc<Closure> {
        match self.frames.last() {
            Some(frame) => Rc::clone(&frame.closure),
            None => Rc::new(Closure {
                function: Rc::new(CompiledFunction::default()),
                free: Vec::new(),
            }),
        }
    }

    fn push_frame(&mut self, frame: Frame) -> Result<(), RuntimeError> {
        if self.frames.len() >= self.config.max_frames {
            return Err(RuntimeError::FrameOverflow(self.config.max_frames));
        }
        log::trace!(
            "vm: push frame {} (bp={})",
            self.frames.len(),
            frame.base_pointer
        );
        self.frames.push(frame);
        Ok(())
    }

    /// Pops the current frame, drops its locals and the callee, and leaves
    /// `value` in the callee's slot.
    fn return_from_call(&mut self, value: Value) -> Result<(), RuntimeError> {
        if let Some(frame) = self.frames.pop() {
            log::trace!("vm: pop frame {}", self.frames.len());
            self.sp = frame.base_pointer.saturating_sub(1);
        }
        self.push(value)
    }

    // Calls

    fn call(&mut self, num_args: usize) -> Result<(), RuntimeError> {
        let callee = self.stack[self.stack_start(num_args + 1)?].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, num_args),
            Value::Builtin(builtin) => self.call_builtin(builtin, num_args),
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Rc<Closure>, num_args: usize) -> Result<(), RuntimeError> {
        let num_parameters = closure.function.num_parameters;
        if num_args != num_parameters {
            return Err(RuntimeError::WrongArgumentCount {
                want: num_parameters,
                got: num_args,
            });
        }

        let base_pointer = self.sp - num_args;
        let sp = base_pointer + closure.function.num_locals;
        if sp > self.config.stack_size {
            return Err(RuntimeError::StackOverflow);
        }

        self.push_frame(Frame::new(closure, base_pointer))?;
        self.sp = sp;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: &Builtin, num_args: usize) -> Result<(), RuntimeError> {
        let args = &self.stack[self.sp - num_args..self.sp];
        let result = (builtin.func)(args);
        self.sp -= num_args + 1;
        self.push(result)
    }

    fn push_closure(&mut self, index: usize, num_free: usize) -> Result<(), RuntimeError> {
        let function = match self.constants.get(index) {
            Some(Value::CompiledFunction(function)) => Rc::clone(function),
            Some(other) => return Err(RuntimeError::NotAFunction(other.to_string())),
            None => return Err(RuntimeError::UndefinedConstant(index)),
        };

        let start = self.stack_start(num_free)?;
        let free = self.stack[start..self.sp].to_vec();
        self.sp = start;

        self.push(Value::Closure(Rc::new(Closure { function, free })))
    }

    // Stack helpers

    fn push(&mut self, value: Value) -> Result<(), RuntimeError> {
        if self.sp >= self.config.stack_size {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    fn pop(&mut self) -> Value {
        self.sp = self.sp.saturating_sub(1);
        self.stack.get(self.sp).cloned().unwrap_or(Value::Nil)
    }

    /// Start of the top `count` stack slots.
    fn stack_start(&self, count: usize) -> Result<usize, RuntimeError> {
        self.sp.checked_sub(count).ok_or(RuntimeError::StackUnderflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::compile::Compiler;
    use crate::bytecode::ir::Constant;
    use crate::bytecode::op::make;
    use crate::frontend::parse;
    use indoc::indoc;

    // ============================================================
    // Helpers
    // ============================================================

    fn compile(source: &str) -> Bytecode {
        let program = parse(source).unwrap();
        let mut compiler = Compiler::new();
        compiler.compile(&program).unwrap();
        compiler.bytecode()
    }

    fn run_with_config(source: &str, config: VmConfig) -> Result<Value, RuntimeError> {
        let mut vm = Vm::with_config(compile(source), Vec::new(), config, BUILTINS);
        vm.run()?;
        Ok(vm.last_popped_stack_elem())
    }

    fn run(source: &str) -> Value {
        match run_with_config(source, VmConfig::default()) {
            Ok(value) => value,
            Err(err) => panic!("vm error for {:?}: {}", source, err),
        }
    }

    fn run_err(source: &str) -> RuntimeError {
        run_with_config(source, VmConfig::default()).unwrap_err()
    }

    fn assert_runs(cases: &[(&str, Value)]) {
        for (source, expected) in cases {
            assert_eq!(&run(source), expected, "source: {}", source);
        }
    }

    fn int(n: i64) -> Value {
        Value::Integer(n)
    }

    fn array(elements: &[i64]) -> Value {
        Value::array(elements.iter().copied().map(Value::Integer).collect())
    }

    // ============================================================
    // Arithmetic and comparison
    // ============================================================

    #[test]
    fn test_integer_arithmetic() {
        assert_runs(&[
            ("1", int(1)),
            ("1 + 2", int(3)),
            ("2 * 2 * 2 * 2", int(16)),
            ("5 * (2 + 10)", int(60)),
            ("-5", int(-5)),
            ("-50 + 100 + -50", int(0)),
            ("3 - 10", int(-7)),
        ]);
    }

    #[test]
    fn test_division_promotes_to_float() {
        assert_runs(&[
            ("4 / 2", Value::Float(2.0)),
            ("50 / 2 * 2 + 10 - 5", Value::Float(55.0)),
            ("7 / 2", Value::Float(3.5)),
            ("1.5 + 1", Value::Float(2.5)),
            ("-2.5", Value::Float(-2.5)),
        ]);
    }

    #[test]
    fn test_boolean_expressions() {
        assert_runs(&[
            ("true", Value::Boolean(true)),
            ("1 < 2", Value::Boolean(true)),
            ("1 > 2", Value::Boolean(false)),
            ("1 <= 1", Value::Boolean(true)),
            ("2 >= 3", Value::Boolean(false)),
            ("1 == 1", Value::Boolean(true)),
            ("1 != 2", Value::Boolean(true)),
            ("1 == 1.0", Value::Boolean(true)),
            ("true == false", Value::Boolean(false)),
            ("(1 < 2) == true", Value::Boolean(true)),
            ("!true", Value::Boolean(false)),
            ("!!5", Value::Boolean(true)),
            ("!nil", Value::Boolean(true)),
            ("!(if (false) { 5 })", Value::Boolean(true)),
            (r#""a" == "a""#, Value::Boolean(true)),
            (r#"1 == "1""#, Value::Boolean(false)),
            ("[1] == [1]", Value::Boolean(false)),
            ("let a = [1]; a == a", Value::Boolean(true)),
        ]);
    }

    #[test]
    fn test_logical_operators_return_operands() {
        assert_runs(&[
            ("1 && 2", int(2)),
            ("false && 2", Value::Boolean(false)),
            ("nil || 3", int(3)),
            ("1 || 2", int(1)),
        ]);
    }

    #[test]
    fn test_float_comparison_with_non_number() {
        assert_eq!(
            run_err(r#"1.5 == "a""#),
            RuntimeError::UnknownComparison {
                operator: "==".to_string(),
                left: "Float",
                right: "String",
            }
        );
        assert_eq!(
            run_err("nil != 1.5"),
            RuntimeError::UnknownComparison {
                operator: "!=".to_string(),
                left: "Nil",
                right: "Float",
            }
        );
        assert!(matches!(
            run_err("2.0 == true"),
            RuntimeError::UnknownComparison { .. }
        ));
        assert_runs(&[(r#"1 == "1""#, Value::Boolean(false))]);
    }

    #[test]
    fn test_type_errors() {
        assert_eq!(
            run_err(r#"1 + "a""#),
            RuntimeError::UnsupportedBinaryOperation {
                operator: "+".to_string(),
                left: "Integer",
                right: "String",
            }
        );
        assert_eq!(
            run_err("-true"),
            RuntimeError::UnsupportedNegation("Boolean")
        );
        assert_eq!(
            run_err(r#""a" < "b""#),
            RuntimeError::UnknownComparison {
                operator: ">".to_string(),
                left: "String",
                right: "String",
            }
        );
    }

    // ============================================================
    // Control flow and bindings
    // ============================================================

    #[test]
    fn test_conditionals() {
        assert_runs(&[
            ("if (true) { 10 }", int(10)),
            ("if (1 > 2) { 10 }", Value::Nil),
            ("if (1 > 2) { 10 } else { 20 }", int(20)),
            ("if (nil) { 10 } else { 20 }", int(20)),
            ("if ((if (false) { 10 })) { 10 } else { 20 }", int(20)),
            ("if (true) { let x = 1; }", Value::Nil),
        ]);
    }

    #[test]
    fn test_global_bindings() {
        assert_runs(&[
            ("let one = 1; one", int(1)),
            ("let one = 1; let two = one + one; one + two", int(3)),
            ("let a = 1; a = a + 1; a", int(2)),
        ]);
    }

    #[test]
    fn test_top_level_return_halts() {
        assert_eq!(run("return 5; 6"), int(5));
    }

    #[test]
    fn test_strings() {
        assert_runs(&[
            (r#""monkey""#, Value::string("monkey")),
            (r#""mon" + "key""#, Value::string("monkey")),
        ]);
    }

    // ============================================================
    // Arrays and hashes
    // ============================================================

    #[test]
    fn test_arrays_and_indexing() {
        assert_runs(&[
            ("[]", array(&[])),
            ("[1, 2 * 2, 3 + 3]", array(&[1, 4, 6])),
            ("[1, 2, 3][1]", int(2)),
            ("[[1, 1, 1]][0][0]", int(1)),
            ("[1][-1]", Value::Nil),
            ("[1, 2, 3][99]", Value::Nil),
        ]);
    }

    #[test]
    fn test_hashes_and_indexing() {
        assert_runs(&[
            ("{1: 2, 2: 3}[1]", int(2)),
            ("{1: 1, 1: 2}[1]", int(2)),
            ("{}[0]", Value::Nil),
            (r#"{1: 1}["a"]"#, Value::Nil),
            (r#"{"a": 5}["a"]"#, int(5)),
        ]);
        assert_eq!(run("{1: 2, 3: 4}").to_string(), "{1: 2, 3: 4}");
    }

    #[test]
    fn test_index_assignment_aliases() {
        assert_runs(&[
            (r#"let h = {}; h["a"] = 1; h["a"]"#, int(1)),
            ("let a = [1, 2]; let b = a; b[0] = 9; a[0]", int(9)),
        ]);
    }

    #[test]
    fn test_index_errors() {
        assert_eq!(
            run_err("let a = [1, 2, 3]; a[10] = 9"),
            RuntimeError::ArrayIndexOutOfRange(10)
        );
        assert_eq!(
            run_err("{[1]: 2}"),
            RuntimeError::UnusableHashKey("Array")
        );
        assert_eq!(
            run_err("{1: 2}[fn() { 1 }]"),
            RuntimeError::UnusableHashKey("Closure")
        );
        assert_eq!(run_err("1[0]"), RuntimeError::IndexNotSupported("Integer"));
    }

    // ============================================================
    // Functions
    // ============================================================

    #[test]
    fn test_calling_functions() {
        assert_runs(&[
            ("let f = fn() { 5 + 10 }; f()", int(15)),
            ("let a = fn() { 1 }; let b = fn() { a() + 1 }; b()", int(2)),
            ("let f = fn() { return 99; 100; }; f()", int(99)),
            ("let f = fn() { }; f()", Value::Nil),
            ("let f = fn() { let x = 1; }; f()", Value::Nil),
            ("let f = fn() { let one = 1; let two = 2; one + two }; f()", int(3)),
            ("let sum = fn(a, b) { let c = a + b; c }; sum(1, 2) + sum(3, 4)", int(10)),
        ]);
    }

    #[test]
    fn test_wrong_argument_count() {
        assert_eq!(
            run_err("fn() { 1; }(1);").to_string(),
            "wrong number of arguments: want=0, got=1"
        );
        assert_eq!(
            run_err("fn(a) { a; }();"),
            RuntimeError::WrongArgumentCount { want: 1, got: 0 }
        );
    }

    #[test]
    fn test_calling_non_callable() {
        assert_eq!(run_err("1()"), RuntimeError::NotCallable("Integer"));
    }

    #[test]
    fn test_builtins() {
        assert_runs(&[
            (r#"len("")"#, int(0)),
            (r#"len("four")"#, int(4)),
            ("len([1, 2, 3])", int(3)),
            (
                "len(1)",
                Value::error("argument to `len` not supported, got Integer"),
            ),
            (
                r#"len("one", "two")"#,
                Value::error("wrong number of arguments. want=1, got=2"),
            ),
            ("first([1, 2, 3])", int(1)),
            ("first([])", Value::Nil),
            ("last([1, 2, 3])", int(3)),
            ("rest([1, 2, 3])", array(&[2, 3])),
            ("push([], 1)", array(&[1])),
            ("let a = [1]; push(a, 2); a", array(&[1])),
        ]);
    }

    #[test]
    fn test_builtin_names_can_be_shadowed() {
        assert_eq!(
            run("len = 1; push = fn() { len = 2; len; }(); len + push;"),
            int(3)
        );
    }

    // ============================================================
    // Closures
    // ============================================================

    #[test]
    fn test_closures() {
        assert_runs(&[
            (
                "let newClosure = fn(a) { fn() { a; }; }; let closure = newClosure(99); closure();",
                int(99),
            ),
            (
                "let newAdder = fn(a, b) { fn(c) { a + b + c }; }; let adder = newAdder(1, 2); adder(8);",
                int(11),
            ),
            (
                "let a = 1; let f = fn() { let b = 2; fn(c) { a + b + c } }; f()(52)",
                int(55),
            ),
        ]);
    }

    #[test]
    fn test_nested_closures() {
        let source = indoc! {"
            let newAdderOuter = fn(a, b) {
                let c = a + b;
                fn(d) {
                    let e = d + c;
                    fn(f) { e + f; };
                };
            };
            let newAdderInner = newAdderOuter(1, 2);
            let adder = newAdderInner(3);
            adder(8);
        "};
        assert_eq!(run(source), int(14));
    }

    #[test]
    fn test_recursive_fibonacci() {
        let source = indoc! {"
            let fibonacci = fn(x) {
                if (x == 0) {
                    return 0;
                } else {
                    if (x == 1) {
                        return 1;
                    } else {
                        fibonacci(x - 1) + fibonacci(x - 2);
                    }
                }
            };
            fibonacci(15);
        "};
        assert_eq!(run(source), int(610));
    }

    #[test]
    fn test_local_recursive_function() {
        let source = indoc! {"
            let wrapper = fn() {
                let countDown = fn(x) {
                    if (x == 0) { return 0; } else { countDown(x - 1); }
                };
                countDown(5);
            };
            wrapper();
        "};
        assert_eq!(run(source), int(0));
    }

    #[test]
    fn test_self_reference_is_the_running_closure() {
        assert_runs(&[
            ("let f = fn() { f }; f() == f", Value::Boolean(true)),
            (
                "let outer = fn() { let inner = fn() { outer }; inner() }; outer() == outer",
                Value::Boolean(true),
            ),
        ]);
    }

    // ============================================================
    // Limits and malformed code
    // ============================================================

    #[test]
    fn test_frame_overflow() {
        assert_eq!(
            run_err("let f = fn() { f() }; f()"),
            RuntimeError::FrameOverflow(MAX_FRAMES)
        );
    }

    #[test]
    fn test_stack_overflow_with_small_stack() {
        let config = VmConfig {
            stack_size: 16,
            max_frames: MAX_FRAMES,
        };
        assert_eq!(
            run_with_config("let f = fn(x) { f(x + 1) }; f(0)", config),
            Err(RuntimeError::StackOverflow)
        );
    }

    #[test]
    fn test_undefined_opcode() {
        let bytecode = Bytecode {
            instructions: vec![255u8].into(),
            constants: Vec::new(),
        };
        let mut vm = Vm::new(bytecode);
        assert_eq!(
            vm.run(),
            Err(RuntimeError::UndefinedOpcode {
                byte: 255,
                offset: 0
            })
        );
    }

    #[test]
    fn test_truncated_instruction() {
        let mut bytes = make(Opcode::Constant, &[0]);
        bytes.pop();
        let bytecode = Bytecode {
            instructions: bytes.into(),
            constants: Vec::new(),
        };
        let mut vm = Vm::new(bytecode);
        assert_eq!(
            vm.run(),
            Err(RuntimeError::TruncatedInstruction {
                opcode: "CONSTANT",
                offset: 0
            })
        );
    }

    fn run_loaded(parts: Vec<Vec<u8>>, constants: Vec<Constant>) -> Result<(), RuntimeError> {
        let bytecode = Bytecode {
            instructions: parts.into_iter().collect(),
            constants,
        };
        let loaded = Bytecode::from_bytes(&bytecode.to_bytes().unwrap()).unwrap();
        let config = VmConfig {
            stack_size: 16,
            ..VmConfig::default()
        };
        Vm::with_config(loaded, Vec::new(), config, BUILTINS).run()
    }

    #[test]
    fn test_malformed_bytecode_is_an_error() {
        let function = Constant::Function(Rc::new(CompiledFunction::default()));

        let cases: Vec<(Vec<Vec<u8>>, Vec<Constant>, RuntimeError)> = vec![
            (vec![make(Opcode::Array, &[5])], vec![], RuntimeError::StackUnderflow),
            (vec![make(Opcode::Hash, &[2])], vec![], RuntimeError::StackUnderflow),
            (vec![make(Opcode::Call, &[3])], vec![], RuntimeError::StackUnderflow),
            (
                vec![make(Opcode::Closure, &[0, 2])],
                vec![function],
                RuntimeError::StackUnderflow,
            ),
            (vec![make(Opcode::GetFree, &[0])], vec![], RuntimeError::UndefinedFree(0)),
            (vec![make(Opcode::GetLocal, &[255])], vec![], RuntimeError::StackOverflow),
            (
                vec![make(Opcode::True, &[]), make(Opcode::SetLocal, &[255])],
                vec![],
                RuntimeError::StackOverflow,
            ),
        ];

        for (parts, constants, expected) in cases {
            assert_eq!(run_loaded(parts, constants), Err(expected));
        }
    }

    #[test]
    fn test_popping_an_empty_stack_yields_nil() {
        assert_eq!(
            run_loaded(
                vec![make(Opcode::Pop, &[]), make(Opcode::Bang, &[]), make(Opcode::Pop, &[])],
                vec![]
            ),
            Ok(())
        );
    }

    #[test]
    fn test_globals_survive_into_next_vm() {
        let mut vm = Vm::new(compile("let a = 40;"));
        vm.run().unwrap();
        let globals = vm.into_globals();
        assert_eq!(globals[0], int(40));
        assert_eq!(globals.len(), GLOBALS_SIZE);
    }
}
