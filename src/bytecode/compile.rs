use crate::bytecode::compile_error::CompileError;
use crate::bytecode::ir::{Bytecode, CompiledFunction, Constant, Instructions};
use crate::bytecode::op::{Opcode, fits_operand, make};
use crate::bytecode::symbol_table::{ScopeSummary, Symbol, SymbolScope, SymbolTable};
use crate::lang::builtins::{BUILTINS, Builtin};
use crate::lang::node::{BlockStatement, Expression, FunctionLiteral, Statement};
use crate::lang::program::Program;
use std::rc::Rc;

/// Operand written into forward jumps until their target is known.
const PLACEHOLDER: usize = 9999;

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// The instruction buffer of one function body (or of the top level), plus
/// the two most recent instructions so a trailing `POP` can be undone.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last: Option<EmittedInstruction>,
    previous: Option<EmittedInstruction>,
}

/// Single-pass compiler from the syntax tree to bytecode.
///
/// The constant pool and the symbol table can be carried from one compiler to
/// the next (see `with_state` / `into_state`), which is how the REPL keeps
/// definitions alive between inputs.
pub struct Compiler {
    constants: Vec<Constant>,
    symbol_table: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_builtins(BUILTINS)
    }

    /// A fresh compiler whose global scope knows `builtins` by their table
    /// position.
    pub fn with_builtins(builtins: &[Builtin]) -> Self {
        let mut symbol_table = SymbolTable::new();
        for (index, builtin) in builtins.iter().enumerate() {
            symbol_table.define_builtin(index, builtin.name);
        }
        Self::with_state(symbol_table, Vec::new())
    }

    pub fn with_state(symbol_table: SymbolTable, constants: Vec<Constant>) -> Self {
        Self {
            constants,
            symbol_table,
            scopes: vec![CompilationScope::default()],
        }
    }

    /// Compiles a whole program into the top-level instruction stream.
    ///
    /// On failure, any function scopes opened by the failing statement are
    /// discarded so the symbol table is back at its global scope.
    pub fn compile(&mut self, program: &Program) -> Result<(), CompileError> {
        let result = program
            .statements
            .iter()
            .try_for_each(|statement| self.compile_statement(statement));

        if let Err(err) = &result {
            log::debug!("compilation failed: {}", err);
            self.scopes.truncate(1);
            self.symbol_table.reset_to_global();
        }

        result
    }

    /// The top-level instructions and the constant pool compiled so far.
    pub fn bytecode(&self) -> Bytecode {
        Bytecode {
            instructions: self.scope().instructions.clone(),
            constants: self.constants.clone(),
        }
    }

    /// Hands back the symbol table and constant pool for the next compiler.
    pub fn into_state(self) -> (SymbolTable, Vec<Constant>) {
        (self.symbol_table, self.constants)
    }

    pub fn symbol_table(&self) -> &SymbolTable {
        &self.symbol_table
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn compile_statement(&mut self, statement: &Statement) -> Result<(), CompileError> {
        match statement {
            Statement::Expression(expression) => {
                self.compile_expression(expression)?;
                self.emit(Opcode::Pop, &[])?;
            }

            Statement::Let { name, value } => {
                // Defined before the value is compiled so a function literal
                // can refer to its own binding.
                let symbol = self.symbol_table.define(name);
                self.compile_expression(value)?;
                self.emit_store(&symbol)?;
            }

            Statement::Assign { target, value } => self.compile_assignment(target, value)?,

            Statement::Return(value) => {
                self.compile_expression(value)?;
                self.emit(Opcode::ReturnValue, &[])?;
            }

            Statement::Block(block) => self.compile_block(block)?,
        }

        Ok(())
    }

    fn compile_block(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        block
            .statements
            .iter()
            .try_for_each(|statement| self.compile_statement(statement))
    }

    fn compile_assignment(
        &mut self,
        target: &Expression,
        value: &Expression,
    ) -> Result<(), CompileError> {
        match target {
            Expression::Identifier(name) => {
                // Only a global or local of the current scope is overwritten.
                // Anything else (an enclosing variable, a builtin, the
                // function's own name) gets a new binding that shadows it.
                let existing = self
                    .symbol_table
                    .resolve_current_scope(name)
                    .filter(|symbol| {
                        matches!(symbol.scope, SymbolScope::Global | SymbolScope::Local)
                    })
                    .cloned();
                let symbol = match existing {
                    Some(symbol) => symbol,
                    None => self.symbol_table.define(name),
                };

                self.compile_expression(value)?;
                self.emit_store(&symbol)?;
            }

            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.compile_expression(value)?;
                self.emit(Opcode::SetIndex, &[])?;
            }

            other => return Err(CompileError::InvalidAssignmentTarget(other.to_string())),
        }

        Ok(())
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn compile_expression(&mut self, expression: &Expression) -> Result<(), CompileError> {
        match expression {
            Expression::Integer(n) => {
                let index = self.add_constant(Constant::Integer(*n));
                self.emit(Opcode::Constant, &[index])?;
            }
            Expression::Float(x) => {
                let index = self.add_constant(Constant::Float(*x));
                self.emit(Opcode::Constant, &[index])?;
            }
            Expression::String(s) => {
                let index = self.add_constant(Constant::String(s.as_str().into()));
                self.emit(Opcode::Constant, &[index])?;
            }
            Expression::Boolean(true) => {
                self.emit(Opcode::True, &[])?;
            }
            Expression::Boolean(false) => {
                self.emit(Opcode::False, &[])?;
            }
            Expression::Nil => {
                self.emit(Opcode::Nil, &[])?;
            }

            Expression::Identifier(name) => {
                let symbol = self
                    .symbol_table
                    .resolve(name)
                    .ok_or_else(|| CompileError::UndefinedVariable(name.clone()))?;
                self.load_symbol(&symbol)?;
            }

            Expression::Prefix { operator, right } => {
                self.compile_expression(right)?;
                match operator.as_str() {
                    "!" => self.emit(Opcode::Bang, &[])?,
                    "-" => self.emit(Opcode::Minus, &[])?,
                    other => return Err(CompileError::UnknownPrefixOperator(other.to_string())),
                };
            }

            Expression::Infix {
                operator,
                left,
                right,
            } => self.compile_infix(operator, left, right)?,

            Expression::If {
                condition,
                consequence,
                alternative,
            } => self.compile_if(condition, consequence, alternative.as_ref())?,

            Expression::Array(elements) => {
                for element in elements {
                    self.compile_expression(element)?;
                }
                self.emit(Opcode::Array, &[elements.len()])?;
            }

            Expression::Hash(pairs) => {
                // Keys are emitted in a fixed order so identical source always
                // produces identical bytecode.
                let mut sorted: Vec<&(Expression, Expression)> = pairs.iter().collect();
                sorted.sort_by_cached_key(|(key, _)| key.to_string());

                for (key, value) in sorted {
                    self.compile_expression(key)?;
                    self.compile_expression(value)?;
                }
                self.emit(Opcode::Hash, &[pairs.len() * 2])?;
            }

            Expression::Index { left, index } => {
                self.compile_expression(left)?;
                self.compile_expression(index)?;
                self.emit(Opcode::GetIndex, &[])?;
            }

            Expression::Function(function) => self.compile_function(function)?,

            Expression::Call {
                function,
                arguments,
            } => {
                self.compile_expression(function)?;
                for argument in arguments {
                    self.compile_expression(argument)?;
                }
                self.emit(Opcode::Call, &[arguments.len()])?;
            }
        }

        Ok(())
    }

    fn compile_infix(
        &mut self,
        operator: &str,
        left: &Expression,
        right: &Expression,
    ) -> Result<(), CompileError> {
        // `a < b` is compiled as `b > a`.
        let (opcode, swapped) = match operator {
            "+" => (Opcode::Add, false),
            "-" => (Opcode::Sub, false),
            "*" => (Opcode::Mul, false),
            "/" => (Opcode::Div, false),
            "==" => (Opcode::Equal, false),
            "!=" => (Opcode::NotEqual, false),
            ">" => (Opcode::GreaterThan, false),
            ">=" => (Opcode::GreaterThanOrEqual, false),
            "<" => (Opcode::GreaterThan, true),
            "<=" => (Opcode::GreaterThanOrEqual, true),
            "&&" => (Opcode::And, false),
            "||" => (Opcode::Or, false),
            other => return Err(CompileError::UnknownInfixOperator(other.to_string())),
        };

        if swapped {
            self.compile_expression(right)?;
            self.compile_expression(left)?;
        } else {
            self.compile_expression(left)?;
            self.compile_expression(right)?;
        }

        self.emit(opcode, &[])?;
        Ok(())
    }

    fn compile_if(
        &mut self,
        condition: &Expression,
        consequence: &BlockStatement,
        alternative: Option<&BlockStatement>,
    ) -> Result<(), CompileError> {
        self.compile_expression(condition)?;
        let jump_not_truthy = self.emit(Opcode::JumpNotTruthy, &[PLACEHOLDER])?;

        self.compile_branch(consequence)?;
        let jump = self.emit(Opcode::Jump, &[PLACEHOLDER])?;

        let after_consequence = self.scope().instructions.len();
        self.change_operand(jump_not_truthy, Opcode::JumpNotTruthy, after_consequence)?;

        match alternative {
            Some(alternative) => self.compile_branch(alternative)?,
            None => {
                self.emit(Opcode::Nil, &[])?;
            }
        }

        let after_alternative = self.scope().instructions.len();
        self.change_operand(jump, Opcode::Jump, after_alternative)?;
        Ok(())
    }

    /// Compiles an if-branch so that it leaves exactly one value: the value of
    /// its trailing expression statement, or nil.
    fn compile_branch(&mut self, block: &BlockStatement) -> Result<(), CompileError> {
        self.compile_block(block)?;

        if self.last_instruction_is(Opcode::Pop) {
            self.remove_last_pop();
        } else {
            self.emit(Opcode::Nil, &[])?;
        }
        Ok(())
    }

    fn compile_function(&mut self, function: &FunctionLiteral) -> Result<(), CompileError> {
        self.enter_scope();

        if let Some(name) = &function.name {
            self.symbol_table.define_function_name(name);
        }
        for parameter in &function.parameters {
            self.symbol_table.define(parameter);
        }

        self.compile_block(&function.body)?;

        if self.last_instruction_is(Opcode::Pop) {
            self.replace_last_pop_with_return();
        }
        if !self.last_instruction_is(Opcode::ReturnValue) {
            self.emit(Opcode::Return, &[])?;
        }

        let (instructions, summary) = self.leave_scope();
        let ScopeSummary {
            free_symbols,
            num_definitions,
        } = summary;

        for symbol in &free_symbols {
            self.load_symbol(symbol)?;
        }

        let compiled = CompiledFunction {
            instructions,
            num_locals: num_definitions,
            num_parameters: function.parameters.len(),
        };
        let index = self.add_constant(Constant::Function(Rc::new(compiled)));
        self.emit(Opcode::Closure, &[index, free_symbols.len()])?;
        Ok(())
    }

    fn load_symbol(&mut self, symbol: &Symbol) -> Result<(), CompileError> {
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index])?,
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index])?,
            SymbolScope::Builtin => self.emit(Opcode::GetBuiltin, &[symbol.index])?,
            SymbolScope::Free => self.emit(Opcode::GetFree, &[symbol.index])?,
            SymbolScope::Function => self.emit(Opcode::CurrentClosure, &[])?,
        };
        Ok(())
    }

    fn emit_store(&mut self, symbol: &Symbol) -> Result<(), CompileError> {
        if symbol.scope == SymbolScope::Global {
            self.emit(Opcode::SetGlobal, &[symbol.index])?;
        } else {
            self.emit(Opcode::SetLocal, &[symbol.index])?;
        }
        Ok(())
    }

    // =========================================================================
    // Emission
    // =========================================================================

    fn scope(&self) -> &CompilationScope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn scope_mut(&mut self) -> &mut CompilationScope {
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }

    fn add_constant(&mut self, constant: Constant) -> usize {
        self.constants.push(constant);
        self.constants.len() - 1
    }

    fn check_operands(opcode: Opcode, operands: &[usize]) -> Result<(), CompileError> {
        let widths = opcode.definition().operand_widths;
        for (width, &operand) in widths.iter().zip(operands) {
            if !fits_operand(*width, operand) {
                return Err(CompileError::OperandOverflow { opcode, operand });
            }
        }
        Ok(())
    }

    /// Appends an instruction to the current scope and returns its offset.
    fn emit(&mut self, opcode: Opcode, operands: &[usize]) -> Result<usize, CompileError> {
        Self::check_operands(opcode, operands)?;

        let instruction = make(opcode, operands);
        let scope = self.scope_mut();
        let position = scope.instructions.push(&instruction);
        scope.previous = scope.last.replace(EmittedInstruction { opcode, position });
        Ok(position)
    }

    fn change_operand(
        &mut self,
        position: usize,
        opcode: Opcode,
        operand: usize,
    ) -> Result<(), CompileError> {
        Self::check_operands(opcode, &[operand])?;
        let instruction = make(opcode, &[operand]);
        self.scope_mut()
            .instructions
            .overwrite(position, &instruction);
        Ok(())
    }

    fn last_instruction_is(&self, opcode: Opcode) -> bool {
        self.scope()
            .last
            .is_some_and(|last| last.opcode == opcode)
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scope_mut();
        if let Some(last) = scope.last {
            scope.instructions.truncate(last.position);
            scope.last = scope.previous.take();
        }
    }

    fn replace_last_pop_with_return(&mut self) {
        let scope = self.scope_mut();
        if let Some(last) = scope.last.as_mut() {
            scope
                .instructions
                .overwrite(last.position, &make(Opcode::ReturnValue, &[]));
            last.opcode = Opcode::ReturnValue;
        }
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        self.symbol_table.enter_scope();
        log::trace!("entered scope {}", self.symbol_table.depth());
    }

    fn leave_scope(&mut self) -> (Instructions, ScopeSummary) {
        let instructions = self
            .scopes
            .pop()
            .map(|scope| scope.instructions)
            .unwrap_or_default();
        let summary = self.symbol_table.leave_scope().unwrap_or_default();
        log::trace!(
            "left scope {} ({} locals, {} free)",
            self.symbol_table.depth() + 1,
            summary.num_definitions,
            summary.free_symbols.len()
        );
        (instructions, summary)
    }
}
