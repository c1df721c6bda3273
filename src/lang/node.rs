use std::fmt;

/// A statement of a Monkey program.
///
/// Statements never leave a value behind on their own; only expression
/// statements produce one, which the bytecode compiler then pops.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    // ───────────────────────────── Bindings ─────────────────────────────
    /// `let <name> = <value>`
    ///
    /// Always introduces a fresh binding in the current scope, even when a
    /// binding with the same name already exists.
    Let { name: String, value: Expression },

    /// `<target> = <value>`
    ///
    /// The target is either an identifier or an index expression. Any other
    /// target is rejected by the compiler, not the parser.
    Assign { target: Expression, value: Expression },

    // ──────────────────────────── Control flow ──────────────────────────
    /// `return <value>`
    Return(Expression),

    // ──────────────────────────── Expressions ───────────────────────────
    /// An expression evaluated for its value.
    Expression(Expression),

    /// A nested `{ ... }` block.
    Block(BlockStatement),
}

/// A `{ ... }` sequence of statements, used as if-branches and function bodies.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockStatement {
    pub statements: Vec<Statement>,
}

/// `fn(<parameters>) { <body> }`
///
/// `name` is filled in by the parser when the literal is the right-hand side
/// of `let name = fn...` or `name = fn...`, which lets the body refer to
/// itself without going through a global or a captured variable.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub name: Option<String>,
    pub parameters: Vec<String>,
    pub body: BlockStatement,
}

/// An expression of a Monkey program.
///
/// Operators are kept as their source text; the compiler decides which
/// operators it understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    // ───────────────────────────── Literals ─────────────────────────────
    Identifier(String),
    Integer(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Nil,

    /// `[a, b, c]`
    Array(Vec<Expression>),

    /// `{k: v, ...}` with pairs in source order.
    Hash(Vec<(Expression, Expression)>),

    Function(FunctionLiteral),

    // ───────────────────────────── Operators ────────────────────────────
    /// `<operator><right>`, e.g. `-x` or `!ok`.
    Prefix {
        operator: String,
        right: Box<Expression>,
    },

    /// `<left> <operator> <right>`
    Infix {
        operator: String,
        left: Box<Expression>,
        right: Box<Expression>,
    },

    /// `<left>[<index>]`
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },

    // ──────────────────────────── Control flow ──────────────────────────
    /// `if (<condition>) { ... } else { ... }`
    ///
    /// An `if` is an expression: its value is the value of the branch taken,
    /// or nil when the condition is falsy and there is no alternative.
    If {
        condition: Box<Expression>,
        consequence: BlockStatement,
        alternative: Option<BlockStatement>,
    },

    /// `<function>(<arguments>)`
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    /// Canonical textual form. Hash literal keys are ordered by this string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Identifier(name) => write!(f, "{}", name),
            Expression::Integer(n) => write!(f, "{}", n),
            Expression::Float(x) => write!(f, "{}", x),
            Expression::String(s) => write!(f, "{}", s),
            Expression::Boolean(b) => write!(f, "{}", b),
            Expression::Nil => write!(f, "nil"),
            Expression::Array(elements) => {
                write!(f, "[")?;
                write_list(f, elements)?;
                write!(f, "]")
            }
            Expression::Hash(pairs) => {
                write!(f, "{{")?;
                for (i, (key, value)) in pairs.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}:{}", key, value)?;
                }
                write!(f, "}}")
            }
            Expression::Function(function) => write!(f, "{}", function),
            Expression::Prefix { operator, right } => write!(f, "({}{})", operator, right),
            Expression::Infix {
                operator,
                left,
                right,
            } => write!(f, "({} {} {})", left, operator, right),
            Expression::Index { left, index } => write!(f, "({}[{}])", left, index),
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{} {}", condition, consequence)?;
                if let Some(alternative) = alternative {
                    write!(f, "else {}", alternative)?;
                }
                Ok(())
            }
            Expression::Call {
                function,
                arguments,
            } => {
                write!(f, "{}(", function)?;
                write_list(f, arguments)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for FunctionLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn")?;
        if let Some(name) = &self.name {
            write!(f, "<{}>", name)?;
        }
        write!(f, "(")?;
        write_list(f, &self.parameters)?;
        write!(f, ") {}", self.body)
    }
}

impl fmt::Display for BlockStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            write!(f, "{}", statement)?;
        }
        Ok(())
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Let { name, value } => write!(f, "let {} = {};", name, value),
            Statement::Assign { target, value } => write!(f, "{} = {};", target, value),
            Statement::Return(value) => write!(f, "return {};", value),
            Statement::Expression(expression) => write!(f, "{}", expression),
            Statement::Block(block) => write!(f, "{}", block),
        }
    }
}
