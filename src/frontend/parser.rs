use crate::frontend::lexer::{Span, Spanned};
use crate::frontend::parser_error::ParserError;
use crate::frontend::token::Token;
use crate::lang::node::{BlockStatement, Expression, FunctionLiteral, Statement};
use crate::lang::program::Program;

static EOF: Token = Token::Eof;

/// Binding power of infix positions, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    /// `||`
    Or,
    /// `&&`
    And,
    /// `==` `!=`
    Equals,
    /// `<` `>` `<=` `>=`
    LessGreater,
    /// `+` `-`
    Sum,
    /// `*` `/`
    Product,
    /// `-x` `!x`
    Prefix,
    /// `f(x)`
    Call,
    /// `a[i]`
    Index,
}

fn precedence_of(token: &Token) -> Precedence {
    match token {
        Token::Or => Precedence::Or,
        Token::And => Precedence::And,
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Lt | Token::Gt | Token::LtEq | Token::GtEq => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Star | Token::Slash => Precedence::Product,
        Token::LParen => Precedence::Call,
        Token::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

/// Gives an anonymous function literal the name it is being bound to.
fn name_function(value: &mut Expression, name: &str) {
    if let Expression::Function(function) = value {
        function.name = Some(name.to_string());
    }
}

/// Pratt parser for Monkey.
///
/// The parser consumes a stream of lexed `Spanned` tokens and produces a
/// `Program`. Statements are:
/// - `let <name> = <expr>`
/// - `return <expr>`
/// - `<expr> = <expr>` (assignment; the target is checked by the compiler)
/// - `<expr>`
///
/// Semicolons between statements are optional. Parsing stops at the first
/// error.
pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Span of the most recently consumed token.
    ///
    /// Used to provide stable source locations for errors that occur after
    /// advancing past the last token or at end-of-file.
    last_span: Option<Span>,
}

impl Parser {
    /// Creates a new parser from lexer output.
    ///
    /// The parser filters out `Token::Comment(_)` to simplify parsing. Spans
    /// come from the original tokens, so locations stay intact.
    pub fn new(tokens: Vec<Spanned>) -> Self {
        let tokens: Vec<Spanned> = tokens
            .into_iter()
            .filter(|t| !matches!(t.token, Token::Comment(_)))
            .collect();
        Parser {
            tokens,
            pos: 0,
            last_span: None,
        }
    }

    /// Returns the current token without consuming it.
    ///
    /// Returns `None` when the parser position is beyond the token list.
    fn current(&self) -> Option<&Spanned> {
        self.tokens.get(self.pos)
    }

    /// Peeks the current token kind. Past the end of input this is `Eof`.
    fn peek(&self) -> &Token {
        self.current().map(|s| &s.token).unwrap_or(&EOF)
    }

    fn at(&self, token: &Token) -> bool {
        self.peek() == token
    }

    /// Advances the token stream by one and returns the consumed token.
    ///
    /// This also updates `last_span` to the consumed token's span so that
    /// EOF-related errors can still report a useful location.
    fn advance(&mut self) -> Option<&Spanned> {
        let token = self.tokens.get(self.pos);
        if let Some(s) = token {
            self.last_span = Some(s.span.clone());
        }
        self.pos += 1;
        token
    }

    /// Constructs a `ParserError` at the most relevant location.
    ///
    /// Priority:
    /// 1. If `current()` exists, use its span.
    /// 2. Else, use `last_span` (e.g. after consuming EOF or falling off the end).
    /// 3. Else, default to (1,1) for truly empty input.
    fn error(&self, message: &str) -> ParserError {
        let (line, col) = match (self.current(), &self.last_span) {
            (Some(spanned), _) => (spanned.span.line, spanned.span.col),
            (None, Some(span)) => (span.line, span.col),
            (None, None) => (1, 1),
        };
        ParserError {
            message: message.to_string(),
            line,
            col,
        }
    }

    /// Consumes `expected` or fails with a message naming it.
    fn expect(&mut self, expected: &Token) -> Result<(), ParserError> {
        if self.at(expected) {
            self.advance();
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}', got '{}'", expected, self.peek())))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, ParserError> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            other => Err(self.error(&format!("expected identifier {}, got '{}'", context, other))),
        }
    }

    fn skip_semicolon(&mut self) {
        if self.at(&Token::Semicolon) {
            self.advance();
        }
    }

    /// Parses a complete Monkey program.
    ///
    /// The parser stops when it reaches `Token::Eof`.
    pub fn parse(&mut self) -> Result<Program, ParserError> {
        let mut statements = Vec::new();

        while !self.at(&Token::Eof) {
            if self.at(&Token::Semicolon) {
                self.advance();
                continue;
            }
            statements.push(self.parse_statement()?);
        }

        Ok(Program { statements })
    }

    // ─────────────────────────────── Statements ──────────────────────────────

    fn parse_statement(&mut self) -> Result<Statement, ParserError> {
        let statement = match self.peek() {
            Token::Let => self.parse_let()?,
            Token::Return => {
                self.advance();
                Statement::Return(self.parse_expression(Precedence::Lowest)?)
            }
            _ => self.parse_simple_statement()?,
        };

        self.skip_semicolon();
        Ok(statement)
    }

    /// Parses a let statement:
    ///
    /// ```text
    /// let <name> = <expression>
    /// ```
    fn parse_let(&mut self) -> Result<Statement, ParserError> {
        self.advance(); // consume 'let'

        let name = self.expect_ident("after 'let'")?;
        self.expect(&Token::Assign)?;

        let mut value = self.parse_expression(Precedence::Lowest)?;
        name_function(&mut value, &name);

        Ok(Statement::Let { name, value })
    }

    /// Parses an expression statement, turning it into an assignment when the
    /// expression is followed by `=`.
    fn parse_simple_statement(&mut self) -> Result<Statement, ParserError> {
        let expression = self.parse_expression(Precedence::Lowest)?;

        if !self.at(&Token::Assign) {
            return Ok(Statement::Expression(expression));
        }

        self.advance(); // consume '='
        let mut value = self.parse_expression(Precedence::Lowest)?;
        if let Expression::Identifier(name) = &expression {
            name_function(&mut value, name);
        }

        Ok(Statement::Assign {
            target: expression,
            value,
        })
    }

    /// Parses `{ <statements> }`.
    fn parse_block(&mut self) -> Result<BlockStatement, ParserError> {
        self.expect(&Token::LBrace)?;

        let mut statements = Vec::new();
        while !self.at(&Token::RBrace) {
            if self.at(&Token::Eof) {
                return Err(self.error("unexpected EOF, expected '}'"));
            }
            if self.at(&Token::Semicolon) {
                self.advance();
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        self.advance(); // consume '}'

        Ok(BlockStatement { statements })
    }

    // ────────────────────────────── Expressions ──────────────────────────────

    /// Parses an expression whose infix operators all bind tighter than
    /// `precedence`.
    fn parse_expression(&mut self, precedence: Precedence) -> Result<Expression, ParserError> {
        let mut left = self.parse_prefix()?;

        while !self.at(&Token::Semicolon) && precedence < precedence_of(self.peek()) {
            left = match self.peek() {
                Token::LParen => self.parse_call(left)?,
                Token::LBracket => self.parse_index(left)?,
                _ => self.parse_infix(left)?,
            };
        }

        Ok(left)
    }

    /// Parses anything that can start an expression.
    fn parse_prefix(&mut self) -> Result<Expression, ParserError> {
        let expression = match self.peek().clone() {
            Token::Ident(name) => {
                self.advance();
                Expression::Identifier(name)
            }
            Token::Integer(n) => {
                self.advance();
                Expression::Integer(n)
            }
            Token::Float(x) => {
                self.advance();
                Expression::Float(x)
            }
            Token::String(s) => {
                self.advance();
                Expression::String(s)
            }
            Token::True => {
                self.advance();
                Expression::Boolean(true)
            }
            Token::False => {
                self.advance();
                Expression::Boolean(false)
            }
            Token::Nil => {
                self.advance();
                Expression::Nil
            }
            Token::Bang | Token::Minus => {
                let operator = self.peek().to_string();
                self.advance();
                let right = self.parse_expression(Precedence::Prefix)?;
                Expression::Prefix {
                    operator,
                    right: Box::new(right),
                }
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expression(Precedence::Lowest)?;
                self.expect(&Token::RParen)?;
                inner
            }
            Token::LBracket => {
                self.advance();
                Expression::Array(self.parse_expression_list(&Token::RBracket)?)
            }
            Token::LBrace => self.parse_hash()?,
            Token::If => self.parse_if()?,
            Token::Fn => self.parse_function()?,
            Token::Eof => return Err(self.error("unexpected EOF, expected an expression")),
            other => {
                return Err(self.error(&format!("unexpected '{}', expected an expression", other)));
            }
        };

        Ok(expression)
    }

    /// Parses `<left> <op> <right>`. All binary operators are left
    /// associative.
    fn parse_infix(&mut self, left: Expression) -> Result<Expression, ParserError> {
        let precedence = precedence_of(self.peek());
        let operator = self.peek().to_string();
        self.advance();

        let right = self.parse_expression(precedence)?;
        Ok(Expression::Infix {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_call(&mut self, function: Expression) -> Result<Expression, ParserError> {
        self.advance(); // consume '('
        let arguments = self.parse_expression_list(&Token::RParen)?;
        Ok(Expression::Call {
            function: Box::new(function),
            arguments,
        })
    }

    fn parse_index(&mut self, left: Expression) -> Result<Expression, ParserError> {
        self.advance(); // consume '['
        let index = self.parse_expression(Precedence::Lowest)?;
        self.expect(&Token::RBracket)?;
        Ok(Expression::Index {
            left: Box::new(left),
            index: Box::new(index),
        })
    }

    /// Parses comma separated expressions up to and including `end`. The
    /// opening delimiter has already been consumed.
    fn parse_expression_list(&mut self, end: &Token) -> Result<Vec<Expression>, ParserError> {
        let mut list = Vec::new();

        if self.at(end) {
            self.advance();
            return Ok(list);
        }

        loop {
            list.push(self.parse_expression(Precedence::Lowest)?);
            if self.at(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }

        self.expect(end)?;
        Ok(list)
    }

    /// Parses a hash literal:
    ///
    /// ```text
    /// { <key>: <value>, ... }
    /// ```
    fn parse_hash(&mut self) -> Result<Expression, ParserError> {
        self.advance(); // consume '{'

        let mut pairs = Vec::new();
        while !self.at(&Token::RBrace) {
            let key = self.parse_expression(Precedence::Lowest)?;
            self.expect(&Token::Colon)?;
            let value = self.parse_expression(Precedence::Lowest)?;
            pairs.push((key, value));

            if !self.at(&Token::RBrace) {
                self.expect(&Token::Comma)?;
            }
        }
        self.advance(); // consume '}'

        Ok(Expression::Hash(pairs))
    }

    /// Parses a conditional:
    ///
    /// ```text
    /// if (<condition>) { ... } else { ... }
    /// ```
    ///
    /// The parentheses around the condition are required; the `else` branch is
    /// optional.
    fn parse_if(&mut self) -> Result<Expression, ParserError> {
        self.advance(); // consume 'if'

        self.expect(&Token::LParen)?;
        let condition = self.parse_expression(Precedence::Lowest)?;
        self.expect(&Token::RParen)?;

        let consequence = self.parse_block()?;
        let alternative = if self.at(&Token::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };

        Ok(Expression::If {
            condition: Box::new(condition),
            consequence,
            alternative,
        })
    }

    /// Parses a function literal:
    ///
    /// ```text
    /// fn(<param>, ...) { ... }
    /// ```
    fn parse_function(&mut self) -> Result<Expression, ParserError> {
        self.advance(); // consume 'fn'

        self.expect(&Token::LParen)?;
        let mut parameters = Vec::new();
        if self.at(&Token::RParen) {
            self.advance();
        } else {
            loop {
                parameters.push(self.expect_ident("in parameter list")?);
                if self.at(&Token::Comma) {
                    self.advance();
                } else {
                    break;
                }
            }
            self.expect(&Token::RParen)?;
        }

        let body = self.parse_block()?;
        Ok(Expression::Function(FunctionLiteral {
            name: None,
            parameters,
            body,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(source: &str) -> Program {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap()
    }

    fn parse_err(source: &str) -> ParserError {
        let tokens = Lexer::new(source).tokenize().unwrap();
        Parser::new(tokens).parse().unwrap_err()
    }

    fn single_expression(source: &str) -> Expression {
        let program = parse(source);
        assert_eq!(program.statements.len(), 1, "source: {}", source);
        match &program.statements[0] {
            Statement::Expression(expression) => expression.clone(),
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    // ============================================================
    // Statements
    // ============================================================

    #[test]
    fn test_let_statements() {
        let program = parse("let x = 5; let y = true; let foobar = y");
        assert_eq!(
            program.statements,
            vec![
                Statement::Let {
                    name: "x".to_string(),
                    value: Expression::Integer(5),
                },
                Statement::Let {
                    name: "y".to_string(),
                    value: Expression::Boolean(true),
                },
                Statement::Let {
                    name: "foobar".to_string(),
                    value: Expression::Identifier("y".to_string()),
                },
            ]
        );
    }

    #[test]
    fn test_return_statement() {
        let program = parse("return 5; return x + 1;");
        assert_eq!(program.to_string(), "return 5;return (x + 1);");
    }

    #[test]
    fn test_assignment_statements() {
        let program = parse("a = 1; arr[0] = 2");
        assert_eq!(program.to_string(), "a = 1;(arr[0]) = 2;");
        assert!(matches!(program.statements[1], Statement::Assign { .. }));
    }

    #[test]
    fn test_function_names_are_inferred() {
        let program = parse("let add = fn(a, b) { a + b }; sub = fn(a, b) { a - b }; fn() {}");
        let names: Vec<Option<String>> = program
            .statements
            .iter()
            .map(|statement| match statement {
                Statement::Let {
                    value: Expression::Function(f),
                    ..
                }
                | Statement::Assign {
                    value: Expression::Function(f),
                    ..
                }
                | Statement::Expression(Expression::Function(f)) => f.name.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();

        assert_eq!(
            names,
            vec![Some("add".to_string()), Some("sub".to_string()), None]
        );
    }

    // ============================================================
    // Precedence
    // ============================================================

    #[test]
    fn test_operator_precedence() {
        let cases = [
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b + c", "((a + b) + c)"),
            ("a + b * c + d / e - f", "(((a + (b * c)) + (d / e)) - f)"),
            ("5 > 4 == 3 < 4", "((5 > 4) == (3 < 4))"),
            ("3 + 4 * 5 == 3 * 1 + 4 * 5", "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))"),
            ("1 + (2 + 3) + 4", "((1 + (2 + 3)) + 4)"),
            ("-(5 + 5)", "(-(5 + 5))"),
            ("a || b && c", "(a || (b && c))"),
            ("a && b == c", "(a && (b == c))"),
            ("a <= b || c >= d", "((a <= b) || (c >= d))"),
            ("a * [1, 2, 3, 4][b * c] * d", "((a * ([1, 2, 3, 4][(b * c)])) * d)"),
            (
                "add(a * b[2], b[1], 2 * [1, 2][1])",
                "add((a * (b[2])), (b[1]), (2 * ([1, 2][1])))",
            ),
            ("a + add(b * c) + d", "((a + add((b * c))) + d)"),
        ];

        for (source, expected) in cases {
            assert_eq!(parse(source).to_string(), expected, "source: {}", source);
        }
    }

    // ============================================================
    // Expressions
    // ============================================================

    #[test]
    fn test_literals() {
        assert_eq!(single_expression("5"), Expression::Integer(5));
        assert_eq!(single_expression("2.5"), Expression::Float(2.5));
        assert_eq!(
            single_expression(r#""hello world""#),
            Expression::String("hello world".to_string())
        );
        assert_eq!(single_expression("nil"), Expression::Nil);
        assert_eq!(single_expression("false"), Expression::Boolean(false));
    }

    #[test]
    fn test_if_else_expression() {
        let expression = single_expression("if (x < y) { x } else { y }");
        match expression {
            Expression::If {
                condition,
                consequence,
                alternative,
            } => {
                assert_eq!(condition.to_string(), "(x < y)");
                assert_eq!(consequence.to_string(), "x");
                assert_eq!(alternative.map(|a| a.to_string()), Some("y".to_string()));
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn test_function_literal() {
        let expression = single_expression("fn(x, y) { x + y; }");
        assert_eq!(expression.to_string(), "fn(x, y) (x + y)");
        assert_eq!(single_expression("fn() {}").to_string(), "fn() ");
    }

    #[test]
    fn test_call_expression() {
        let expression = single_expression("add(1, 2 * 3, 4 + 5);");
        match expression {
            Expression::Call {
                function,
                arguments,
            } => {
                assert_eq!(function.to_string(), "add");
                let rendered: Vec<String> = arguments.iter().map(|a| a.to_string()).collect();
                assert_eq!(rendered, vec!["1", "(2 * 3)", "(4 + 5)"]);
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_hash_literals() {
        assert_eq!(single_expression("{}"), Expression::Hash(vec![]));
        assert_eq!(
            single_expression(r#"{"one": 1, "two": 2}"#).to_string(),
            "{one:1, two:2}"
        );
        assert_eq!(
            single_expression(r#"{"one": 0 + 1, true: 2}"#).to_string(),
            "{one:(0 + 1), true:2}"
        );
    }

    #[test]
    fn test_comments_are_ignored() {
        let program = parse("// leading\nlet a = 1; // trailing\na");
        assert_eq!(program.statements.len(), 2);
    }

    // ============================================================
    // Errors
    // ============================================================

    #[test]
    fn test_let_requires_identifier() {
        let err = parse_err("let = 5;");
        assert_eq!(err.message, "expected identifier after 'let', got '='");
        assert_eq!((err.line, err.col), (1, 5));
    }

    #[test]
    fn test_missing_closing_brace() {
        let err = parse_err("fn(x) { x");
        assert_eq!(err.message, "unexpected EOF, expected '}'");
    }

    #[test]
    fn test_if_requires_parentheses() {
        let err = parse_err("if x { 1 }");
        assert_eq!(err.message, "expected '(', got 'x'");
    }

    #[test]
    fn test_unexpected_token() {
        let err = parse_err("let x = );");
        assert_eq!(err.message, "unexpected ')', expected an expression");
        assert_eq!((err.line, err.col), (1, 9));
    }
}
