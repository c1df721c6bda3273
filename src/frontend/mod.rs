//! Source text to syntax tree: lexing, Pratt parsing and token dumps.

pub mod lexer;
pub mod parser;
pub mod parser_error;
pub mod token;
pub mod token_dumper;

use crate::frontend::lexer::{Lexer, LexerError};
use crate::frontend::parser::Parser;
use crate::frontend::parser_error::ParserError;
use crate::lang::program::Program;
use thiserror::Error;

/// Anything that stops source text from becoming a `Program`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SyntaxError {
    #[error("lexer error: {0}")]
    Lexer(#[from] LexerError),

    #[error("parse error: {0}")]
    Parser(#[from] ParserError),
}

/// Lexes and parses `source` in one step.
pub fn parse(source: &str) -> Result<Program, SyntaxError> {
    let tokens = Lexer::new(source).tokenize()?;
    let program = Parser::new(tokens).parse()?;
    Ok(program)
}
