use crate::frontend::lexer::Spanned;
use crate::frontend::token::Token;
use std::fmt::{self, Write};

/// Prints lexer output one token per line, for `monkey --tokens`.
pub struct TokenDumper {
    pub color: bool,
    pub show_debug_repr: bool, // if false, prints source text instead of Debug form
}

impl Default for TokenDumper {
    fn default() -> Self {
        Self {
            color: true,
            show_debug_repr: true,
        }
    }
}

impl TokenDumper {
    // ANSI colors
    const RESET: &'static str = "\x1b[0m";
    const DIM: &'static str = "\x1b[2m";
    const GRN: &'static str = "\x1b[32m";
    const YEL: &'static str = "\x1b[33m";
    const BLU: &'static str = "\x1b[34m";
    const CYN: &'static str = "\x1b[36m";
    const MAG: &'static str = "\x1b[35m";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn no_color(mut self) -> Self {
        self.color = false;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.show_debug_repr = false;
        self
    }

    pub fn dump(&self, tokens: &[Spanned]) {
        print!("{}", self.render(tokens));
    }

    pub fn render(&self, tokens: &[Spanned]) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.write_all(&mut out, tokens);
        out
    }

    pub fn write_all(&self, out: &mut impl Write, tokens: &[Spanned]) -> fmt::Result {
        tokens.iter().try_for_each(|s| self.render_one(out, s))
    }

    fn render_one(&self, out: &mut impl Write, s: &Spanned) -> fmt::Result {
        let line = s.span.line;
        let col = s.span.col;

        let kind = Self::kind(&s.token);
        let colr = if self.color { Self::color(&s.token) } else { "" };
        let reset = if self.color { Self::RESET } else { "" };

        if self.show_debug_repr {
            writeln!(
                out,
                "[{:02}:{:02}] {}{:<8} {:?}{}",
                line, col, colr, kind, s.token, reset
            )
        } else {
            writeln!(
                out,
                "[{:02}:{:02}] {}{:<8} {}{}",
                line, col, colr, kind, s.token, reset
            )
        }
    }

    fn kind(t: &Token) -> &'static str {
        use Token::*;
        match t {
            Comment(_) => "COMMENT",
            Eof => "EOF",

            // literals
            Integer(_) => "INT",
            Float(_) => "FLOAT",
            String(_) => "STRING",
            True | False => "BOOL",
            Nil => "NIL",

            // names
            Ident(_) => "IDENT",

            // structure
            LParen | RParen => "PAREN",
            LBracket | RBracket => "BRACKET",
            LBrace | RBrace => "BRACE",
            Comma | Semicolon | Colon => "PUNCT",

            // operators
            Assign => "ASSIGN",
            Plus | Minus | Star | Slash | Bang | And | Or => "OP",
            Eq | NotEq | Lt | LtEq | Gt | GtEq => "CMP",

            Fn | Let | If | Else | Return => "KEYWORD",
        }
    }

    fn color(t: &Token) -> &'static str {
        use Token::*;
        match t {
            Comment(_) | Eof => Self::DIM,
            String(_) => Self::GRN,
            Integer(_) | Float(_) | True | False | Nil => Self::CYN,
            Ident(_) => Self::YEL,
            Fn | Let | If | Else | Return => Self::BLU,
            Plus | Minus | Star | Slash | Bang | And | Or | Assign => Self::MAG,
            Eq | NotEq | Lt | LtEq | Gt | GtEq => Self::MAG,
            _ => Self::RESET,
        }
    }
}
