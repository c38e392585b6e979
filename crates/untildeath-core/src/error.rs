//! Lex/parse errors. Both are surfaced only at parse time and are never
//! catchable from inside a running program (unlike runtime/user errors,
//! which live in `untildeath-interp::error`).

use crate::lexer::LexError;
use crate::parser::ParseError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SyntaxError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

impl SyntaxError {
    pub fn line(&self) -> usize {
        match self {
            SyntaxError::Lex(e) => e.line,
            SyntaxError::Parse(e) => e.line,
        }
    }

    pub fn column(&self) -> usize {
        match self {
            SyntaxError::Lex(e) => e.column,
            SyntaxError::Parse(e) => e.column,
        }
    }
}
