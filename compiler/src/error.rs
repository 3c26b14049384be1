//! Error types for the lex/parse/check passes.
//!
//! Each pass fails fast with its own error kind; [`CompileError`] unifies
//! them so pipeline-driving code can propagate with `?`.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct LexError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StaticError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

macro_rules! impl_located_error {
    ($ty:ident) => {
        impl $ty {
            pub fn new(message: impl Into<String>, line: usize, column: usize) -> Self {
                $ty {
                    message: message.into(),
                    line,
                    column,
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(
                    f,
                    "{} at line {}, column {}",
                    self.message, self.line, self.column
                )
            }
        }

        impl std::error::Error for $ty {}
    };
}

impl_located_error!(LexError);
impl_located_error!(ParseError);
impl_located_error!(StaticError);

#[derive(Debug, Clone, PartialEq)]
pub enum CompileError {
    Lex(LexError),
    Parse(ParseError),
    Static(StaticError),
}

impl From<LexError> for CompileError {
    fn from(e: LexError) -> Self {
        CompileError::Lex(e)
    }
}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl From<StaticError> for CompileError {
    fn from(e: StaticError) -> Self {
        CompileError::Static(e)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Lex(e) => write!(f, "lex error: {e}"),
            CompileError::Parse(e) => write!(f, "parse error: {e}"),
            CompileError::Static(e) => write!(f, "static error: {e}"),
        }
    }
}

impl std::error::Error for CompileError {}
