//! Crate-level error type (SPEC_FULL §3.7).
//!
//! Unifies the three pipeline failure stages (lex, parse, compile) behind one
//! `Result` error so an embedder building a [`crate::CompiledUnit`] doesn't
//! need to match three different error sources by hand. Dispatch-time and VM
//! soft errors are not part of this type — per spec.md §7 they are non-fatal
//! and surface only through the `log` facade.

use std::fmt;

use crate::{bytecode::CompileError, lexer::LexError, parser::ParseError};

/// Error from the compile pipeline: lexing, parsing, or bytecode lowering.
#[derive(Debug, Clone)]
pub enum RuntimeError {
    /// A lex error: bad byte or unterminated string (spec.md §7 item 1).
    Lex(LexError),
    /// A parse error: unexpected token (spec.md §7 item 2).
    Parse(ParseError),
    /// A compile error: unsupported construct in the minimal opcode lowering
    /// (spec.md §7 item 3).
    Compile(CompileError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lex(e) => write!(f, "lex error: {e}"),
            Self::Parse(e) => write!(f, "parse error: {e}"),
            Self::Compile(e) => write!(f, "compile error: {e}"),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<LexError> for RuntimeError {
    fn from(error: LexError) -> Self {
        Self::Lex(error)
    }
}

impl From<ParseError> for RuntimeError {
    fn from(error: ParseError) -> Self {
        Self::Parse(error)
    }
}

impl From<CompileError> for RuntimeError {
    fn from(error: CompileError) -> Self {
        Self::Compile(error)
    }
}
