//! Crate-wide error taxonomy.
//!
//! Mirrors the error classes of spec.md §7: lexical and syntactic errors
//! stay local to the line that produced them (the REPL reprints the prompt),
//! while I/O errors bubble up from the few fallible syscalls the executor
//! cannot recover from on its own.

use std::fmt;
use thiserror::Error;

/// Failure while turning a raw input line into a token sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LexError {
    #[error("unterminated single quote")]
    UnterminatedSingleQuote,
    #[error("unterminated double quote")]
    UnterminatedDoubleQuote,
    #[error("too many tokens")]
    TooManyTokens,
    #[error("token too long")]
    TokenTooLong,
}

/// Top-level error type returned by the lexer, parser, job table, and
/// executor.
#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{0}")]
    Lex(#[from] LexError),

    #[error("{0}")]
    Syntax(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("job table is full")]
    JobTableFull,

    #[error("no such job: {0}")]
    NoSuchJob(u32),

    #[error("job {0} is not stopped")]
    NotStopped(u32),
}

impl ShellError {
    pub fn syntax(msg: impl fmt::Display) -> ShellError {
        ShellError::Syntax(msg.to_string())
    }
}

pub type ShellResult<T> = Result<T, ShellError>;
