//! The error taxonomy shared by every compiler stage.
//!
//! Every stage returns `Result<T, CompileError>`; there is no recovery.
//! Whoever drives the pipeline (the CLI, or a test) prints the error's
//! `Display` output and stops.

use std::fmt;

use crate::common::Position;

/// One diagnostic. `kind` names the taxonomy bucket from the error
/// handling design; `message` is the one-line human-readable text;
/// `at` is the buffer position at the point of failure, when one is
/// available (the backend, which operates on an already-validated TAC
/// program, mostly fails without a source position).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub kind: ErrorKind,
    pub message: String,
    pub at: Option<Position>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unterminated token, identifier too long, unexpected character in a lexeme.
    Lex,
    /// Unexpected token/keyword at the grammar level.
    Syntax,
    /// Redeclaration or use of an identifier before its declaration.
    Name,
    /// Condition not boolean, return type mismatch, argument count/type mismatch.
    Type,
    /// More than 8 live temporaries, too many call-registers, stack offset overflow.
    Resource,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Lex => "lex error",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Name => "name error",
            ErrorKind::Type => "type error",
            ErrorKind::Resource => "resource error",
        };
        f.write_str(s)
    }
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        CompileError { kind, message: message.into(), at: None }
    }

    pub fn at(kind: ErrorKind, message: impl Into<String>, pos: Position) -> Self {
        CompileError { kind, message: message.into(), at: Some(pos) }
    }

    pub fn lex(message: impl Into<String>, pos: Position) -> Self {
        Self::at(ErrorKind::Lex, message, pos)
    }

    pub fn syntax(message: impl Into<String>, pos: Position) -> Self {
        Self::at(ErrorKind::Syntax, message, pos)
    }

    pub fn name(message: impl Into<String>, pos: Position) -> Self {
        Self::at(ErrorKind::Name, message, pos)
    }

    pub fn ty(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Type, message)
    }

    pub fn ty_at(message: impl Into<String>, pos: Position) -> Self {
        Self::at(ErrorKind::Type, message, pos)
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Resource, message)
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.at {
            Some(pos) => write!(f, "{} at {}: {}", self.kind, pos, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for CompileError {}

pub type Result<T> = std::result::Result<T, CompileError>;
