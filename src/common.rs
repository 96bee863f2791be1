//! Common definitions that are shared between different parts of the compiler.

// Use sorted sets and maps for consistent output
pub use std::collections::{BTreeMap as Map, BTreeSet as Set};

/// Identifiers. Interning keeps every `Id` a cheap `Copy` handle, so the AST,
/// the symbol tables and the TAC can all pass names around without cloning
/// strings.
pub type Id = internment::Intern<String>;

/// Intern a source-level name.
pub fn intern(name: &str) -> Id {
    internment::Intern::new(name.to_string())
}

/// A line/column snapshot used to anchor diagnostics, the same role the
/// original compiler's buffer-print-on-error played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Position {
    pub line: usize,
    pub col: usize,
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// Which calling convention the assembly emitter targets (spec.md §6
/// "Platform selector"). The original compiler picked this with a
/// `#ifdef WIN32`; here it is a runtime flag so both conventions are
/// reachable from one binary and from tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Platform {
    #[default]
    Sysv,
    Win64,
}

impl Platform {
    /// Integer-argument registers, in calling order.
    pub fn call_registers(self) -> &'static [&'static str] {
        match self {
            Platform::Sysv => &["%rdi", "%rsi", "%rdx", "%rcx", "%r8", "%r9"],
            Platform::Win64 => &["%rcx", "%rdx", "%r8", "%r9"],
        }
    }

    pub fn max_call_args(self) -> usize {
        self.call_registers().len()
    }
}
