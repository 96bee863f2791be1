//! `intech` — an ahead-of-time compiler for a small French-keyword
//! imperative language, lowering to x86-64 System V / Win64 assembly.
//!
//! See `src/bin/intechc.rs` for the command-line driver built on top of
//! this library.

pub mod back;
pub mod common;
pub mod driver;
pub mod error;
pub mod front;
pub mod middle;
