//! The lexer: turns source text into a flat token stream.
//!
//! Built the same way as the teacher's tokenizer — an ordered list of
//! anchored regexes tried in turn — rather than the original C
//! compiler's character-at-a-time buffer. One deliberate difference
//! from a naive tokenizer: numbers never swallow a leading `-` here.
//! `Minus` is always its own token; the parser (not the lexer) decides,
//! based on grammatical position, whether a `Minus` immediately
//! followed by a `Number` is a negative literal or a binary operator
//! (spec.md §9 "negative literal vs. subtraction"). This mirrors the
//! original's split between `get_number` and `get_operator` without
//! needing the lexer to know anything about parser state.

use std::fmt;

use derive_more::Display;
use regex::Regex;

use crate::common::Position;
use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum TokenKind {
    #[display("identifier")]
    Ident,
    #[display("number")]
    Number,
    #[display("fonction")]
    Fonction,
    #[display("entier")]
    Entier,
    #[display("rien")]
    Rien,
    #[display("si")]
    Si,
    #[display("sinon")]
    Sinon,
    #[display("tantque")]
    Tantque,
    #[display("retourner")]
    Retourner,
    #[display("ET")]
    Et,
    #[display("OU")]
    Ou,
    #[display("(")]
    LParen,
    #[display(")")]
    RParen,
    #[display("{{")]
    LBrace,
    #[display("}}")]
    RBrace,
    #[display(":")]
    Colon,
    #[display(",")]
    Comma,
    #[display(";")]
    Semicolon,
    #[display("=")]
    Equals,
    #[display("+")]
    Plus,
    #[display("-")]
    Minus,
    #[display("*")]
    Star,
    #[display("/")]
    Slash,
    #[display("<=")]
    Le,
    #[display("<")]
    Lt,
    #[display(">=")]
    Ge,
    #[display(">")]
    Gt,
    #[display("==")]
    EqEq,
    #[display("!=")]
    Ne,
    #[display("end of input")]
    Eof,
}

#[derive(Debug, Clone, Display)]
#[display("{kind} '{text}'")]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub pos: Position,
}

fn keyword(word: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match word {
        "fonction" => Fonction,
        "entier" => Entier,
        "rien" => Rien,
        "si" => Si,
        "sinon" => Sinon,
        "tantque" => Tantque,
        "retourner" => Retourner,
        "ET" => Et,
        "OU" => Ou,
        _ => return None,
    })
}

/// Fixed operator/punctuation matchers, longest-first so `<=` is not
/// mis-tokenized as `<` followed by `=`.
fn symbol_matchers() -> &'static [(&'static str, TokenKind)] {
    use TokenKind::*;
    &[
        ("<=", Le),
        (">=", Ge),
        ("==", EqEq),
        ("!=", Ne),
        ("(", LParen),
        (")", RParen),
        ("{", LBrace),
        ("}", RBrace),
        (":", Colon),
        (",", Comma),
        (";", Semicolon),
        ("=", Equals),
        ("+", Plus),
        ("-", Minus),
        ("*", Star),
        ("/", Slash),
        ("<", Lt),
        (">", Gt),
    ]
}

pub struct Lexer<'src> {
    input: &'src str,
    pos: usize,
    line: usize,
    col: usize,
    whitespace: Regex,
    ident: Regex,
    number: Regex,
}

impl<'src> Lexer<'src> {
    pub fn new(input: &'src str) -> Self {
        Lexer {
            input,
            pos: 0,
            line: 1,
            col: 1,
            whitespace: Regex::new(r"\A(?:[ \t\r\n]|//[^\n]*)+").unwrap(),
            ident: Regex::new(r"\A[A-Za-z_][A-Za-z0-9_]*").unwrap(),
            number: Regex::new(r"\A[0-9]+").unwrap(),
        }
    }

    pub fn end_of_input(&self) -> bool {
        self.pos == self.input.len()
    }

    fn position(&self) -> Position {
        Position { line: self.line, col: self.col }
    }

    fn advance(&mut self, n: usize) {
        for ch in self.input[self.pos..self.pos + n].chars() {
            if ch == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
        }
        self.pos += n;
    }

    fn skip_whitespace(&mut self) {
        if let Some(m) = self.whitespace.find(&self.input[self.pos..]) {
            self.advance(m.end());
        }
    }

    /// Produce the next token, or `None` at end of input.
    pub fn next(&mut self) -> Result<Option<Token>, CompileError> {
        self.skip_whitespace();
        if self.end_of_input() {
            return Ok(None);
        }
        let pos = self.position();
        let rest = &self.input[self.pos..];

        if let Some(m) = self.ident.find(rest) {
            let text = m.as_str().to_string();
            let kind = keyword(&text).unwrap_or(TokenKind::Ident);
            self.advance(m.end());
            return Ok(Some(Token { kind, text, pos }));
        }
        if let Some(m) = self.number.find(rest) {
            let text = m.as_str().to_string();
            self.advance(m.end());
            return Ok(Some(Token { kind: TokenKind::Number, text, pos }));
        }
        for (lexeme, kind) in symbol_matchers() {
            if rest.starts_with(lexeme) {
                self.advance(lexeme.len());
                return Ok(Some(Token { kind: *kind, text: (*lexeme).to_string(), pos }));
            }
        }

        let bad = rest.chars().next().unwrap();
        Err(CompileError::lex(format!("unexpected character {bad:?}"), pos))
    }

    /// Tokenize the whole input, for `--emit tokens` and for the parser,
    /// which wants random lookahead rather than a pull interface.
    pub fn tokenize(mut self) -> Result<Vec<Token>, CompileError> {
        let mut out = Vec::new();
        while let Some(tok) = self.next()? {
            out.push(tok);
        }
        Ok(out)
    }
}

impl fmt::Debug for Lexer<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lexer").field("pos", &self.pos).finish()
    }
}
