use std::fmt::{self, Display, Formatter};

use compact_str::CompactString;

use crate::range::Range;

#[derive(PartialEq, Debug, Clone)]
pub struct Token {
    pub range: Range,
    pub kind: TokenKind,
}

impl Token {
    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }
}

/// The four lexical classes of the language, plus end-of-input.
///
/// Symbols are always a single character; multi-character operators such as
/// `<=` or `&&` are assembled by the parser from adjacent symbol tokens.
#[derive(PartialEq, Debug, Clone)]
pub enum TokenKind {
    Ident(CompactString),
    NumberLit(f64),
    StringLit(String),
    Symbol(char),
    Eof,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(f, "{}", self.kind)
    }
}

impl Display for TokenKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match &self {
            TokenKind::Ident(name) => write!(f, "{}", name),
            TokenKind::NumberLit(n) => write!(f, "{}", n),
            TokenKind::StringLit(s) => write!(f, "\"{}\"", s),
            TokenKind::Symbol(c) => write!(f, "{}", c),
            TokenKind::Eof => write!(f, ""),
        }
    }
}
