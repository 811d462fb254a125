//! Preprocessing tokens (spec §4.1).

use serde::{Deserialize, Serialize};

/// The kind of a preprocessing token. `HASH` is only produced at the
/// beginning of a logical line; `#` elsewhere lexes as an ordinary
/// `PUNCTUATOR` (the stringification operator is recognized by the expander,
/// not the lexer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TokenKind {
    Identifier(String),
    /// A pp-number: starts with a digit or `.digit`, continues through
    /// digits, identifier-continue characters, `.`, and signed exponents
    /// (`1e+10`, `0x1p-3`). Kept as raw text; numeric interpretation happens
    /// in the conditional evaluator or the parser, as needed.
    Number(String),
    Str(String),
    CharConst(String),
    Punctuator(String),
    Hash,
    HashHash,
    /// Only produced when the lexer is asked to scan in include-directive
    /// context (`<...>` or a bare `"..."` after `#include`).
    HeaderName(String),
    Whitespace,
    Newline,
    Eof,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub col: u32,
    /// `true` if at least one whitespace/comment token preceded this one on
    /// the same logical line; macro expansion and stringification both need
    /// to know this to reproduce GCC-compatible spacing.
    pub leading_space: bool,
    /// `true` if this token is the first non-whitespace token of its
    /// logical line (the only position where `#` lexes as `Hash`).
    pub bol: bool,
}

impl Token {
    pub fn new(kind: TokenKind, line: u32, col: u32) -> Self {
        Token { kind, line, col, leading_space: false, bol: false }
    }

    pub fn is_eof(&self) -> bool {
        matches!(self.kind, TokenKind::Eof)
    }

    pub fn is_identifier(&self, name: &str) -> bool {
        matches!(&self.kind, TokenKind::Identifier(s) if s == name)
    }

    pub fn is_punct(&self, p: &str) -> bool {
        matches!(&self.kind, TokenKind::Punctuator(s) if s == p)
    }

    pub fn text(&self) -> String {
        match &self.kind {
            TokenKind::Identifier(s) | TokenKind::Number(s) | TokenKind::Punctuator(s) => {
                s.clone()
            }
            TokenKind::Str(s) => format!("\"{s}\""),
            TokenKind::CharConst(s) => format!("'{s}'"),
            TokenKind::HeaderName(s) => s.clone(),
            TokenKind::Hash => "#".to_string(),
            TokenKind::HashHash => "##".to_string(),
            TokenKind::Whitespace => " ".to_string(),
            TokenKind::Newline => "\n".to_string(),
            TokenKind::Eof => String::new(),
        }
    }
}
