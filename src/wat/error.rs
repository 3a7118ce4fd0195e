//! Error types for WAT lexing.

use super::token::Span;
use serde::Serialize;
use thiserror::Error;

/// What went wrong while tokenising.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LexErrorKind {
    UnterminatedString,
    InvalidEscape,
    InvalidNumber,
    UnterminatedBlockComment,
    /// A character that cannot start or continue a token, or bytes that are
    /// not valid UTF-8.
    UnexpectedCharacter,
}

/// An error encountered during lexical analysis.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{span}: {message}")]
#[must_use]
pub struct LexError {
    pub kind: LexErrorKind,
    /// Human-readable description of the error.
    pub message: String,
    /// Location in source where the error occurred.
    pub span: Span,
}

impl LexError {
    pub fn new(kind: LexErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            message: message.into(),
            span,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = LexError::new(
            LexErrorKind::UnexpectedCharacter,
            "unexpected character '{'",
            Span::new(10, 11, 3, 5),
        );
        assert_eq!(format!("{err}"), "3:5: unexpected character '{'");
    }
}
