//! Diagnostics returned by a failed translation.
//!
//! Every stage reports failure as a [`Diagnostic`]. The first diagnostic
//! aborts the pipeline; no partial output is produced.

use crate::wat::sexpr::ReadError;
use crate::wat::{LexError, LexErrorKind, Span};
use serde::Serialize;
use std::fmt;

/// Why the parser rejected well-tokenised input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyntaxErrorKind {
    /// A token or form that does not fit the grammar here, including
    /// premature end of input.
    UnexpectedToken,
    /// A keyword that names no module field, instruction or type, or an
    /// instruction whose feature is disabled.
    UnknownKeyword,
    UnbalancedParens,
    /// Lists or blocks nested deeper than the translator accepts.
    NestingTooDeep,
    /// A literal with the right shape but an unusable value, such as an
    /// out-of-range integer or a non-power-of-two alignment.
    MalformedLiteral,
}

/// Error class, ordered by the pipeline stage that produces it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Lex(LexErrorKind),
    Syntax(SyntaxErrorKind),
    DuplicateSymbol,
    UnresolvedSymbol,
    InvalidLabel,
    TypeMismatch,
    IndexOutOfRange,
    /// A broken internal invariant. Always a defect, never caused by input.
    Internal,
}

impl ErrorKind {
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::Lex(_) => "lex error",
            ErrorKind::Syntax(_) => "syntax error",
            ErrorKind::DuplicateSymbol => "duplicate symbol",
            ErrorKind::UnresolvedSymbol => "unresolved symbol",
            ErrorKind::InvalidLabel => "invalid label",
            ErrorKind::TypeMismatch => "type mismatch",
            ErrorKind::IndexOutOfRange => "index out of range",
            ErrorKind::Internal => "internal error",
        }
    }
}

/// A translation failure: what kind, a human-readable message, and where.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub kind: ErrorKind,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn new(kind: ErrorKind, message: impl Into<String>, span: impl Into<Option<Span>>) -> Self {
        Self {
            kind,
            message: message.into(),
            span: span.into(),
        }
    }

    pub fn syntax(kind: SyntaxErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::Syntax(kind), message, span)
    }

    pub fn unexpected(message: impl Into<String>, span: Span) -> Self {
        Self::syntax(SyntaxErrorKind::UnexpectedToken, message, span)
    }

    pub fn duplicate(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::DuplicateSymbol, message, span)
    }

    pub fn unresolved(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::UnresolvedSymbol, message, span)
    }

    pub fn invalid_label(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::InvalidLabel, message, span)
    }

    pub fn type_mismatch(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::TypeMismatch, message, span)
    }

    pub fn out_of_range(message: impl Into<String>, span: Span) -> Self {
        Self::new(ErrorKind::IndexOutOfRange, message, span)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message, None)
    }

    /// Serialise as a single-line JSON object for tooling.
    pub fn to_json(&self) -> String {
        // Every field serialises infallibly.
        serde_json::to_string(self).unwrap_or_else(|_| format!("{{\"message\":{:?}}}", self.message))
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(span) => write!(f, "{span}: {}: {}", self.kind.name(), self.message),
            None => write!(f, "{}: {}", self.kind.name(), self.message),
        }
    }
}

impl std::error::Error for Diagnostic {}

impl From<LexError> for Diagnostic {
    fn from(e: LexError) -> Self {
        Diagnostic::new(ErrorKind::Lex(e.kind), e.message, e.span)
    }
}

impl From<ReadError> for Diagnostic {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::Lex(e) => e.into(),
            ReadError::Unbalanced { message, span } => {
                Diagnostic::syntax(SyntaxErrorKind::UnbalancedParens, message, span)
            }
            ReadError::TooDeep { span } => Diagnostic::syntax(
                SyntaxErrorKind::NestingTooDeep,
                format!("lists nested more than {} deep", crate::wat::sexpr::MAX_NESTING),
                span,
            ),
        }
    }
}
