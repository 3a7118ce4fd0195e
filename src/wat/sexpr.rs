//! S-expression tree for WAT parsing.
//!
//! WAT is an S-expression language, so parsing happens in two phases:
//!
//! 1. **Tokens -> S-expression tree**: parentheses are matched and tokens
//!    grouped. Unbalanced input is rejected here.
//! 2. **S-expression tree -> syntax tree**: done by [`crate::parser`], which
//!    can look at a whole list before deciding what it is.
//!
//! ```
//! use watc::wat::sexpr::read_all;
//!
//! let forms = read_all("(module (func $add (param i32 i32) (result i32)))").unwrap();
//! let module = forms[0].as_list().unwrap();
//! assert_eq!(module.head_keyword(), Some("module"));
//! assert_eq!(module.len(), 2);
//! ```

use super::error::LexError;
use super::lexer::Lexer;
use super::token::{Span, Token, TokenKind};
use std::fmt;
use thiserror::Error;

// ============================================================================
// Error Type
// ============================================================================

/// An error encountered while reading S-expressions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReadError {
    #[error(transparent)]
    Lex(#[from] LexError),

    /// A `(` without its `)`, or a `)` without its `(`.
    #[error("{span}: {message}")]
    Unbalanced { message: String, span: Span },

    /// A `(` opening a list deeper than [`MAX_NESTING`].
    #[error("{span}: lists nested more than {MAX_NESTING} deep")]
    TooDeep { span: Span },
}

impl ReadError {
    pub fn span(&self) -> Span {
        match self {
            ReadError::Lex(e) => e.span,
            ReadError::Unbalanced { span, .. } => *span,
            ReadError::TooDeep { span } => *span,
        }
    }
}

// ============================================================================
// S-Expression Types
// ============================================================================

/// An S-expression: either an atom (single token) or a parenthesised list.
#[derive(Debug, Clone, PartialEq)]
pub enum SExpr {
    Atom(Token),

    /// The span covers the entire list including the parentheses.
    List { span: Span, items: Vec<SExpr> },
}

impl SExpr {
    pub fn span(&self) -> Span {
        match self {
            SExpr::Atom(token) => token.span,
            SExpr::List { span, .. } => *span,
        }
    }

    pub fn as_atom(&self) -> Option<&Token> {
        match self {
            SExpr::Atom(token) => Some(token),
            SExpr::List { .. } => None,
        }
    }

    pub fn as_list(&self) -> Option<SExprList<'_>> {
        match self {
            SExpr::Atom(_) => None,
            SExpr::List { span, items } => Some(SExprList { span: *span, items }),
        }
    }

    /// The keyword text, if this is a keyword atom.
    pub fn as_keyword(&self) -> Option<&str> {
        match self {
            SExpr::Atom(Token {
                kind: TokenKind::Keyword(kw),
                ..
            }) => Some(kw),
            _ => None,
        }
    }

    /// The identifier name (without `$`), if this is an id atom.
    pub fn as_id(&self) -> Option<&str> {
        match self {
            SExpr::Atom(Token {
                kind: TokenKind::Id(id),
                ..
            }) => Some(id),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&[u8]> {
        match self {
            SExpr::Atom(Token {
                kind: TokenKind::String(bytes),
                ..
            }) => Some(bytes),
            _ => None,
        }
    }

    /// True if this is a list whose first item is `keyword`.
    pub fn is_list_headed_by(&self, keyword: &str) -> bool {
        self.as_list()
            .map(|list| list.head_keyword() == Some(keyword))
            .unwrap_or(false)
    }

    /// Short description used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            SExpr::Atom(token) => token.kind.describe(),
            SExpr::List { items, .. } => match items.first().and_then(SExpr::as_keyword) {
                Some(kw) => format!("'({kw} ...)'"),
                None => "list".to_string(),
            },
        }
    }
}

// ============================================================================
// List View
// ============================================================================

/// A borrowed view of an S-expression list.
///
/// Most WAT constructs follow the pattern `(keyword arg1 arg2 ...)`.
#[derive(Debug, Clone, Copy)]
pub struct SExprList<'a> {
    pub span: Span,
    pub items: &'a [SExpr],
}

impl<'a> SExprList<'a> {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn head(&self) -> Option<&'a SExpr> {
        self.items.first()
    }

    /// Everything after the head.
    pub fn tail(&self) -> &'a [SExpr] {
        self.items.get(1..).unwrap_or(&[])
    }

    pub fn head_keyword(&self) -> Option<&'a str> {
        self.head().and_then(|s| s.as_keyword())
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Deepest list nesting [`read_all`] accepts. Later stages walk the tree
/// recursively, and dropping it recurses too.
pub const MAX_NESTING: usize = 1000;

/// Reads every top-level S-expression in `source`.
///
/// Nesting is tracked with an explicit stack and capped at [`MAX_NESTING`].
pub fn read_all(source: &str) -> Result<Vec<SExpr>, ReadError> {
    // Each open list: its opening span and the items read so far.
    let mut open: Vec<(Span, Vec<SExpr>)> = Vec::new();
    let mut top = Vec::new();

    for token in Lexer::new(source) {
        let token = token?;
        match token.kind {
            TokenKind::LeftParen => {
                if open.len() == MAX_NESTING {
                    return Err(ReadError::TooDeep { span: token.span });
                }
                open.push((token.span, Vec::new()));
            }
            TokenKind::RightParen => {
                let Some((start, items)) = open.pop() else {
                    return Err(ReadError::Unbalanced {
                        message: "unexpected ')'".to_string(),
                        span: token.span,
                    });
                };
                let list = SExpr::List {
                    span: start.to(token.span),
                    items,
                };
                match open.last_mut() {
                    Some((_, parent)) => parent.push(list),
                    None => top.push(list),
                }
            }
            _ => match open.last_mut() {
                Some((_, parent)) => parent.push(SExpr::Atom(token)),
                None => top.push(SExpr::Atom(token)),
            },
        }
    }

    match open.pop() {
        // Report the innermost unclosed list.
        Some((start, _)) => Err(ReadError::Unbalanced {
            message: "unclosed '('".to_string(),
            span: start,
        }),
        None => Ok(top),
    }
}

// ============================================================================
// Display
// ============================================================================

impl fmt::Display for SExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SExpr::Atom(token) => write!(f, "{}", token.kind),
            SExpr::List { items, .. } => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wat::LexErrorKind;

    #[test]
    fn reads_nested_lists() {
        let forms = read_all("(module (func (nop)) (memory 1))").unwrap();
        assert_eq!(forms.len(), 1);
        let module = forms[0].as_list().unwrap();
        assert_eq!(module.head_keyword(), Some("module"));
        assert_eq!(module.tail().len(), 2);
        assert!(module.items[1].is_list_headed_by("func"));
        assert_eq!(format!("{}", forms[0]), "(module (func (nop)) (memory 1))");
    }

    #[test]
    fn list_span_covers_parens() {
        let forms = read_all("  (a\n b)").unwrap();
        let span = forms[0].span();
        assert_eq!((span.start, span.end, span.line, span.column), (2, 8, 1, 3));
    }

    #[test]
    fn multiple_top_level_forms() {
        let forms = read_all("(func) (memory 1) nop").unwrap();
        assert_eq!(forms.len(), 3);
        assert_eq!(forms[2].as_keyword(), Some("nop"));
    }

    #[test]
    fn empty_list_and_accessors() {
        let forms = read_all("() $x \"s\"").unwrap();
        let empty = forms[0].as_list().unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.head_keyword(), None);
        assert!(empty.tail().is_empty());
        assert_eq!(forms[1].as_id(), Some("x"));
        assert_eq!(forms[2].as_string(), Some(&b"s"[..]));
        assert_eq!(forms[0].describe(), "list");
        assert_eq!(forms[1].describe(), "identifier '$x'");
    }

    #[test]
    fn unclosed_paren_points_at_innermost_open() {
        let err = read_all("(module\n  (func").unwrap_err();
        assert!(matches!(err, ReadError::Unbalanced { .. }));
        assert_eq!((err.span().line, err.span().column), (2, 3));
    }

    #[test]
    fn stray_close_paren() {
        let err = read_all("(module))").unwrap_err();
        assert_eq!(err.span().start, 8);
        assert_eq!(format!("{err}"), "1:9: unexpected ')'");
    }

    #[test]
    fn lex_errors_pass_through() {
        let err = read_all("(module \"open").unwrap_err();
        match err {
            ReadError::Lex(e) => assert_eq!(e.kind, LexErrorKind::UnterminatedString),
            other => panic!("expected lex error, got {other:?}"),
        }
    }

    #[test]
    fn nesting_up_to_the_limit_is_read() {
        let source = format!("{}{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        let forms = read_all(&source).unwrap();
        assert_eq!(forms.len(), 1);
    }

    #[test]
    fn nesting_past_the_limit_is_rejected() {
        let depth = 100_000;
        let source = format!("{}{}", "(".repeat(depth), ")".repeat(depth));
        let err = read_all(&source).unwrap_err();
        assert_eq!(err, ReadError::TooDeep { span: Span::new(MAX_NESTING, MAX_NESTING + 1, 1, MAX_NESTING as u32 + 1) });
    }
}
