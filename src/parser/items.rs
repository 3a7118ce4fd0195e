//! Cursor over the items of one s-expression list.
//!
//! Flat instructions take their immediates from the following siblings and
//! folded instructions from their own children, so both read through the
//! same cursor.

use crate::ast::{Id, Index};
use crate::error::{Diagnostic, SyntaxErrorKind};
use crate::wat::sexpr::{SExpr, SExprList};
use crate::wat::{Span, Token, TokenKind};

#[derive(Debug, Clone, Copy)]
pub(super) struct Items<'a> {
    items: &'a [SExpr],
    pos: usize,
    /// Span of the enclosing list, reported when items run out.
    span: Span,
}

impl<'a> Items<'a> {
    pub fn new(items: &'a [SExpr], span: Span) -> Self {
        Self { items, pos: 0, span }
    }

    /// The items of `list` after its head keyword.
    pub fn tail_of(list: SExprList<'a>) -> Self {
        Self {
            items: list.items,
            pos: 1.min(list.items.len()),
            span: list.span,
        }
    }

    pub fn peek(&self) -> Option<&'a SExpr> {
        self.items.get(self.pos)
    }

    pub fn next(&mut self) -> Option<&'a SExpr> {
        let item = self.items.get(self.pos)?;
        self.pos += 1;
        Some(item)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.items.len()
    }

    /// The items not yet consumed.
    pub fn remaining(&self) -> &'a [SExpr] {
        self.items.get(self.pos..).unwrap_or(&[])
    }

    /// Consume everything left, returning it as a cursor of its own.
    pub fn take_rest(&mut self) -> Items<'a> {
        let rest = *self;
        self.pos = self.items.len();
        rest
    }

    /// Consume the lists before the first one headed by `keyword`, returning
    /// them as a cursor of their own. Anything other than a list is an error.
    pub fn take_lists_until(&mut self, keyword: &str) -> Result<Items<'a>, Diagnostic> {
        let start = self.pos;
        while !self.is_empty() && !self.peek_list(keyword) {
            if self.peek().and_then(SExpr::as_list).is_none() {
                return Err(self.expected(&format!("'({keyword} ...)'")));
            }
            self.pos += 1;
        }
        Ok(Items::new(&self.items[start..self.pos], self.span))
    }

    /// Span to blame when something is missing: the next item, or the
    /// closing end of the enclosing list.
    pub fn here(&self) -> Span {
        match self.peek() {
            Some(item) => item.span(),
            None => Span::new(self.span.end.saturating_sub(1), self.span.end, self.span.line, self.span.column),
        }
    }

    pub fn peek_keyword(&self) -> Option<&'a str> {
        self.peek().and_then(SExpr::as_keyword)
    }

    /// True if the next item is a list headed by `keyword`.
    pub fn peek_list(&self, keyword: &str) -> bool {
        self.peek().map_or(false, |s| s.is_list_headed_by(keyword))
    }

    /// Consume the next item if it is the keyword `keyword`.
    pub fn take_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword() == Some(keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Consume the next item if it is a list headed by `keyword`.
    pub fn take_list(&mut self, keyword: &str) -> Option<SExprList<'a>> {
        if self.peek_list(keyword) {
            self.next().and_then(SExpr::as_list)
        } else {
            None
        }
    }

    /// Consume an optional `$id`.
    pub fn take_id(&mut self) -> Option<Id> {
        let id = self.peek().and_then(SExpr::as_id).map(Id::new);
        if id.is_some() {
            self.pos += 1;
        }
        id
    }

    /// Consume an optional index: an unsigned integer or an `$id`.
    pub fn take_index(&mut self) -> Result<Option<Index>, Diagnostic> {
        match self.peek() {
            Some(SExpr::Atom(token)) => match &token.kind {
                TokenKind::Id(_) | TokenKind::Integer(_) => {
                    self.pos += 1;
                    index_from_token(token).map(Some)
                }
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    pub fn expect_index(&mut self, what: &str) -> Result<Index, Diagnostic> {
        match self.take_index()? {
            Some(index) => Ok(index),
            None => Err(self.expected(what)),
        }
    }

    pub fn expect_list(&mut self, what: &str) -> Result<SExprList<'a>, Diagnostic> {
        match self.peek().and_then(SExpr::as_list) {
            Some(list) => {
                self.pos += 1;
                Ok(list)
            }
            None => Err(self.expected(what)),
        }
    }

    pub fn expect_list_headed(&mut self, keyword: &str) -> Result<SExprList<'a>, Diagnostic> {
        match self.take_list(keyword) {
            Some(list) => Ok(list),
            None => Err(self.expected(&format!("'({keyword} ...)'"))),
        }
    }

    pub fn expect_keyword(&mut self, what: &str) -> Result<(&'a str, Span), Diagnostic> {
        match self.peek() {
            Some(item) => match item.as_keyword() {
                Some(kw) => {
                    self.pos += 1;
                    Ok((kw, item.span()))
                }
                None => Err(self.expected(what)),
            },
            None => Err(self.expected(what)),
        }
    }

    pub fn expect_string(&mut self, what: &str) -> Result<(&'a [u8], Span), Diagnostic> {
        match self.peek() {
            Some(item) => match item.as_string() {
                Some(bytes) => {
                    self.pos += 1;
                    Ok((bytes, item.span()))
                }
                None => Err(self.expected(what)),
            },
            None => Err(self.expected(what)),
        }
    }

    /// A string that must be valid UTF-8, such as an import or export name.
    pub fn expect_name(&mut self) -> Result<String, Diagnostic> {
        let (bytes, span) = self.expect_string("name string")?;
        String::from_utf8(bytes.to_vec())
            .map_err(|_| Diagnostic::syntax(SyntaxErrorKind::MalformedLiteral, "name is not valid UTF-8", span))
    }

    /// Consume a bare unsigned 32-bit integer.
    pub fn expect_u32(&mut self, what: &str) -> Result<u32, Diagnostic> {
        match self.peek().and_then(SExpr::as_atom) {
            Some(token) if matches!(token.kind, TokenKind::Integer(_)) => {
                self.pos += 1;
                u32_from_token(token)
            }
            _ => Err(self.expected(what)),
        }
    }

    /// Consume an optional bare unsigned 32-bit integer.
    pub fn take_u32(&mut self) -> Result<Option<u32>, Diagnostic> {
        match self.peek().and_then(SExpr::as_atom) {
            Some(token) if matches!(token.kind, TokenKind::Integer(_)) => {
                self.pos += 1;
                u32_from_token(token).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Fail unless every item has been consumed.
    pub fn finish(&self) -> Result<(), Diagnostic> {
        match self.peek() {
            None => Ok(()),
            Some(item) => Err(Diagnostic::unexpected(format!("unexpected {}", item.describe()), item.span())),
        }
    }

    /// "expected X, found Y" at the current position.
    pub fn expected(&self, what: &str) -> Diagnostic {
        let found = match self.peek() {
            Some(item) => item.describe(),
            None => "end of list".to_string(),
        };
        Diagnostic::unexpected(format!("expected {what}, found {found}"), self.here())
    }
}

fn u32_from_token(token: &Token) -> Result<u32, Diagnostic> {
    match &token.kind {
        TokenKind::Integer(lit) => lit.to_u32().ok_or_else(|| {
            Diagnostic::syntax(
                SyntaxErrorKind::MalformedLiteral,
                format!("{lit} is not an unsigned 32-bit integer"),
                token.span,
            )
        }),
        other => Err(Diagnostic::unexpected(
            format!("expected integer, found {}", other.describe()),
            token.span,
        )),
    }
}

fn index_from_token(token: &Token) -> Result<Index, Diagnostic> {
    match &token.kind {
        TokenKind::Id(name) => Ok(Index::Id(Id::new(name.as_str()), token.span)),
        _ => u32_from_token(token).map(|n| Index::Num(n, token.span)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wat::sexpr::read_all;

    fn with_items<T>(source: &str, f: impl FnOnce(Items<'_>) -> T) -> T {
        let forms = read_all(source).unwrap();
        let list = forms[0].as_list().unwrap();
        f(Items::tail_of(list))
    }

    #[test]
    fn optional_id_and_index() {
        with_items("(func $f 3 $g)", |mut items| {
            assert_eq!(items.take_id(), Some(Id::new("f")));
            assert_eq!(items.take_index().unwrap().and_then(|i| i.as_num()), Some(3));
            let named = items.expect_index("index").unwrap();
            assert_eq!(named.to_string(), "$g");
            assert!(items.is_empty());
            assert!(items.finish().is_ok());
        });
    }

    #[test]
    fn signed_index_is_malformed() {
        with_items("(call -1)", |mut items| {
            let err = items.take_index().unwrap_err();
            assert_eq!(err.kind, crate::error::ErrorKind::Syntax(SyntaxErrorKind::MalformedLiteral));
        });
    }

    #[test]
    fn expected_reports_what_was_found() {
        with_items("(export 1)", |mut items| {
            let err = items.expect_name().unwrap_err();
            assert_eq!(err.message, "expected name string, found integer");
        });
        with_items("(start)", |mut items| {
            let err = items.expect_index("function index").unwrap_err();
            assert_eq!(err.message, "expected function index, found end of list");
            assert_eq!(err.span.map(|s| s.start), Some(6));
        });
    }

    #[test]
    fn take_list_only_matches_head() {
        with_items("(func (param i32) (result i32))", |mut items| {
            assert!(items.take_list("result").is_none());
            assert!(items.take_list("param").is_some());
            assert!(items.peek_list("result"));
        });
    }

    #[test]
    fn lists_before_a_keyword() {
        with_items("(if (a) (b) (then) (else))", |mut items| {
            let mut condition = items.take_lists_until("then").unwrap();
            assert_eq!(condition.remaining().len(), 2);
            assert!(condition.next().is_some_and(|item| item.is_list_headed_by("a")));
            assert!(items.peek_list("then"));
        });
        with_items("(if (a) nop (then))", |mut items| {
            let err = items.take_lists_until("then").unwrap_err();
            assert_eq!(err.message, "expected '(then ...)', found keyword 'nop'");
        });
    }

    #[test]
    fn take_rest_leaves_nothing_behind() {
        with_items("(func nop nop)", |mut items| {
            let rest = items.take_rest();
            assert!(items.is_empty());
            assert_eq!(rest.remaining().len(), 2);
        });
    }
}
