//! Character-level cursor over WAT source text.
//!
//! Tracks byte offset, line and column while the lexer walks the input, so
//! every token and error can carry an accurate [`Span`].

use super::token::Span;

/// A saved position in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// Byte offset from start of source.
    pub offset: usize,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, counts characters).
    pub column: u32,
}

impl Position {
    /// Span from this position to `end`.
    #[must_use]
    pub fn span_to(self, end: &Position) -> Span {
        Span::new(self.offset, end.offset, self.line, self.column)
    }
}

pub struct Cursor<'a> {
    source: &'a str,
    remaining: &'a str,
    offset: usize,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            remaining: source,
            offset: 0,
            line: 1,
            column: 1,
        }
    }

    /// Create a cursor at a previously saved position in the same source.
    ///
    /// Returns `None` if the position is outside the source or not on a
    /// character boundary.
    pub fn resume(source: &'a str, at: Position) -> Option<Self> {
        let remaining = source.get(at.offset..)?;
        Some(Self {
            source,
            remaining,
            offset: at.offset,
            line: at.line,
            column: at.column,
        })
    }

    pub fn position(&self) -> Position {
        Position {
            offset: self.offset,
            line: self.line,
            column: self.column,
        }
    }

    pub fn is_eof(&self) -> bool {
        self.remaining.is_empty()
    }

    pub fn peek(&self) -> Option<char> {
        self.remaining.chars().next()
    }

    pub fn peek_second(&self) -> Option<char> {
        let mut chars = self.remaining.chars();
        chars.next();
        chars.next()
    }

    /// Consume and return the next character, updating line and column.
    pub fn advance(&mut self) -> Option<char> {
        let c = self.remaining.chars().next()?;
        let len = c.len_utf8();
        self.remaining = &self.remaining[len..];
        self.offset += len;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    /// Consume characters while the predicate holds, returning the consumed text.
    pub fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> &'a str {
        let start = self.offset;
        self.skip_while(predicate);
        &self.source[start..self.offset]
    }

    /// Consume characters while the predicate holds, returning how many.
    pub fn skip_while(&mut self, predicate: impl Fn(char) -> bool) -> usize {
        let mut count = 0;
        while let Some(c) = self.peek() {
            if !predicate(c) {
                break;
            }
            self.advance();
            count += 1;
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newlines_reset_column() {
        let mut cursor = Cursor::new("ab\nc");
        cursor.skip_while(|c| c != 'c');
        let pos = cursor.position();
        assert_eq!((pos.offset, pos.line, pos.column), (3, 2, 1));
    }

    #[test]
    fn columns_count_characters() {
        let mut cursor = Cursor::new("λx");
        cursor.advance();
        let pos = cursor.position();
        assert_eq!((pos.offset, pos.column), (2, 2));
        assert_eq!(cursor.peek(), Some('x'));
    }

    #[test]
    fn peek_does_not_consume() {
        let mut cursor = Cursor::new("xy");
        assert_eq!(cursor.peek(), Some('x'));
        assert_eq!(cursor.peek_second(), Some('y'));
        assert_eq!(cursor.advance(), Some('x'));
        assert_eq!(cursor.peek_second(), None);
        cursor.advance();
        assert!(cursor.is_eof());
        assert_eq!(cursor.advance(), None);
    }

    #[test]
    fn take_while_returns_consumed_text() {
        let mut cursor = Cursor::new("abc123 rest");
        let start = cursor.position();
        assert_eq!(cursor.take_while(|c| c.is_ascii_alphanumeric()), "abc123");
        assert_eq!(cursor.take_while(|c| c == 'x'), "");
        let span = start.span_to(&cursor.position());
        assert_eq!((span.start, span.end), (0, 6));
    }

    #[test]
    fn resume_from_saved_position() {
        let source = "ab\ncd";
        let mut cursor = Cursor::new(source);
        cursor.skip_while(|c| c != 'c');
        let saved = cursor.position();
        cursor.advance();

        let resumed = Cursor::resume(source, saved).unwrap();
        assert_eq!(resumed.peek(), Some('c'));
        assert_eq!(resumed.position().line, 2);
        let outside = Position {
            offset: 99,
            line: 1,
            column: 1,
        };
        assert!(Cursor::resume(source, outside).is_none());
    }
}
