//! Lexer for WebAssembly Text Format.
//!
//! Tokenises WAT source into a stream of tokens. The lexer is an iterator,
//! producing tokens lazily on demand and stopping at the first error.
//!
//! ```
//! use watc::wat::{Lexer, TokenKind};
//!
//! let tokens = Lexer::tokenise("(func $add (param i32 i32))").unwrap();
//! assert_eq!(tokens[2].kind, TokenKind::Id("add".into()));
//! ```

use super::cursor::{Cursor, Position};
use super::error::{LexError, LexErrorKind};
use super::token::{FloatLit, IntLit, Token, TokenKind};

// ============================================================================
// Lexer
// ============================================================================

/// Lexer for WebAssembly Text Format.
pub struct Lexer<'a> {
    cursor: Cursor<'a>,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            cursor: Cursor::new(source),
        }
    }

    /// Restart lexing from a position previously returned by [`Lexer::position`].
    pub fn resume(source: &'a str, at: Position) -> Option<Self> {
        Cursor::resume(source, at).map(|cursor| Self { cursor })
    }

    /// The position of the next unread character.
    pub fn position(&self) -> Position {
        self.cursor.position()
    }

    /// Tokenise the entire source, returning all tokens or the first error.
    pub fn tokenise(source: &str) -> Result<Vec<Token>, LexError> {
        Lexer::new(source).collect()
    }

    /// Error spanning from `start` to the current position.
    fn error(&self, kind: LexErrorKind, message: impl Into<String>, start: Position) -> LexError {
        LexError::new(kind, message, start.span_to(&self.cursor.position()))
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.skip_whitespace_and_comments() {
            return Some(Err(e));
        }
        if self.cursor.is_eof() {
            return None;
        }

        let start = self.cursor.position();
        Some(
            self.lex_token(start)
                .map(|kind| Token::new(kind, start.span_to(&self.cursor.position()))),
        )
    }
}

// ============================================================================
// Top-level token dispatch
// ============================================================================

impl<'a> Lexer<'a> {
    fn lex_token(&mut self, start: Position) -> Result<TokenKind, LexError> {
        let Some(c) = self.cursor.peek() else {
            return Err(self.error(LexErrorKind::UnexpectedCharacter, "unexpected end of input", start));
        };

        match c {
            '(' => {
                self.cursor.advance();
                Ok(TokenKind::LeftParen)
            }
            ')' => {
                self.cursor.advance();
                Ok(TokenKind::RightParen)
            }
            '"' => {
                let bytes = self.lex_string(start)?;
                self.check_token_boundary()?;
                Ok(TokenKind::String(bytes))
            }
            c if is_idchar(c) => {
                let text = self.cursor.take_while(is_idchar);
                let kind = self.classify_atom(text, start)?;
                self.check_token_boundary()?;
                Ok(kind)
            }
            c => {
                self.cursor.advance();
                Err(self.error(
                    LexErrorKind::UnexpectedCharacter,
                    format!("unexpected character {c:?}"),
                    start,
                ))
            }
        }
    }

    /// Decide what a run of identifier characters is.
    fn classify_atom(&self, text: &str, start: Position) -> Result<TokenKind, LexError> {
        if let Some(name) = text.strip_prefix('$') {
            if name.is_empty() {
                return Err(self.error(
                    LexErrorKind::UnexpectedCharacter,
                    "expected identifier after '$'",
                    start,
                ));
            }
            return Ok(TokenKind::Id(name.to_string()));
        }

        let (negative, has_sign, body) = if let Some(rest) = text.strip_prefix('-') {
            (true, true, rest)
        } else if let Some(rest) = text.strip_prefix('+') {
            (false, true, rest)
        } else {
            (false, false, text)
        };

        if body.starts_with(|c: char| c.is_ascii_digit()) {
            return parse_number(body, negative, has_sign)
                .ok_or_else(|| self.error(LexErrorKind::InvalidNumber, format!("invalid number: {text}"), start));
        }
        if body == "inf" || body == "nan" || body.starts_with("nan:") {
            return parse_special_float(body, negative)
                .map(TokenKind::Float)
                .ok_or_else(|| self.error(LexErrorKind::InvalidNumber, format!("invalid number: {text}"), start));
        }
        if !has_sign && text.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Ok(TokenKind::Keyword(text.to_string()));
        }
        Ok(TokenKind::Reserved(text.to_string()))
    }

    /// Tokens must be separated by whitespace, parentheses or comments.
    /// `1x"y"`, `$l"a"` and `"a""b"` are all malformed.
    fn check_token_boundary(&mut self) -> Result<(), LexError> {
        match self.cursor.peek() {
            None | Some('(' | ')' | ';') => Ok(()),
            Some(c) if c.is_ascii_whitespace() => Ok(()),
            Some(c) => {
                let at = self.cursor.position();
                self.cursor.advance();
                Err(self.error(
                    LexErrorKind::UnexpectedCharacter,
                    format!("unexpected character {c:?} after token"),
                    at,
                ))
            }
        }
    }
}

// ============================================================================
// Whitespace and comments
// ============================================================================

impl<'a> Lexer<'a> {
    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            self.cursor.skip_while(|c| c.is_ascii_whitespace());
            match (self.cursor.peek(), self.cursor.peek_second()) {
                (Some(';'), Some(';')) => {
                    self.cursor.skip_while(|c| c != '\n');
                }
                (Some('('), Some(';')) => self.skip_block_comment()?,
                _ => return Ok(()),
            }
        }
    }

    /// Skip a `(; ... ;)` comment. Block comments nest.
    fn skip_block_comment(&mut self) -> Result<(), LexError> {
        let start = self.cursor.position();
        self.cursor.advance();
        self.cursor.advance();

        let mut depth = 1usize;
        while depth > 0 {
            match (self.cursor.peek(), self.cursor.peek_second()) {
                (None, _) => {
                    return Err(self.error(
                        LexErrorKind::UnterminatedBlockComment,
                        "unterminated block comment",
                        start,
                    ));
                }
                (Some('('), Some(';')) => {
                    self.cursor.advance();
                    self.cursor.advance();
                    depth += 1;
                }
                (Some(';'), Some(')')) => {
                    self.cursor.advance();
                    self.cursor.advance();
                    depth -= 1;
                }
                _ => {
                    self.cursor.advance();
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// String literals
// ============================================================================

impl<'a> Lexer<'a> {
    fn lex_string(&mut self, start: Position) -> Result<Vec<u8>, LexError> {
        self.cursor.advance();
        let mut bytes = Vec::new();

        loop {
            match self.cursor.peek() {
                None => {
                    return Err(self.error(
                        LexErrorKind::UnterminatedString,
                        "unterminated string literal",
                        start,
                    ));
                }
                Some('"') => {
                    self.cursor.advance();
                    return Ok(bytes);
                }
                Some('\\') => {
                    self.cursor.advance();
                    self.lex_escape(&mut bytes)?;
                }
                Some(c) if c < ' ' || c == '\u{7f}' => {
                    let at = self.cursor.position();
                    self.cursor.advance();
                    return Err(self.error(
                        LexErrorKind::UnexpectedCharacter,
                        format!("control character {c:?} in string literal"),
                        at,
                    ));
                }
                Some(c) => {
                    self.cursor.advance();
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
    }

    /// Lex an escape sequence (after the backslash), appending to `bytes`.
    fn lex_escape(&mut self, bytes: &mut Vec<u8>) -> Result<(), LexError> {
        let start = self.cursor.position();
        let Some(c) = self.cursor.advance() else {
            return Err(self.error(LexErrorKind::UnterminatedString, "unterminated string literal", start));
        };

        match c {
            't' => bytes.push(b'\t'),
            'n' => bytes.push(b'\n'),
            'r' => bytes.push(b'\r'),
            '"' => bytes.push(b'"'),
            '\'' => bytes.push(b'\''),
            '\\' => bytes.push(b'\\'),
            'u' => self.lex_unicode_escape(bytes, start)?,
            high if high.is_ascii_hexdigit() => {
                let low = self.cursor.peek().and_then(|c| c.to_digit(16));
                let (Some(high), Some(low)) = (high.to_digit(16), low) else {
                    return Err(self.error(
                        LexErrorKind::InvalidEscape,
                        "byte escape needs two hex digits",
                        start,
                    ));
                };
                self.cursor.advance();
                bytes.push(((high << 4) | low) as u8);
            }
            other => {
                return Err(self.error(
                    LexErrorKind::InvalidEscape,
                    format!("invalid escape sequence: \\{other}"),
                    start,
                ));
            }
        }
        Ok(())
    }

    /// `\u{hex}`, appending the code point as UTF-8.
    fn lex_unicode_escape(&mut self, bytes: &mut Vec<u8>, start: Position) -> Result<(), LexError> {
        if self.cursor.peek() != Some('{') {
            return Err(self.error(LexErrorKind::InvalidEscape, "expected '{' after \\u", start));
        }
        self.cursor.advance();
        let digits = self.cursor.take_while(|c| c.is_ascii_hexdigit() || c == '_');
        if self.cursor.peek() != Some('}') {
            return Err(self.error(LexErrorKind::InvalidEscape, "unterminated unicode escape", start));
        }
        self.cursor.advance();

        let c = if valid_digit_groups(digits, true) {
            u32::from_str_radix(&strip_underscores(digits), 16)
                .ok()
                .and_then(char::from_u32)
        } else {
            None
        };
        let Some(c) = c else {
            return Err(self.error(
                LexErrorKind::InvalidEscape,
                format!("invalid unicode escape: \\u{{{digits}}}"),
                start,
            ));
        };
        let mut buf = [0u8; 4];
        bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
        Ok(())
    }
}

// ============================================================================
// Number literals
// ============================================================================

/// Parse an unsigned numeric body (sign already stripped).
///
/// Integers that overflow u64 become float literals; they are still valid
/// operands of `f32.const` and `f64.const`.
fn parse_number(body: &str, negative: bool, has_sign: bool) -> Option<TokenKind> {
    let int = |magnitude| {
        if has_sign {
            IntLit::signed(magnitude, negative)
        } else {
            IntLit::unsigned(magnitude)
        }
    };

    if let Some(hex) = body.strip_prefix("0x") {
        if hex.contains(['.', 'p', 'P']) {
            if !valid_float_shape(hex, true) {
                return None;
            }
            return Some(TokenKind::Float(FloatLit::Hex {
                negative,
                digits: format!("0x{}", strip_underscores(hex)),
            }));
        }
        if !valid_digit_groups(hex, true) {
            return None;
        }
        let clean = strip_underscores(hex);
        return Some(match u64::from_str_radix(&clean, 16) {
            Ok(v) => TokenKind::Integer(int(v)),
            Err(_) => TokenKind::Float(FloatLit::Hex {
                negative,
                digits: format!("0x{clean}"),
            }),
        });
    }

    if body.contains(['.', 'e', 'E']) {
        if !valid_float_shape(body, false) {
            return None;
        }
        return Some(TokenKind::Float(FloatLit::Decimal {
            negative,
            digits: strip_underscores(body),
        }));
    }
    if !valid_digit_groups(body, false) {
        return None;
    }
    let clean = strip_underscores(body);
    Some(match clean.parse::<u64>() {
        Ok(v) => TokenKind::Integer(int(v)),
        Err(_) => TokenKind::Float(FloatLit::Decimal { negative, digits: clean }),
    })
}

/// `digits ('.' digits?)? (exp sign? decimal-digits)?`, where the exponent
/// marker is `p` for hex and `e` for decimal.
fn valid_float_shape(body: &str, hex: bool) -> bool {
    let exp_markers: &[char] = if hex { &['p', 'P'] } else { &['e', 'E'] };
    let (mantissa, exponent) = match body.split_once(exp_markers) {
        Some((m, e)) => (m, Some(e)),
        None => (body, None),
    };
    let (int_part, frac_part) = match mantissa.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (mantissa, None),
    };
    if !valid_digit_groups(int_part, hex) {
        return false;
    }
    if let Some(frac) = frac_part {
        if !frac.is_empty() && !valid_digit_groups(frac, hex) {
            return false;
        }
    }
    match exponent {
        None => true,
        Some(exp) => {
            let digits = exp.strip_prefix(['+', '-']).unwrap_or(exp);
            valid_digit_groups(digits, false)
        }
    }
}

/// A non-empty run of digits where `_` only appears between two digits.
fn valid_digit_groups(s: &str, hex: bool) -> bool {
    let is_digit = |c: char| if hex { c.is_ascii_hexdigit() } else { c.is_ascii_digit() };
    !s.is_empty()
        && s.split('_').all(|group| !group.is_empty() && group.chars().all(is_digit))
}

fn strip_underscores(s: &str) -> String {
    s.chars().filter(|&c| c != '_').collect()
}

/// `inf`, `nan` and `nan:0x…`.
fn parse_special_float(text: &str, negative: bool) -> Option<FloatLit> {
    match text {
        "inf" => Some(FloatLit::Inf { negative }),
        "nan" => Some(FloatLit::Nan {
            negative,
            payload: None,
        }),
        _ => {
            let payload = text.strip_prefix("nan:0x")?;
            if !valid_digit_groups(payload, true) {
                return None;
            }
            let payload = u64::from_str_radix(&strip_underscores(payload), 16).ok()?;
            Some(FloatLit::Nan {
                negative,
                payload: Some(payload),
            })
        }
    }
}

/// Characters allowed in keywords, identifiers and numbers.
fn is_idchar(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '!' | '#' | '$' | '%' | '&' | '\'' | '*' | '+' | '-' | '.' | '/' | ':' | '<' | '=' | '>' | '?' | '@' | '\\'
                | '^' | '_' | '`' | '|' | '~'
        )
}

// ============================================================================
// Tests
// ============================================================================
