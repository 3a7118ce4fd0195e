//! Token types for the WAT lexer.
//!
//! This module defines the lexical tokens produced when tokenising WebAssembly
//! Text Format source code, plus the literal representations that keep enough
//! of the source text for each consumer to round independently.

use fhex::FromHex;
use serde::Serialize;
use std::fmt;

/// A location in source text.
///
/// Spans track both byte offsets (for slicing) and line/column (for errors).
/// Columns count Unicode characters, not bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Span {
    /// Byte offset where this span starts.
    pub start: usize,
    /// Byte offset just past the end of this span.
    pub end: usize,
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed, counting characters not bytes).
    pub column: u32,
}

impl Span {
    /// A zero-length span at the start of source, for errors without position.
    pub const ZERO: Span = Span {
        start: 0,
        end: 0,
        line: 1,
        column: 1,
    };

    pub fn new(start: usize, end: usize, line: u32, column: u32) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }

    /// The length of this span in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// A span starting where `self` starts and ending where `other` ends.
    #[must_use]
    pub fn to(self, other: Span) -> Span {
        Span {
            end: other.end.max(self.start),
            ..self
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A lexical token with its location in source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Get the original source text for this token.
    ///
    /// ```
    /// use watc::wat::Lexer;
    ///
    /// let source = "(module)";
    /// let tokens = Lexer::tokenise(source).unwrap();
    /// assert_eq!(tokens[1].text(source), "module");
    /// ```
    #[must_use]
    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.span.start..self.span.end]
    }
}

/// The kind of token, with associated data where relevant.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Opening parenthesis `(`.
    LeftParen,

    /// Closing parenthesis `)`.
    RightParen,

    /// A keyword like `module`, `i32.add` or `offset=8`.
    ///
    /// Keywords start with a lowercase ASCII letter.
    Keyword(String),

    /// Any other run of identifier characters, such as `=` or `#foo`.
    ///
    /// Never valid in a module; kept as a token so the parser can point at it.
    Reserved(String),

    /// An identifier like `$name`, stored without the leading `$`.
    Id(String),

    /// A string literal with escape sequences resolved.
    ///
    /// Stored as raw bytes since WAT strings can contain arbitrary bytes.
    String(Vec<u8>),

    /// An integer literal.
    Integer(IntLit),

    /// A floating-point literal.
    Float(FloatLit),
}

impl TokenKind {
    /// Short description used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::LeftParen => "'('".to_string(),
            TokenKind::RightParen => "')'".to_string(),
            TokenKind::Keyword(k) => format!("keyword '{k}'"),
            TokenKind::Reserved(r) => format!("reserved token '{r}'"),
            TokenKind::Id(id) => format!("identifier '${id}'"),
            TokenKind::String(_) => "string".to_string(),
            TokenKind::Integer(_) => "integer".to_string(),
            TokenKind::Float(_) => "float".to_string(),
        }
    }
}

/// An integer literal with its sign kept apart from the magnitude.
///
/// This keeps `-0` distinct from `0` and represents the full u64 range, which
/// i64 cannot. Whether a sign was written matters: only unsigned literals may
/// be used as indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntLit {
    pub magnitude: u64,
    pub negative: bool,
    pub has_sign: bool,
}

impl IntLit {
    /// A bare literal like `42`.
    pub fn unsigned(magnitude: u64) -> Self {
        Self {
            magnitude,
            negative: false,
            has_sign: false,
        }
    }

    /// A literal written with a sign, `+42` or `-42`.
    pub fn signed(magnitude: u64, negative: bool) -> Self {
        Self {
            magnitude,
            negative,
            has_sign: true,
        }
    }

    /// Interpret as an `N`-bit two's complement value.
    ///
    /// Accepts the union of the signed and unsigned ranges, so `i32.const`
    /// takes both `-1` and `0xffffffff`. Returns the value sign-extended to
    /// i64, or `None` if it does not fit.
    #[must_use]
    pub fn to_bits(self, bits: u32) -> Option<i64> {
        let unsigned_max = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
        let neg_limit = 1u64 << (bits - 1);
        if self.negative {
            if self.magnitude > neg_limit {
                return None;
            }
            Some((self.magnitude as i64).wrapping_neg())
        } else if self.magnitude <= unsigned_max {
            let shift = 64 - bits;
            Some(((self.magnitude << shift) as i64) >> shift)
        } else {
            None
        }
    }

    /// Interpret as an unsigned 32-bit index or offset.
    #[must_use]
    pub fn to_u32(self) -> Option<u32> {
        if self.has_sign {
            return None;
        }
        u32::try_from(self.magnitude).ok()
    }
}

impl fmt::Display for IntLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.has_sign, self.negative) {
            (true, true) => write!(f, "-{}", self.magnitude),
            (true, false) => write!(f, "+{}", self.magnitude),
            _ => write!(f, "{}", self.magnitude),
        }
    }
}

/// A floating-point literal.
///
/// Decimal and hex literals keep their source digits so that f32 and f64
/// conversions each round once, directly from the text.
#[derive(Debug, Clone, PartialEq)]
pub enum FloatLit {
    /// A decimal literal such as `1.5e-3`, underscores removed.
    Decimal { negative: bool, digits: String },
    /// A hex literal such as `0x1.8p+1`, underscores removed, `0x` kept.
    Hex { negative: bool, digits: String },
    Inf { negative: bool },
    /// `nan` or `nan:0x…` with an explicit significand payload.
    Nan { negative: bool, payload: Option<u64> },
}

macro_rules! float_bits {
    ($name:ident, $fty:ty, $uty:ty, $mantissa_bits:expr) => {
        /// Encode as IEEE-754 bits, or `None` if a finite literal overflows
        /// to infinity or a NaN payload does not fit the significand.
        #[must_use]
        pub fn $name(&self) -> Option<$uty> {
            const SIGN: $uty = 1 << (<$uty>::BITS - 1);
            const EXP_MASK: $uty = !SIGN & !((1 << $mantissa_bits) - 1);
            const QUIET: $uty = 1 << ($mantissa_bits - 1);
            let (negative, magnitude) = match self {
                FloatLit::Decimal { negative, digits } => {
                    let v: $fty = digits.parse().ok()?;
                    (*negative, v)
                }
                FloatLit::Hex { negative, digits } => {
                    let v = <$fty>::from_hex(digits).unwrap_or(<$fty>::NAN);
                    if v.is_nan() {
                        return None;
                    }
                    (*negative, v)
                }
                FloatLit::Inf { negative } => (*negative, <$fty>::INFINITY),
                FloatLit::Nan { negative, payload } => {
                    let bits = match payload {
                        None => EXP_MASK | QUIET,
                        Some(p) => {
                            let max: u64 = (1u64 << $mantissa_bits) - 1;
                            if *p == 0 || *p > max {
                                return None;
                            }
                            EXP_MASK | (*p as $uty)
                        }
                    };
                    return Some(if *negative { bits | SIGN } else { bits });
                }
            };
            if magnitude.is_infinite() && !matches!(self, FloatLit::Inf { .. }) {
                return None;
            }
            let bits = magnitude.to_bits();
            Some(if negative { bits | SIGN } else { bits })
        }
    };
}

impl FloatLit {
    float_bits!(to_f32_bits, f32, u32, 23);
    float_bits!(to_f64_bits, f64, u64, 52);
}

impl fmt::Display for FloatLit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (negative, body) = match self {
            FloatLit::Decimal { negative, digits } | FloatLit::Hex { negative, digits } => {
                (*negative, digits.clone())
            }
            FloatLit::Inf { negative } => (*negative, "inf".to_string()),
            FloatLit::Nan { negative, payload: None } => (*negative, "nan".to_string()),
            FloatLit::Nan {
                negative,
                payload: Some(p),
            } => (*negative, format!("nan:0x{p:x}")),
        };
        if negative {
            write!(f, "-{body}")
        } else {
            write!(f, "{body}")
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LeftParen => write!(f, "("),
            TokenKind::RightParen => write!(f, ")"),
            TokenKind::Keyword(s) | TokenKind::Reserved(s) => write!(f, "{s}"),
            TokenKind::Id(s) => write!(f, "${s}"),
            TokenKind::String(bytes) => {
                write!(f, "\"")?;
                for &b in bytes {
                    if (b.is_ascii_graphic() && b != b'"' && b != b'\\') || b == b' ' {
                        write!(f, "{}", b as char)?;
                    } else {
                        write!(f, "\\{b:02x}")?;
                    }
                }
                write!(f, "\"")
            }
            TokenKind::Integer(lit) => write!(f, "{lit}"),
            TokenKind::Float(lit) => write!(f, "{lit}"),
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.span)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn span_join() {
        let a = Span::new(4, 6, 1, 5);
        let b = Span::new(10, 12, 2, 1);
        let joined = a.to(b);
        assert_eq!((joined.start, joined.end, joined.line, joined.column), (4, 12, 1, 5));
        assert_eq!(joined.len(), 8);
        assert_eq!(format!("{joined}"), "1:5");
    }

    #[rstest]
    #[case(IntLit::unsigned(42), 32, Some(42))]
    #[case(IntLit::unsigned(0xffff_ffff), 32, Some(-1))]
    #[case(IntLit::unsigned(0x1_0000_0000), 32, None)]
    #[case(IntLit::signed(0x8000_0000, true), 32, Some(i32::MIN as i64))]
    #[case(IntLit::signed(0x8000_0001, true), 32, None)]
    #[case(IntLit::signed(0, true), 32, Some(0))]
    #[case(IntLit::unsigned(u64::MAX), 64, Some(-1))]
    #[case(IntLit::signed(1 << 63, true), 64, Some(i64::MIN))]
    #[case(IntLit::signed((1 << 63) + 1, true), 64, None)]
    fn int_lit_to_bits(#[case] lit: IntLit, #[case] bits: u32, #[case] expected: Option<i64>) {
        assert_eq!(lit.to_bits(bits), expected);
    }

    #[test]
    fn int_lit_to_u32_rejects_signs() {
        assert_eq!(IntLit::unsigned(7).to_u32(), Some(7));
        assert_eq!(IntLit::signed(7, false).to_u32(), None);
        assert_eq!(IntLit::unsigned(u64::from(u32::MAX) + 1).to_u32(), None);
    }

    #[rstest]
    #[case(FloatLit::Decimal { negative: false, digits: "1.5".into() }, 0x3fc0_0000)]
    #[case(FloatLit::Decimal { negative: true, digits: "0".into() }, 0x8000_0000)]
    #[case(FloatLit::Hex { negative: false, digits: "0x1p1".into() }, 0x4000_0000)]
    #[case(FloatLit::Inf { negative: true }, 0xff80_0000)]
    #[case(FloatLit::Nan { negative: false, payload: None }, 0x7fc0_0000)]
    #[case(FloatLit::Nan { negative: true, payload: Some(1) }, 0xff80_0001)]
    fn float_lit_f32_bits(#[case] lit: FloatLit, #[case] expected: u32) {
        assert_eq!(lit.to_f32_bits(), Some(expected));
    }

    #[test]
    fn float_lit_f64_bits() {
        let lit = FloatLit::Decimal {
            negative: false,
            digits: "0.1".into(),
        };
        assert_eq!(lit.to_f64_bits(), Some(0.1f64.to_bits()));
        let nan = FloatLit::Nan {
            negative: false,
            payload: Some(0x8_0000_0000_0000),
        };
        assert_eq!(nan.to_f64_bits(), Some(0x7ff8_0000_0000_0000));
    }

    #[test]
    fn float_lit_out_of_range() {
        let huge = FloatLit::Decimal {
            negative: false,
            digits: "1e39".into(),
        };
        assert_eq!(huge.to_f32_bits(), None);
        assert!(huge.to_f64_bits().is_some());
        let payload = FloatLit::Nan {
            negative: false,
            payload: Some(0x80_0000),
        };
        assert_eq!(payload.to_f32_bits(), None);
        let zero_payload = FloatLit::Nan {
            negative: false,
            payload: Some(0),
        };
        assert_eq!(zero_payload.to_f64_bits(), None);
    }

    #[test]
    fn token_kind_display() {
        assert_eq!(format!("{}", TokenKind::LeftParen), "(");
        assert_eq!(format!("{}", TokenKind::Keyword("func".into())), "func");
        assert_eq!(format!("{}", TokenKind::Id("name".into())), "$name");
        assert_eq!(format!("{}", TokenKind::Integer(IntLit::signed(42, true))), "-42");
        assert_eq!(format!("{}", TokenKind::String(vec![b'h', 0x00, b'"'])), "\"h\\00\\22\"");
        assert_eq!(
            format!(
                "{}",
                TokenKind::Float(FloatLit::Nan {
                    negative: true,
                    payload: Some(0x1234)
                })
            ),
            "-nan:0x1234"
        );
    }

    #[test]
    fn token_text() {
        let source = "(module $test)";
        let token = Token::new(TokenKind::Id("test".into()), Span::new(8, 13, 1, 9));
        assert_eq!(token.text(source), "$test");
        assert_eq!(format!("{token}"), "$test at 1:9");
    }
}
