//! Numeric immediates: constants and memory arguments.

use super::items::Items;
use crate::ast::MemArg;
use crate::error::{Diagnostic, SyntaxErrorKind};
use crate::wat::sexpr::SExpr;
use crate::wat::{Span, TokenKind};

fn malformed(message: impl Into<String>, span: Span) -> Diagnostic {
    Diagnostic::syntax(SyntaxErrorKind::MalformedLiteral, message, span)
}

/// An `N`-bit integer constant, sign-extended to i64.
pub(super) fn parse_int(items: &mut Items<'_>, bits: u32) -> Result<i64, Diagnostic> {
    let what = format!("i{bits} literal");
    let Some(token) = items.peek().and_then(SExpr::as_atom) else {
        return Err(items.expected(&what));
    };
    match &token.kind {
        TokenKind::Integer(lit) => {
            let value = lit
                .to_bits(bits)
                .ok_or_else(|| malformed(format!("constant {lit} out of range for i{bits}"), token.span))?;
            items.next();
            Ok(value)
        }
        _ => Err(items.expected(&what)),
    }
}

/// An f32 constant as raw bits. Integer literals are converted.
pub(super) fn parse_f32(items: &mut Items<'_>) -> Result<u32, Diagnostic> {
    let Some(token) = items.peek().and_then(SExpr::as_atom) else {
        return Err(items.expected("f32 literal"));
    };
    let bits = match &token.kind {
        TokenKind::Float(lit) => lit
            .to_f32_bits()
            .ok_or_else(|| malformed(format!("constant {lit} out of range for f32"), token.span))?,
        TokenKind::Integer(lit) => {
            let magnitude = lit.magnitude as f32;
            if lit.negative { -magnitude } else { magnitude }.to_bits()
        }
        _ => return Err(items.expected("f32 literal")),
    };
    items.next();
    Ok(bits)
}

/// An f64 constant as raw bits. Integer literals are converted.
pub(super) fn parse_f64(items: &mut Items<'_>) -> Result<u64, Diagnostic> {
    let Some(token) = items.peek().and_then(SExpr::as_atom) else {
        return Err(items.expected("f64 literal"));
    };
    let bits = match &token.kind {
        TokenKind::Float(lit) => lit
            .to_f64_bits()
            .ok_or_else(|| malformed(format!("constant {lit} out of range for f64"), token.span))?,
        TokenKind::Integer(lit) => {
            let magnitude = lit.magnitude as f64;
            if lit.negative { -magnitude } else { magnitude }.to_bits()
        }
        _ => return Err(items.expected("f64 literal")),
    };
    items.next();
    Ok(bits)
}

/// `offset=N? align=N?`
///
/// `natural` is the log2 alignment used when none is written. The alignment
/// must be a power of two and is stored as its log2; checking it against
/// the natural alignment is the validator's job.
pub(super) fn parse_memarg(items: &mut Items<'_>, natural: u32) -> Result<MemArg, Diagnostic> {
    let mut memarg = MemArg {
        offset: 0,
        align: natural,
    };

    if let Some(text) = items.peek_keyword().and_then(|kw| kw.strip_prefix("offset=")) {
        let span = items.here();
        memarg.offset = parse_u32_text(text).ok_or_else(|| malformed(format!("invalid offset '{text}'"), span))?;
        items.next();
    }

    if let Some(text) = items.peek_keyword().and_then(|kw| kw.strip_prefix("align=")) {
        let span = items.here();
        let align = parse_u32_text(text).ok_or_else(|| malformed(format!("invalid alignment '{text}'"), span))?;
        if !align.is_power_of_two() {
            return Err(malformed(format!("alignment {align} is not a power of two"), span));
        }
        memarg.align = align.trailing_zeros();
        items.next();
    }

    Ok(memarg)
}

/// Unsigned decimal or `0x` hex digits with `_` separators.
fn parse_u32_text(text: &str) -> Option<u32> {
    let (digits, radix) = match text.strip_prefix("0x") {
        Some(hex) => (hex, 16),
        None => (text, 10),
    };
    let groups_ok = !digits.is_empty()
        && digits.split('_').all(|group| !group.is_empty() && group.chars().all(|c| c.is_digit(radix)));
    if !groups_ok {
        return None;
    }
    let clean: String = digits.chars().filter(|&c| c != '_').collect();
    u32::from_str_radix(&clean, radix).ok()
}
