//! A translator from the WebAssembly text format (WAT) to the binary format.
//!
//! watc runs source text through a fixed pipeline and stops at the first
//! error:
//!
//! - [`wat`] -- Lexer and s-expression reader.
//! - [`parser`] -- Builds the [`ast::Module`] syntax tree, expanding inline
//!   abbreviations and flattening folded instructions.
//! - [`resolve`] -- Replaces `$name` references with numeric indices.
//! - [`validate`] -- Type-checks function bodies and module structure.
//! - [`encoder`] -- Serialises a validated module to `.wasm` bytes.
//!
//! # Example
//!
//! ```
//! let wasm = watc::translate_str(r#"
//!     (module
//!         (func (export "add") (param i32 i32) (result i32)
//!             local.get 0
//!             local.get 1
//!             i32.add))
//! "#).unwrap();
//! assert_eq!(&wasm[0..8], b"\0asm\x01\0\0\0");
//!
//! let err = watc::translate_str("(module (func call $missing))").unwrap_err();
//! assert_eq!(err.kind, watc::ErrorKind::UnresolvedSymbol);
//! ```
//!
//! Post-MVP proposals (multi-value, bulk memory, reference types,
//! sign-extension, saturating conversions) are on by default and can be
//! switched off through [`Config`].

pub mod ast;
pub mod config;
pub mod encoder;
pub mod error;
pub mod parser;
pub mod resolve;
pub mod validate;
pub mod wat;

pub use config::{Config, Feature, Features};
pub use error::{Diagnostic, ErrorKind, SyntaxErrorKind};

use log::debug;
use wat::{LexError, LexErrorKind, Span};

/// Translate WAT source bytes with the default configuration.
pub fn translate(source: &[u8]) -> Result<Vec<u8>, Diagnostic> {
    translate_with(source, &Config::default())
}

/// Translate WAT source text with the default configuration.
pub fn translate_str(source: &str) -> Result<Vec<u8>, Diagnostic> {
    translate_source(source, &Config::default())
}

/// Translate WAT source bytes. Input must be UTF-8.
pub fn translate_with(source: &[u8], config: &Config) -> Result<Vec<u8>, Diagnostic> {
    let text = std::str::from_utf8(source).map_err(|err| invalid_utf8(source, err.valid_up_to()))?;
    translate_source(text, config)
}

fn translate_source(source: &str, config: &Config) -> Result<Vec<u8>, Diagnostic> {
    debug!("translating {} bytes", source.len());
    let module = parser::parse(source, config)?;
    let module = resolve::resolve(&module)?;
    let validated = validate::validate(&module, config)?;
    encoder::encode(&validated, config)
}

/// A lex error pointing at the first byte that is not UTF-8.
fn invalid_utf8(source: &[u8], valid_up_to: usize) -> Diagnostic {
    let prefix = String::from_utf8_lossy(&source[..valid_up_to]);
    let line = prefix.matches('\n').count() as u32 + 1;
    let column = prefix.rsplit('\n').next().map_or(0, |tail| tail.chars().count()) as u32 + 1;
    let span = Span::new(valid_up_to, valid_up_to + 1, line, column);
    LexError::new(
        LexErrorKind::UnexpectedCharacter,
        format!("invalid UTF-8 byte 0x{:02x}", source[valid_up_to]),
        span,
    )
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_utf8_is_located() {
        let err = translate(b"(module\n  \xff)").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Lex(LexErrorKind::UnexpectedCharacter));
        let span = err.span.unwrap();
        assert_eq!((span.start, span.line, span.column), (10, 2, 3));
        assert_eq!(err.message, "invalid UTF-8 byte 0xff");
    }

    #[test]
    fn bytes_and_str_agree() {
        let source = "(module (memory 1) (export \"m\" (memory 0)))";
        assert_eq!(translate(source.as_bytes()).unwrap(), translate_str(source).unwrap());
    }
}
