//! WebAssembly Text Format (WAT) lexing and s-expression reading.
//!
//! ```
//! use watc::wat::{Lexer, TokenKind};
//!
//! let source = "(module (func $main (result i32) (i32.const 42)))";
//! let tokens = Lexer::tokenise(source).unwrap();
//!
//! assert!(matches!(tokens[0].kind, TokenKind::LeftParen));
//! assert!(matches!(tokens[1].kind, TokenKind::Keyword(ref k) if k == "module"));
//! ```
//!
//! The lexer yields `Result<Token, LexError>` and stops at the first error:
//!
//! ```
//! use watc::wat::{Lexer, LexErrorKind};
//!
//! let err = Lexer::tokenise("\"unterminated string").unwrap_err();
//! assert_eq!(err.kind, LexErrorKind::UnterminatedString);
//! ```

mod cursor;
mod error;
mod lexer;
pub mod sexpr;
mod token;

pub use cursor::Position;
pub use error::{LexError, LexErrorKind};
pub use lexer::Lexer;
pub use token::{FloatLit, IntLit, Span, Token, TokenKind};
