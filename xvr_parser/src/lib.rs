//! Pure Rust front end for the Xvr scripting language
//!
//! The pipeline starts here: source text is tokenized by [`lexer::Lexer`],
//! parsed into an [`ast::Ast`] by [`parser::Parser`], and optionally
//! screened by the [`unused::UnusedChecker`]. Compilation and execution
//! live in the companion `xvr` crate.

pub mod ast;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod span;
pub mod token;
pub mod unused;

pub use ast::{Ast, AstLiteral, BinaryOp, IndexPart, Param, TypeKind, TypeSpec, UnaryOp};
pub use error::{ParseError, ParseErrors, ParseResult};
pub use lexer::{Lexer, SpannedToken, MAX_STRING_LENGTH};
pub use parser::{parse, Parser};
pub use span::Span;
pub use token::{Precedence, Token};
pub use unused::{UnusedChecker, UnusedWarning};
