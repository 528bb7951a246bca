//! JavaScript syntax support for inwasm.
//!
//! Lexes a module, finds every call expression with byte offsets and
//! line/column positions, and evaluates object-literal arguments statically,
//! following identifiers back to the `const` that declared them.

pub mod lexer;
pub mod literal;
pub mod parser;
pub mod scope;
pub mod token;
pub mod tree;

pub use lexer::{LexError, Lexer};
pub use literal::{evaluate, LiteralValue};
pub use parser::ParseError;
pub use scope::Binding;
pub use token::{Span, TemplatePart, Token};
pub use tree::{Argument, ArgumentKind, CallExpr, Ident, LineIndex, NodeSpan, Position, SyntaxTree};
