//! Template pipeline: source text is tokenized, shaped by the whitespace
//! rules, parsed into an immutable tree, composed along its extends chain
//! and mixins, then rendered against a scope.

pub mod ast;
pub(crate) mod compose;
pub(crate) mod eval;
pub(crate) mod expr;
pub(crate) mod lexer;
pub(crate) mod parser;
pub(crate) mod render;
pub(crate) mod scope;
pub(crate) mod whitespace;
