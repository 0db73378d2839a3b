//! Shared types for the UltraScript compiler workspace.
//!
//! This crate holds the types that cross the boundary between
//! `ultrascript-compiler` and its consumers (the CLI, and in the future any
//! embedder): source spans, the `DataType` lattice used throughout analysis
//! and codegen, and the top-level structured error enum. Keeping them here
//! (rather than in `ultrascript-compiler` directly) lets a future embedder
//! depend on just the shapes it needs without pulling in the lexer/parser/
//! codegen implementation.

#![warn(missing_docs)]

mod error;
mod span;
mod types;

pub use error::{
    CodegenError, LexError, LoaderError, ParseError, SemanticError, UltraScriptError,
};
pub use span::Span;
pub use types::DataType;
