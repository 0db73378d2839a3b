//! UltraScript compiler engine: lexer, parser, scope analyzer, function
//! compilation manager, x86-64 code generator, and JIT loader.
//!
//! Mirrors the teacher's `raya-engine` crate shape — one module per
//! pipeline stage, re-exported from the crate root so a consumer (the CLI,
//! or an embedder) can `use ultrascript_compiler::{tokenize, parse, ...}`
//! without reaching into submodules.

#![warn(rust_2018_idioms)]

pub mod classes;
pub mod codegen;
pub mod config;
pub mod driver;
pub mod funcs;
pub mod jit;
pub mod lexer;
pub mod parser;
pub mod runtime_stub;
pub mod scope;

pub use classes::ClassRegistry;
pub use codegen::{CodeBuffer, Generator};
pub use config::{ColorChoice, CompileOptions};
pub use driver::compile;
#[cfg(unix)]
pub use driver::compile_and_load;
pub use funcs::FunctionCompilationManager;
pub use jit::ExecutableRegion;
pub use lexer::tokenize;
pub use parser::parse;
pub use scope::{analyze, AnalyzedScopes, ScopeId, ScopeTree};

pub use ultrascript_sdk::{
    CodegenError, LexError, LoaderError, ParseError, SemanticError, UltraScriptError,
};
