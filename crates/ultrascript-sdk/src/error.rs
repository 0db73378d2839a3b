//! Structured error types for every stage of the compiler pipeline
//! (spec §7 "ERROR HANDLING DESIGN").
//!
//! Each stage gets its own `thiserror` enum so a caller can match on exactly
//! what went wrong; [`UltraScriptError`] is the single type the driver
//! actually propagates, with one variant per stage.

use crate::Span;
use thiserror::Error;

/// Lex-stage errors (spec §4.1).
#[derive(Debug, Clone, Error)]
pub enum LexError {
    /// A byte that starts no valid token.
    #[error("unexpected character '{character}' at {line}:{column}")]
    UnexpectedCharacter {
        character: char,
        line: u32,
        column: u32,
        /// The source line the character appeared on, for excerpt rendering.
        source_line: String,
    },
    /// A string, template, or regex literal that ran off the end of the
    /// source (or, for regex, hit a newline) before its closing delimiter.
    #[error("unterminated {kind} literal starting at {line}:{column}")]
    Unterminated {
        kind: &'static str,
        line: u32,
        column: u32,
        source_line: String,
    },
    /// A `/.../` that was recognized as a regex literal but contained a raw
    /// newline before the closing slash.
    #[error("unterminated regex literal: embedded newline at {line}:{column}")]
    RegexEmbeddedNewline {
        line: u32,
        column: u32,
        source_line: String,
    },
}

/// Parse-stage errors (spec §4.2).
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    /// The parser expected one of a set of tokens and found something else.
    #[error("expected {expected}, found '{found}' at {line}:{column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: u32,
        column: u32,
        source_line: String,
    },
    /// Input ended while the parser still expected more tokens.
    #[error("unexpected end of file, expected {expected}")]
    UnexpectedEof { expected: String },
    /// A declaration appeared somewhere the grammar forbids it (e.g. a
    /// `class` statement used as an expression).
    #[error("illegal declaration: {message} at {line}:{column}")]
    IllegalDeclaration {
        message: String,
        line: u32,
        column: u32,
        source_line: String,
    },
}

/// Semantic (scope/class) analysis errors (spec §4.3, §4.6).
#[derive(Debug, Clone, Error)]
pub enum SemanticError {
    /// A variable use with no enclosing declaration.
    #[error("unresolved identifier '{name}'")]
    UnresolvedIdentifier { name: String, span: Span },
    /// `new`/`extends` referencing a class that was never declared.
    #[error("undefined class '{name}'")]
    UndefinedClass { name: String, span: Span },
    /// An `operator` overload declaration with an unsupported parameter
    /// type signature.
    #[error("bad operator overload signature for '{operator}': {reason}")]
    BadOperatorOverload {
        operator: String,
        reason: String,
        span: Span,
    },
    /// Assignment to a `const` binding.
    #[error("cannot assign to constant '{name}'")]
    AssignToConstant { name: String, span: Span },
}

/// Internal codegen invariant violations (spec §4.5, §4.6) — these indicate
/// a compiler bug, not a user error.
#[derive(Debug, Clone, Error)]
pub enum CodegenError {
    /// A jump/call referenced a label that was never emitted.
    #[error("unresolved label '{label}' at code offset {offset}")]
    UnresolvedLabel { label: String, offset: usize },
    /// A `call __name` referenced a runtime entry point this compiler does
    /// not know about.
    #[error("unknown runtime entry name: {name}")]
    UnknownRuntimeEntry { name: String },
    /// The scope register-allocation plan contradicted itself (e.g. two
    /// ancestor depths assigned the same physical register).
    #[error("register allocation inconsistency: {detail}")]
    RegisterAllocationInconsistency { detail: String },
}

/// JIT loader errors (spec §4.7).
#[derive(Debug, Error)]
pub enum LoaderError {
    /// `mmap` returned `MAP_FAILED`.
    #[error("mmap failed: {0}")]
    MmapFailed(std::io::Error),
    /// `mprotect` returned nonzero.
    #[error("mprotect failed: {0}")]
    MprotectFailed(std::io::Error),
    /// A patch referenced a runtime entry that could not be resolved
    /// against the static table.
    #[error("unresolved runtime call: {0}")]
    UnresolvedRuntimeCall(String),
    /// The compiled program had no `main` label.
    #[error("__main label not found")]
    MainNotFound,
}

/// The single error type the compiler driver returns (spec §7).
#[derive(Debug, Error)]
pub enum UltraScriptError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error(transparent)]
    Codegen(#[from] CodegenError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    /// Source file resolution failure (spec §6 "Source file resolution").
    #[error("Cannot open module file: {0}")]
    ModuleNotFound(String),
}
