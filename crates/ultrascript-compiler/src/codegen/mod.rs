//! Code generation: x86-64 encoding primitives, the runtime ABI table,
//! and the AST-to-instructions generator built on top of them
//! (spec §4.5 "Code generator").

pub mod ast_codegen;
pub mod runtime_abi;
pub mod x86;

pub use ast_codegen::Generator;
pub use x86::buffer::CodeBuffer;
