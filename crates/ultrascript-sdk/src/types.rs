use serde::{Deserialize, Serialize};

/// The closed set of types the compiler reasons about (spec §3 "DataType").
///
/// `Any`/`Unknown` are aliases of the same variant: the source language lets
/// programmers spell either, but they carry identical meaning to every
/// downstream pass.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    /// `any` / `unknown` — no compile-time type information is available;
    /// codegen falls back to the slow, dynamically-typed paths.
    Any,
    /// `void` — the type of a function that returns no value.
    Void,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Float32,
    Float64,
    Boolean,
    String,
    Regex,
    Tensor,
    Promise,
    Function,
    Slice,
    Array,
    /// An instance of a user-defined class, named so property layout can be
    /// looked up in the class registry.
    ClassInstance(String),
    /// A value whose layout/behavior is owned by the `runtime.*` surface
    /// rather than by this compiler (e.g. a `Buffer`, a `Socket` handle).
    RuntimeObject,
}

impl DataType {
    /// Size in bytes of a value of this type when stored inline in a scope
    /// frame or object property slot. Reference types (`String`, `Array`,
    /// `ClassInstance`, ...) are stored as an 8-byte pointer.
    pub fn size_bytes(&self) -> usize {
        match self {
            DataType::Void => 0,
            DataType::Int8 | DataType::Uint8 | DataType::Boolean => 1,
            DataType::Int16 | DataType::Uint16 => 2,
            DataType::Int32 | DataType::Uint32 | DataType::Float32 => 4,
            DataType::Int64
            | DataType::Uint64
            | DataType::Float64
            | DataType::Any
            | DataType::String
            | DataType::Regex
            | DataType::Tensor
            | DataType::Promise
            | DataType::Function
            | DataType::Slice
            | DataType::Array
            | DataType::ClassInstance(_)
            | DataType::RuntimeObject => 8,
        }
    }

    /// Natural alignment in bytes, used by the scope-frame and
    /// class-property packing passes (spec §4.3 / §3 "Class record").
    pub fn alignment(&self) -> usize {
        match self.size_bytes() {
            0 => 1,
            n => n,
        }
    }

    /// True for the IEEE-754 floating point types, which route through XMM
    /// registers in codegen rather than the general-purpose integer path.
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// True for types stored as an 8-byte pointer/handle rather than inline
    /// scalar bits.
    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            DataType::String
                | DataType::Regex
                | DataType::Tensor
                | DataType::Promise
                | DataType::Function
                | DataType::Slice
                | DataType::Array
                | DataType::ClassInstance(_)
                | DataType::RuntimeObject
        )
    }

    /// True for the fixed-width signed/unsigned integer family.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            DataType::Int8
                | DataType::Int16
                | DataType::Int32
                | DataType::Int64
                | DataType::Uint8
                | DataType::Uint16
                | DataType::Uint32
                | DataType::Uint64
        )
    }
}
