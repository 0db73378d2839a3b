//! The single patch-bookkeeping type for emitted machine code (spec §4.5
//! "CodeBuffer"), grounded on `original_source/x86_codegen_v2.h`'s
//! `label_offsets`/`unresolved_jumps`/`function_instances_to_patch`
//! triple, consolidated here into one owner per Design Note §9
//! ("single `CodeBuffer` type consolidating all patch bookkeeping").

use rustc_hash::FxHashMap;

use ultrascript_sdk::CodegenError;

/// A forward or backward jump/call whose target label wasn't known yet
/// when the instruction was emitted.
#[derive(Debug, Clone)]
pub struct UnresolvedJump {
    pub label: String,
    /// Byte offset of the rel32 operand to patch (not the instruction start).
    pub operand_offset: usize,
}

/// A `call __runtime_name` whose absolute address is only known once the
/// JIT loader has resolved it against the runtime ABI table.
#[derive(Debug, Clone)]
pub struct UnresolvedRuntimeCall {
    pub runtime_name: String,
    pub operand_offset: usize,
}

/// A patchable 64-bit immediate load of a not-yet-compiled function's
/// entry address (spec §4.5 "mov_function_address").
#[derive(Debug, Clone)]
pub struct FunctionInstancePatch {
    pub function_name: String,
    pub operand_offset: usize,
}

/// A patchable 64-bit immediate load of a string literal's final address,
/// once the string pool has a home in the loaded region (spec §4.6:
/// string literals are pointers into a string pool).
#[derive(Debug, Clone)]
pub struct StringLiteralPatch {
    pub pool_offset: usize,
    pub operand_offset: usize,
}

/// Owns the emitted bytes plus every deferred patch against them.
#[derive(Debug, Default)]
pub struct CodeBuffer {
    bytes: Vec<u8>,
    label_offsets: FxHashMap<String, usize>,
    unresolved_jumps: Vec<UnresolvedJump>,
    unresolved_runtime_calls: Vec<UnresolvedRuntimeCall>,
    function_instance_patches: Vec<FunctionInstancePatch>,
    /// Deduplicated, nul-terminated UTF-8 string literal bytes, appended
    /// to the end of the loaded region once its final address is known.
    string_pool: Vec<u8>,
    string_pool_index: FxHashMap<String, usize>,
    string_literal_patches: Vec<StringLiteralPatch>,
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn emit_u8(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    pub fn emit_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    pub fn emit_i32(&mut self, value: i32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_i64(&mut self, value: i64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn emit_u64(&mut self, value: u64) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn define_label(&mut self, name: &str) {
        self.label_offsets.insert(name.to_string(), self.bytes.len());
    }

    pub fn label_offset(&self, name: &str) -> Option<usize> {
        self.label_offsets.get(name).copied()
    }

    /// Reserve a rel32 placeholder and remember it needs patching once
    /// `label` is defined.
    pub fn defer_jump(&mut self, label: &str) {
        let operand_offset = self.bytes.len();
        self.unresolved_jumps.push(UnresolvedJump { label: label.to_string(), operand_offset });
        self.emit_i32(0);
    }

    pub fn defer_runtime_call(&mut self, runtime_name: &str) {
        let operand_offset = self.bytes.len();
        self.unresolved_runtime_calls.push(UnresolvedRuntimeCall { runtime_name: runtime_name.to_string(), operand_offset });
        self.emit_i64(0);
    }

    pub fn defer_function_instance(&mut self, function_name: &str) {
        let operand_offset = self.bytes.len();
        self.function_instance_patches.push(FunctionInstancePatch { function_name: function_name.to_string(), operand_offset });
        self.emit_i64(0);
    }

    /// Intern `text` into the string pool, returning its byte offset
    /// within the pool (deduplicated, so repeated literals share storage).
    pub fn intern_string(&mut self, text: &str) -> usize {
        if let Some(offset) = self.string_pool_index.get(text) {
            return *offset;
        }
        let offset = self.string_pool.len();
        self.string_pool.extend_from_slice(text.as_bytes());
        self.string_pool.push(0);
        self.string_pool_index.insert(text.to_string(), offset);
        offset
    }

    /// Reserve a patchable 64-bit immediate for a pointer into the string
    /// pool at `pool_offset`, filled in once the loader knows where the
    /// pool landed in the mapped region.
    pub fn defer_string_literal(&mut self, pool_offset: usize) {
        let operand_offset = self.bytes.len();
        self.string_literal_patches.push(StringLiteralPatch { pool_offset, operand_offset });
        self.emit_i64(0);
    }

    pub fn unresolved_runtime_calls(&self) -> &[UnresolvedRuntimeCall] {
        &self.unresolved_runtime_calls
    }

    pub fn function_instance_patches(&self) -> &[FunctionInstancePatch] {
        &self.function_instance_patches
    }

    pub fn string_pool(&self) -> &[u8] {
        &self.string_pool
    }

    pub fn string_literal_patches(&self) -> &[StringLiteralPatch] {
        &self.string_literal_patches
    }

    pub fn patch_i32(&mut self, offset: usize, value: i32) {
        self.bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_i64(&mut self, offset: usize, value: i64) {
        self.bytes[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    /// Resolve every jump whose label is now defined; the rel32 is
    /// relative to the byte right after the 4-byte operand (the start of
    /// the next instruction), matching how `Jcc`/`CALL`/`JMP` read it.
    pub fn resolve_jumps(&mut self) -> Result<(), CodegenError> {
        let jumps = std::mem::take(&mut self.unresolved_jumps);
        for jump in jumps {
            let target = self
                .label_offsets
                .get(&jump.label)
                .copied()
                .ok_or_else(|| CodegenError::UnresolvedLabel { label: jump.label.clone(), offset: jump.operand_offset })?;
            let next_instruction = jump.operand_offset + 4;
            let rel = target as i64 - next_instruction as i64;
            self.patch_i32(jump.operand_offset, rel as i32);
        }
        Ok(())
    }

    /// Run the peephole pass, then resolve all jumps. Anything still
    /// unresolved after this (a label that genuinely never got emitted)
    /// is a compiler bug, not a user error (spec §4.5 "Failure modes").
    pub fn finalize(mut self, peephole: bool) -> Result<CodeBuffer, CodegenError> {
        if peephole {
            super::peephole::run(&mut self);
        }
        self.resolve_jumps()?;
        Ok(self)
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut Vec<u8> {
        &mut self.bytes
    }

    pub(crate) fn label_offsets_mut(&mut self) -> &mut FxHashMap<String, usize> {
        &mut self.label_offsets
    }

    pub(crate) fn relocatable_offsets_mut(&mut self) -> impl Iterator<Item = &mut usize> {
        self.unresolved_jumps
            .iter_mut()
            .map(|j| &mut j.operand_offset)
            .chain(self.unresolved_runtime_calls.iter_mut().map(|c| &mut c.operand_offset))
            .chain(self.function_instance_patches.iter_mut().map(|p| &mut p.operand_offset))
            .chain(self.string_literal_patches.iter_mut().map(|p| &mut p.operand_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_jump_resolves_to_correct_relative_offset() {
        let mut buf = CodeBuffer::new();
        buf.emit_u8(0xE9); // jmp rel32
        buf.defer_jump("target");
        buf.emit_u8(0x90); // nop filler
        buf.define_label("target");
        buf.emit_u8(0xC3); // ret
        buf.resolve_jumps().unwrap();
        let operand_offset = 1;
        let next_instruction = operand_offset + 4;
        let expected = (buf.as_bytes().len() - 1) as i32 - next_instruction as i32;
        let bytes = buf.as_bytes();
        let actual = i32::from_le_bytes(bytes[operand_offset..operand_offset + 4].try_into().unwrap());
        assert_eq!(actual, expected);
    }

    #[test]
    fn unresolved_label_is_reported() {
        let mut buf = CodeBuffer::new();
        buf.defer_jump("missing");
        assert!(buf.resolve_jumps().is_err());
    }
}
