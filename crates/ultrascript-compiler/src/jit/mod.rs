//! JIT loader (spec §4.7), grounded on `raya-runtime/src/bundle/loader.rs`'s
//! `AotCodeRegion`: allocate a page-aligned executable region, copy the
//! generated code in, patch every deferred runtime call and function
//! address, then flip the region read-exec.
//!
//! Unlike the teacher's `AotCodeRegion`, this region has no `Drop` impl
//! that unmaps it (spec §4.7 step 8: "not unmapped on teardown ... the
//! OS reclaims the pages at process exit").

use ultrascript_sdk::LoaderError;

use crate::codegen::runtime_abi;
use crate::codegen::x86::buffer::CodeBuffer;

/// An mmap'd, page-protected region holding finished machine code.
///
/// `Send + Sync` because the region is read-only-after-finalize once
/// `mprotect(PROT_READ|PROT_EXEC)` has run: concurrent goroutines reading
/// and calling into it is sound, and nothing ever writes to it again.
pub struct ExecutableRegion {
    base: *const u8,
    size: usize,
    main_offset: usize,
}

unsafe impl Send for ExecutableRegion {}
unsafe impl Sync for ExecutableRegion {}

impl ExecutableRegion {
    /// Byte size of the mapped region (rounded up to a page).
    pub fn size(&self) -> usize {
        self.size
    }

    /// Raw pointer to the start of the region.
    pub fn base_ptr(&self) -> *const u8 {
        self.base
    }

    /// Pointer to the `__main` entry point, ready to be transmuted to a
    /// `extern "C" fn() -> i64` and invoked as the root goroutine.
    pub fn main_ptr(&self) -> *const u8 {
        // SAFETY: `main_offset` was validated against the region's size
        // when the region was constructed.
        unsafe { self.base.add(self.main_offset) }
    }
}

fn page_size() -> usize {
    // SAFETY: sysconf with a well-known name is always safe to call.
    let raw = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if raw > 0 {
        raw as usize
    } else {
        4096
    }
}

fn round_up(value: usize, multiple: usize) -> usize {
    (value + multiple - 1) / multiple * multiple
}

/// Load a finished [`CodeBuffer`] into executable memory.
///
/// `resolve_runtime` maps a runtime entry-point name to its absolute
/// address; the driver supplies this from whatever runtime surface is
/// actually linked in (spec §4.6 "no entry's behavior is implemented in
/// this crate").
#[cfg(unix)]
pub fn load(
    buffer: &CodeBuffer,
    function_addresses: &[(String, u64)],
    resolve_runtime: impl Fn(&str) -> Option<u64>,
) -> Result<ExecutableRegion, LoaderError> {
    let code = buffer.as_bytes();
    let string_pool = buffer.string_pool();
    let size = round_up((code.len() + string_pool.len()).max(1), page_size());

    let region = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_PRIVATE | libc::MAP_ANON,
            -1,
            0,
        )
    };
    if region == libc::MAP_FAILED {
        return Err(LoaderError::MmapFailed(std::io::Error::last_os_error()));
    }

    unsafe {
        std::ptr::copy_nonoverlapping(code.as_ptr(), region as *mut u8, code.len());
        std::ptr::copy_nonoverlapping(string_pool.as_ptr(), (region as *mut u8).add(code.len()), string_pool.len());
    }

    for patch in buffer.string_literal_patches() {
        unsafe {
            let address = (region as *mut u8).add(code.len() + patch.pool_offset) as i64;
            let slot = (region as *mut u8).add(patch.operand_offset) as *mut i64;
            std::ptr::write_unaligned(slot, address);
        }
    }

    for call in buffer.unresolved_runtime_calls() {
        if !runtime_abi::is_known(&call.runtime_name) {
            return Err(LoaderError::UnresolvedRuntimeCall(call.runtime_name.clone()));
        }
        let target = resolve_runtime(&call.runtime_name)
            .ok_or_else(|| LoaderError::UnresolvedRuntimeCall(call.runtime_name.clone()))?;
        unsafe {
            let slot = (region as *mut u8).add(call.operand_offset) as *mut i64;
            std::ptr::write_unaligned(slot, target as i64);
        }
    }

    for patch in buffer.function_instance_patches() {
        let address = function_addresses
            .iter()
            .find(|(name, _)| name == &patch.function_name)
            .map(|(_, addr)| *addr)
            .ok_or_else(|| LoaderError::UnresolvedRuntimeCall(patch.function_name.clone()))?;
        unsafe {
            let slot = (region as *mut u8).add(patch.operand_offset) as *mut i64;
            std::ptr::write_unaligned(slot, address as i64);
        }
    }

    let result = unsafe { libc::mprotect(region, size, libc::PROT_READ | libc::PROT_EXEC) };
    if result != 0 {
        unsafe {
            libc::munmap(region, size);
        }
        return Err(LoaderError::MprotectFailed(std::io::Error::last_os_error()));
    }

    let main_offset = buffer.label_offset("__main").ok_or(LoaderError::MainNotFound)?;

    Ok(ExecutableRegion { base: region as *const u8, size, main_offset })
}

#[cfg(not(unix))]
pub fn load(
    _buffer: &CodeBuffer,
    _function_addresses: &[(String, u64)],
    _resolve_runtime: impl Fn(&str) -> Option<u64>,
) -> Result<ExecutableRegion, LoaderError> {
    Err(LoaderError::MmapFailed(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "JIT loader only supports cfg(unix) targets",
    )))
}

#[cfg(test)]
#[cfg(unix)]
mod tests {
    use super::*;

    #[test]
    fn loads_a_bare_ret_and_finds_main() {
        let mut buffer = CodeBuffer::new();
        buffer.define_label("__main");
        buffer.emit_u8(0xC3); // ret
        let loaded = load(&buffer, &[], |_| None).unwrap();
        assert_eq!(loaded.main_ptr(), loaded.base_ptr());
        unsafe {
            let f: extern "C" fn() = std::mem::transmute(loaded.main_ptr());
            f();
        }
    }

    #[test]
    fn missing_main_label_is_reported() {
        let mut buffer = CodeBuffer::new();
        buffer.emit_u8(0xC3);
        assert!(matches!(load(&buffer, &[], |_| None), Err(LoaderError::MainNotFound)));
    }

    #[test]
    fn unknown_runtime_call_is_reported() {
        let mut buffer = CodeBuffer::new();
        buffer.define_label("__main");
        buffer.defer_runtime_call("__not_a_real_entry");
        buffer.emit_u8(0xC3);
        assert!(matches!(load(&buffer, &[], |_| None), Err(LoaderError::UnresolvedRuntimeCall(_))));
    }
}
