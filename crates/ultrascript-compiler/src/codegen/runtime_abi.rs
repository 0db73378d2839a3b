//! The static extern-"C" runtime surface both the generator and the JIT
//! loader agree on (spec §5 "Runtime ABI").
//!
//! Per `SPEC_FULL.md` §9 Open Question 3, the `__*_v2` names are
//! authoritative; the legacy `__*_performance` spellings some original
//! call sites used are accepted as aliases resolving to the same entry.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy)]
pub struct RuntimeEntryInfo {
    pub arg_count: u8,
    pub returns_float: bool,
}

static ENTRIES: Lazy<FxHashMap<&'static str, RuntimeEntryInfo>> = Lazy::new(|| {
    let mut m = FxHashMap::default();
    m.insert("__console_log_v2", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__console_log_performance", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__object_get_property_by_hash_v2", RuntimeEntryInfo { arg_count: 2, returns_float: false });
    m.insert("__object_get_property_by_hash_performance", RuntimeEntryInfo { arg_count: 2, returns_float: false });
    m.insert("__object_set_property_by_hash_v2", RuntimeEntryInfo { arg_count: 3, returns_float: false });
    m.insert("__object_set_property_by_hash_performance", RuntimeEntryInfo { arg_count: 3, returns_float: false });
    m.insert("__object_allocate_v2", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__object_allocate_performance", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__heap_scope_allocate_v2", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__heap_scope_allocate_performance", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__goroutine_spawn_v2", RuntimeEntryInfo { arg_count: 2, returns_float: false });
    m.insert("__goroutine_spawn_performance", RuntimeEntryInfo { arg_count: 2, returns_float: false });
    m.insert("__lock_acquire_v2", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__lock_acquire_performance", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__lock_release_v2", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__lock_release_performance", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__string_concat_v2", RuntimeEntryInfo { arg_count: 2, returns_float: false });
    m.insert("__string_concat_performance", RuntimeEntryInfo { arg_count: 2, returns_float: false });
    // Named exactly as `runtime_syscalls.h` spells them: unlike most of
    // this table, the lock surface never grew `_v2`/`_performance`
    // variants (spec §5, §8 scenario 5).
    m.insert("__runtime_lock_create", RuntimeEntryInfo { arg_count: 0, returns_float: false });
    m.insert("__runtime_lock_lock", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__runtime_lock_unlock", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__runtime_lock_try_lock", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__runtime_lock_try_lock_for", RuntimeEntryInfo { arg_count: 2, returns_float: false });
    m.insert("__runtime_lock_is_locked_by_current", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__array_length_v2", RuntimeEntryInfo { arg_count: 1, returns_float: false });
    m.insert("__array_get_element_v2", RuntimeEntryInfo { arg_count: 2, returns_float: false });
    m
});

pub fn lookup(name: &str) -> Option<RuntimeEntryInfo> {
    ENTRIES.get(name).copied()
}

pub fn is_known(name: &str) -> bool {
    ENTRIES.contains_key(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v2_and_legacy_alias_agree() {
        let v2 = lookup("__console_log_v2").unwrap();
        let legacy = lookup("__console_log_performance").unwrap();
        assert_eq!(v2.arg_count, legacy.arg_count);
        assert_eq!(v2.returns_float, legacy.returns_float);
    }

    #[test]
    fn unknown_name_is_none() {
        assert!(lookup("__not_a_real_entry").is_none());
    }
}
