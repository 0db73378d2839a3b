//! Compile-time configuration (spec §3 "Configuration"), grounded in
//! `raya-cli`'s manifest/flag-merging pattern in `commands/run.rs`.
//!
//! Values load from an optional `ultrascript.toml` next to the entry file
//! and are then overridden field-by-field by whatever the embedder (CLI or
//! library consumer) passes explicitly, the same "file provides defaults,
//! flags win" shape `raya-cli` uses for `raya.toml`.

use std::path::Path;

use serde::Deserialize;

/// Terminal color behavior for diagnostic rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorChoice {
    Auto,
    Always,
    Never,
}

impl Default for ColorChoice {
    fn default() -> Self {
        ColorChoice::Auto
    }
}

impl From<ColorChoice> for termcolor::ColorChoice {
    fn from(value: ColorChoice) -> Self {
        match value {
            ColorChoice::Auto => {
                if std::env::var_os("NO_COLOR").is_some() {
                    termcolor::ColorChoice::Never
                } else {
                    termcolor::ColorChoice::Auto
                }
            }
            ColorChoice::Always => termcolor::ColorChoice::Always,
            ColorChoice::Never => termcolor::ColorChoice::Never,
        }
    }
}

/// Options governing a single compile-and-load run.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    pub peephole: bool,
    pub color: ColorChoice,
    pub heap_scope_initial_capacity: usize,
    /// Advisory override of the `r12`/`r13`/`r14` ancestor-register pool,
    /// for tests that want to force spilling to stack slots. `None` uses
    /// the analyzer's normal three-register pool.
    pub stack_register_pool: Option<usize>,
    /// Trap (`int3`) instead of aborting the process on an internal
    /// codegen assertion, so a debugger can catch it.
    pub emit_int3_on_panic: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            peephole: true,
            color: ColorChoice::Auto,
            heap_scope_initial_capacity: 64,
            stack_register_pool: None,
            emit_int3_on_panic: false,
        }
    }
}

impl CompileOptions {
    /// Load `ultrascript.toml` next to `entry_file` if present, else fall
    /// back to defaults. A malformed manifest is reported as an I/O-style
    /// error rather than silently ignored.
    pub fn load_for_entry(entry_file: &Path) -> std::io::Result<Self> {
        let manifest_path = entry_file
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("ultrascript.toml");
        if !manifest_path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&manifest_path)?;
        toml::from_str(&text).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let opts = CompileOptions::default();
        assert!(opts.peephole);
        assert_eq!(opts.color, ColorChoice::Auto);
        assert!(opts.stack_register_pool.is_none());
    }

    #[test]
    fn missing_manifest_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let entry = dir.path().join("main.uts");
        std::fs::write(&entry, "").unwrap();
        let opts = CompileOptions::load_for_entry(&entry).unwrap();
        assert!(opts.peephole);
    }

    #[test]
    fn manifest_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ultrascript.toml"), "peephole = false\ncolor = \"never\"\n").unwrap();
        let entry = dir.path().join("main.uts");
        std::fs::write(&entry, "").unwrap();
        let opts = CompileOptions::load_for_entry(&entry).unwrap();
        assert!(!opts.peephole);
        assert_eq!(opts.color, ColorChoice::Never);
    }
}
