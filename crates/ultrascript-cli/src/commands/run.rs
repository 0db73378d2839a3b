//! `ultrascript run` — compile a single source file and execute its
//! `__main` entry point, grounded in `raya-cli`'s `commands::run::run_file`
//! (read-file, compile, report the structured error to stderr on failure).

use std::path::Path;

use anyhow::{anyhow, Context};
use ultrascript_compiler::{compile_and_load, ColorChoice, CompileOptions};

pub fn execute(file: &str, no_peephole: bool, color: &str) -> anyhow::Result<i32> {
    let path = Path::new(file);
    if !path.exists() {
        return Err(anyhow!("file not found: {file}"));
    }

    install_tracing();

    let mut options = CompileOptions::load_for_entry(path).context("reading ultrascript.toml")?;
    if no_peephole {
        options.peephole = false;
    }
    options.color = parse_color(color)?;

    let source = std::fs::read_to_string(path).with_context(|| format!("reading {file}"))?;

    let region = compile_and_load(&source, file, &options, &[], resolve_runtime)?;

    // SAFETY: `compile_and_load` only returns a region whose `__main`
    // offset was validated against its mapped size, and the region is
    // `PROT_READ | PROT_EXEC` after a successful load.
    let exit_code = unsafe {
        let entry: extern "C" fn() -> i64 = std::mem::transmute(region.main_ptr());
        entry()
    };

    Ok(if exit_code == 0 { 0 } else { 1 })
}

fn parse_color(value: &str) -> anyhow::Result<ColorChoice> {
    match value {
        "auto" => Ok(ColorChoice::Auto),
        "always" => Ok(ColorChoice::Always),
        "never" => Ok(ColorChoice::Never),
        other => Err(anyhow!("invalid --color value '{other}', expected auto|always|never")),
    }
}

fn install_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ultrascript=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Backs the handful of runtime ABI entries (spec §6) this CLI actually
/// provides a native implementation for. Everything else is deliberately
/// left unresolved (spec §4.6: "no entry's behavior is implemented in this
/// crate") and surfaces as a clean `LoaderError::UnresolvedRuntimeCall`.
fn resolve_runtime(name: &str) -> Option<u64> {
    match name {
        "__console_log_v2" | "__console_log_performance" => Some(native_console_log as usize as u64),
        _ => None,
    }
}

extern "C" fn native_console_log(value: i64) -> i64 {
    println!("{value}");
    0
}
