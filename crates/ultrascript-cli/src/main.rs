//! UltraScript CLI: a single `run` subcommand over the compiler engine
//! (spec §6 "External interfaces"), grounded in `raya-cli`'s
//! `clap`-derived `Cli`/`Commands` shape and top-level error-to-exit-code
//! conversion in `main.rs`.
//!
//! The teacher's many package-manager/tooling subcommands (`build`,
//! `test`, `fmt`, `lsp`, `pm …`) are out of this crate's scope (spec §6)
//! and are not carried over.

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ultrascript")]
#[command(about = "UltraScript JIT compiler driver")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file and execute its `__main` entry point
    #[command(alias = "r")]
    Run {
        /// Path to the `.uts` source file
        file: String,
        /// Disable the peephole optimization pass
        #[arg(long)]
        no_peephole: bool,
        /// Reserved for a future adaptive-JIT tier; accepted and ignored
        /// for compatibility with the teacher's `--jit-threshold` flag
        /// shape, since this compiler always compiles ahead of execution.
        #[arg(long, default_value = "1000")]
        jit_threshold: u32,
        /// Diagnostic color behavior
        #[arg(long, default_value = "auto")]
        color: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn dispatch(cmd: Commands) -> anyhow::Result<i32> {
    match cmd {
        Commands::Run { file, no_peephole, jit_threshold: _, color } => {
            commands::run::execute(&file, no_peephole, &color)
        }
    }
}
