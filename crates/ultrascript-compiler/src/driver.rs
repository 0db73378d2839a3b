//! Top-level pipeline orchestration (spec §2 "A→H"), grounded in
//! `raya-engine`'s `Parser::parse` → `Compiler::compile_via_ir` staging and
//! instrumented with `tracing` spans per stage the way `raya-runtime` times
//! its bundle load.

use std::collections::VecDeque;

use tracing::{debug, info, instrument};
use ultrascript_sdk::UltraScriptError;

use crate::classes::ClassRegistry;
use crate::codegen::{CodeBuffer, Generator};
use crate::config::CompileOptions;
use crate::funcs::FunctionCompilationManager;
use crate::jit::{self, ExecutableRegion};
use crate::lexer::tokenize;
use crate::parser::ast::{Program, Stmt};
use crate::parser::parse;
use crate::scope::analyze;

/// Compile `source` all the way to a finished, unloaded [`CodeBuffer`].
///
/// Split out from [`compile_and_load`] so tests and tooling that only care
/// about the emitted bytes (not an executable mapping) don't need a
/// `cfg(unix)` target.
#[instrument(skip(source), fields(source_path))]
pub fn compile(source: &str, source_path: &str, options: &CompileOptions) -> Result<CodeBuffer, UltraScriptError> {
    let tokens = tokenize(source)?;
    debug!(token_count = tokens.len(), "lexed source");

    let (program, tracker) = parse(&tokens, source_path)?;
    debug!(statement_count = program.statements.len(), "parsed program");

    let root = tracker.current_scope();
    let tree = tracker.into_tree();
    let analyzed = analyze(tree, &program, root);
    debug!(scope_count = analyzed.tree.len(), "analyzed scopes");

    let mut classes = ClassRegistry::new();
    for decl in collect_class_decls(&program) {
        classes.register(decl);
    }
    debug!(class_count = classes.len(), "registered classes");

    let mut functions = FunctionCompilationManager::new();
    functions.discover(&program);
    info!(function_count = functions.compilation_order().len(), "discovered functions");

    let mut generator = Generator::new(&analyzed.tree, &functions, &classes);
    generator.compile_program(&program, root)?;
    let buffer = generator.finish(options.peephole)?;
    info!(bytes = buffer.as_bytes().len(), "code generation complete");
    Ok(buffer)
}

/// Compile `source` and load it into executable memory, ready to invoke
/// `__main` (spec §4.7). `resolve_runtime` supplies addresses for the
/// runtime ABI surface of §6; `function_addresses` supplies addresses for
/// any functions compiled ahead of time elsewhere (empty for a single
/// self-contained compile).
#[cfg(unix)]
pub fn compile_and_load(
    source: &str,
    source_path: &str,
    options: &CompileOptions,
    function_addresses: &[(String, u64)],
    resolve_runtime: impl Fn(&str) -> Option<u64>,
) -> Result<ExecutableRegion, UltraScriptError> {
    let buffer = compile(source, source_path, options)?;
    let region = jit::load(&buffer, function_addresses, resolve_runtime)?;
    Ok(region)
}

/// Breadth-first walk collecting every `ClassDecl` reachable from the
/// program, including ones nested inside function bodies — a class must
/// be registered (and thus assigned a `type_id`) regardless of where in
/// the source tree it's declared.
fn collect_class_decls(program: &Program) -> Vec<&crate::parser::ast::ClassDecl> {
    let mut found = Vec::new();
    let mut queue: VecDeque<&Stmt> = program.statements.iter().collect();
    while let Some(stmt) = queue.pop_front() {
        match stmt {
            Stmt::ClassDecl(decl) => found.push(decl),
            Stmt::FunctionDecl(decl) => queue.extend(decl.body.iter()),
            Stmt::If { then_branch, else_branch, .. } => {
                queue.extend(then_branch.iter());
                if let Some(branch) = else_branch {
                    queue.extend(branch.iter());
                }
            }
            Stmt::ForClassic { body, .. } | Stmt::While { body, .. } | Stmt::Block(body) => {
                queue.extend(body.iter());
            }
            Stmt::ForEach { body, .. } => queue.extend(body.iter()),
            _ => {}
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_function_and_top_level_call() {
        let source = "function add(a, b) { return a + b; } console.log(add(1, 2));";
        let options = CompileOptions::default();
        let buffer = compile(source, "<test>", &options).unwrap();
        assert!(!buffer.as_bytes().is_empty());
        assert!(buffer.label_offset("__main").is_some());
    }

    #[test]
    fn registers_classes_declared_at_top_level() {
        let source = "class Point { x: number; y: number; } new Point();";
        let options = CompileOptions::default();
        let buffer = compile(source, "<test>", &options).unwrap();
        assert!(buffer.label_offset("__main").is_some());
    }
}
