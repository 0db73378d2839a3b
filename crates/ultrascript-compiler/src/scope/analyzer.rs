//! Two-pass static scope analysis (spec §4.3), grounded on
//! `static_scope_analyzer.h`.
//!
//! Pass 1 corrects the raw tree the [`crate::scope::tracker`] built during
//! parsing: `var` declarations hoist to the nearest enclosing function
//! scope, and any block scope left containing only hoisted (`var`)
//! declarations is marked `can_be_optimized_away` — per `SPEC_FULL.md` §9
//! Open Question 2 this merge is mandatory, not advisory, so that scope ids
//! remain deterministic across runs.
//!
//! Pass 2 performs escape analysis and builds the register/frame plan:
//! each scope's ancestor scopes are ranked by reference frequency, the
//! first three get `r12`/`r13`/`r14`, the rest fall back to stack slots,
//! and each scope's own variables are offset-packed by alignment group
//! then by frequency.

use rustc_hash::FxHashMap;

use crate::parser::ast::{DeclarationKind, Expr, ExprKind, FunctionDecl, Program, Stmt};
use crate::scope::tree::{AncestorRegister, FrameSource, ScopeId, ScopeTree};

pub struct AnalyzedScopes {
    pub tree: ScopeTree,
}

/// Run both passes over `tree` using `program` to find every identifier
/// reference (hoisting needs declarations, escape analysis needs uses).
pub fn analyze(tree: ScopeTree, program: &Program, root: ScopeId) -> AnalyzedScopes {
    let mut tree = tree;
    hoist_declarations(&mut tree, root);
    let mut frequencies: FxHashMap<(ScopeId, String), u32> = FxHashMap::default();
    count_references(&program.statements, root, &tree, &mut frequencies);
    mark_escapes(&mut tree, &program.statements, root);
    for scope in 0..tree.len() {
        let id = ScopeId(scope as u32);
        apply_frequencies(&mut tree, id, &frequencies);
        build_register_plan(&mut tree, id);
        pack_offsets(&mut tree, id);
    }
    merge_var_only_scopes(&mut tree, root);
    AnalyzedScopes { tree }
}

/// Pass 1: move every `var` declaration up to its nearest enclosing
/// function scope. Declarations already made there are a no-op.
fn hoist_declarations(tree: &mut ScopeTree, scope: ScopeId) {
    let children = tree.get(scope).children.clone();
    let to_hoist: Vec<_> = tree
        .get(scope)
        .declared_variables
        .iter()
        .filter(|v| v.kind == DeclarationKind::Var)
        .cloned()
        .collect();

    if !to_hoist.is_empty() && !tree.get(scope).is_function_scope {
        let target = tree.nearest_function_scope(scope);
        if target != scope {
            for var in &to_hoist {
                if tree.get(target).find_variable(&var.name).is_none() {
                    tree.get_mut(target).declared_variables.push(var.clone());
                }
            }
            tree.get_mut(scope)
                .declared_variables
                .retain(|v| v.kind != DeclarationKind::Var);
        }
    }

    for child in children {
        hoist_declarations(tree, child);
    }
}

/// A block scope that hoisted away all of its `var`s and declares nothing
/// else collapses into its parent at codegen time (spec §4.3
/// "can_be_optimized_away").
fn merge_var_only_scopes(tree: &mut ScopeTree, scope: ScopeId) {
    let children = tree.get(scope).children.clone();
    for child in &children {
        merge_var_only_scopes(tree, *child);
    }
    if !tree.get(scope).is_function_scope
        && tree.get(scope).declared_variables.is_empty()
        && tree.get(scope).declared_functions.is_empty()
    {
        tree.get_mut(scope).can_be_optimized_away = true;
    }
}

fn count_references(
    stmts: &[Stmt],
    scope: ScopeId,
    tree: &ScopeTree,
    freq: &mut FxHashMap<(ScopeId, String), u32>,
) {
    for stmt in stmts {
        walk_stmt(stmt, scope, tree, freq);
    }
}

fn walk_stmt(
    stmt: &Stmt,
    scope: ScopeId,
    tree: &ScopeTree,
    freq: &mut FxHashMap<(ScopeId, String), u32>,
) {
    match stmt {
        Stmt::VarDecl { declarations, .. } => {
            for (_, value) in declarations {
                if let Some(v) = value {
                    walk_expr(v, scope, tree, freq);
                }
            }
        }
        Stmt::FunctionDecl(f) => walk_function(f, tree, freq),
        Stmt::ClassDecl(c) => {
            if let Some(ctor) = &c.constructor {
                walk_function(ctor, tree, freq);
            }
            for m in &c.methods {
                walk_function(&m.function, tree, freq);
            }
            for o in &c.operator_overloads {
                walk_function(&o.function, tree, freq);
            }
        }
        Stmt::If { cond, then_branch, else_branch } => {
            walk_expr(cond, scope, tree, freq);
            count_references(then_branch, scope, tree, freq);
            if let Some(e) = else_branch {
                count_references(e, scope, tree, freq);
            }
        }
        Stmt::ForClassic { cond, update, body, .. } => {
            if let Some(c) = cond {
                walk_expr(c, scope, tree, freq);
            }
            if let Some(u) = update {
                walk_expr(u, scope, tree, freq);
            }
            count_references(body, scope, tree, freq);
        }
        Stmt::ForEach { iterable, body, .. } => {
            walk_expr(iterable, scope, tree, freq);
            count_references(body, scope, tree, freq);
        }
        Stmt::While { cond, body } => {
            walk_expr(cond, scope, tree, freq);
            count_references(body, scope, tree, freq);
        }
        Stmt::Switch { discriminant, cases } => {
            walk_expr(discriminant, scope, tree, freq);
            for case in cases {
                if let Some(t) = &case.test {
                    walk_expr(t, scope, tree, freq);
                }
                count_references(&case.body, scope, tree, freq);
            }
        }
        Stmt::Return(Some(e)) => walk_expr(e, scope, tree, freq),
        Stmt::Return(None) | Stmt::Break => {}
        Stmt::Import { .. } => {}
        Stmt::Export(_) => {}
        Stmt::Block(b) => count_references(b, scope, tree, freq),
        Stmt::Expr(e) => walk_expr(e, scope, tree, freq),
    }
}

fn walk_function(f: &FunctionDecl, tree: &ScopeTree, freq: &mut FxHashMap<(ScopeId, String), u32>) {
    if let Some(inner) = *f.scope_id.borrow() {
        count_references(&f.body, inner, tree, freq);
    }
}

fn walk_expr(expr: &Expr, scope: ScopeId, tree: &ScopeTree, freq: &mut FxHashMap<(ScopeId, String), u32>) {
    match &expr.kind {
        ExprKind::Identifier(name) => {
            if let Some(owner) = tree.resolve(scope, name) {
                *freq.entry((owner, name.clone())).or_insert(0) += 1;
            }
        }
        ExprKind::Binary { left, right, .. } => {
            walk_expr(left, scope, tree, freq);
            walk_expr(right, scope, tree, freq);
        }
        ExprKind::Unary { operand, .. } => walk_expr(operand, scope, tree, freq),
        ExprKind::Ternary { cond, then_branch, else_branch } => {
            walk_expr(cond, scope, tree, freq);
            walk_expr(then_branch, scope, tree, freq);
            walk_expr(else_branch, scope, tree, freq);
        }
        ExprKind::Assignment { target, value, .. } => {
            walk_expr(target, scope, tree, freq);
            walk_expr(value, scope, tree, freq);
        }
        ExprKind::PostfixIncDec { target, .. } => walk_expr(target, scope, tree, freq),
        ExprKind::PropertyAccess { object, computed_key, .. } => {
            walk_expr(object, scope, tree, freq);
            if let Some(k) = computed_key {
                walk_expr(k, scope, tree, freq);
            }
        }
        ExprKind::PropertyAssignment { object, computed_key, value, .. } => {
            walk_expr(object, scope, tree, freq);
            if let Some(k) = computed_key {
                walk_expr(k, scope, tree, freq);
            }
            walk_expr(value, scope, tree, freq);
        }
        ExprKind::ArrayLiteral(items) => {
            for item in items {
                walk_expr(item, scope, tree, freq);
            }
        }
        ExprKind::ObjectLiteral(fields) => {
            for (_, v) in fields {
                walk_expr(v, scope, tree, freq);
            }
        }
        ExprKind::TypedArrayLiteral { elements, .. } => {
            for item in elements {
                walk_expr(item, scope, tree, freq);
            }
        }
        ExprKind::Slice { object, start, end } => {
            walk_expr(object, scope, tree, freq);
            if let Some(s) = start {
                walk_expr(s, scope, tree, freq);
            }
            if let Some(e) = end {
                walk_expr(e, scope, tree, freq);
            }
        }
        ExprKind::ArrayAccess { object, index } => {
            walk_expr(object, scope, tree, freq);
            walk_expr(index, scope, tree, freq);
        }
        ExprKind::Call { callee, args } => {
            walk_expr(callee, scope, tree, freq);
            for a in args {
                walk_expr(a, scope, tree, freq);
            }
        }
        ExprKind::MethodCall { object, computed_method, args, .. } => {
            walk_expr(object, scope, tree, freq);
            if let Some(m) = computed_method {
                walk_expr(m, scope, tree, freq);
            }
            for a in args {
                walk_expr(a, scope, tree, freq);
            }
        }
        ExprKind::New { args, dart_args, .. } => {
            for a in args {
                walk_expr(a, scope, tree, freq);
            }
            for (_, v) in dart_args {
                walk_expr(v, scope, tree, freq);
            }
        }
        ExprKind::SuperCall { args } | ExprKind::SuperMethodCall { args, .. } => {
            for a in args {
                walk_expr(a, scope, tree, freq);
            }
        }
        ExprKind::OperatorCall { left, right, .. } => {
            walk_expr(left, scope, tree, freq);
            walk_expr(right, scope, tree, freq);
        }
        ExprKind::FunctionExpr(f) | ExprKind::ArrowFunction(f) => walk_function(f, tree, freq),
        ExprKind::Go { call } => walk_expr(call, scope, tree, freq),
        ExprKind::AwaitExpr { value } => walk_expr(value, scope, tree, freq),
        ExprKind::Template(parts) => {
            for part in parts {
                if let crate::parser::ast::TemplatePartAst::Expr(e) = part {
                    walk_expr(e, scope, tree, freq);
                }
            }
        }
        ExprKind::Number(_) | ExprKind::Str(_) | ExprKind::Regex { .. } | ExprKind::Bool(_) | ExprKind::This => {}
    }
}

/// Pass 2a: a variable captured by a function whose own scope is a
/// descendant of the declaring scope escapes onto the heap frame
/// (spec §4.3 "Escape analysis").
fn mark_escapes(tree: &mut ScopeTree, stmts: &[Stmt], scope: ScopeId) {
    mark_escapes_inner(tree, stmts, scope, scope);
}

fn mark_escapes_inner(tree: &mut ScopeTree, stmts: &[Stmt], scope: ScopeId, declaring_scope: ScopeId) {
    for stmt in stmts {
        match stmt {
            Stmt::FunctionDecl(f) => mark_function_escapes(tree, f),
            Stmt::ClassDecl(c) => {
                if let Some(ctor) = &c.constructor {
                    mark_function_escapes(tree, ctor);
                }
                for m in &c.methods {
                    mark_function_escapes(tree, &m.function);
                }
            }
            Stmt::If { then_branch, else_branch, .. } => {
                mark_escapes_inner(tree, then_branch, scope, declaring_scope);
                if let Some(e) = else_branch {
                    mark_escapes_inner(tree, e, scope, declaring_scope);
                }
            }
            Stmt::ForClassic { body, .. } | Stmt::ForEach { body, .. } | Stmt::While { body, .. } => {
                mark_escapes_inner(tree, body, scope, declaring_scope);
            }
            Stmt::Switch { cases, .. } => {
                for case in cases {
                    mark_escapes_inner(tree, &case.body, scope, declaring_scope);
                }
            }
            Stmt::Block(b) => mark_escapes_inner(tree, b, scope, declaring_scope),
            _ => {}
        }
    }
}

fn mark_function_escapes(tree: &mut ScopeTree, f: &FunctionDecl) {
    let Some(inner) = *f.scope_id.borrow() else { return };
    for ancestor in tree.ancestors(inner) {
        if ancestor == inner {
            continue;
        }
        for var in tree.get_mut(ancestor).declared_variables.iter_mut() {
            var.is_escaping = true;
        }
    }
    mark_escapes_inner(tree, &f.body, inner, inner);
}

fn apply_frequencies(tree: &mut ScopeTree, scope: ScopeId, freq: &FxHashMap<(ScopeId, String), u32>) {
    let node = tree.get_mut(scope);
    for var in node.declared_variables.iter_mut() {
        if let Some(count) = freq.get(&(scope, var.name.clone())) {
            var.access_frequency = *count;
        }
    }
}

/// Rank ancestor scopes by how often their variables are referenced from
/// `scope`'s descendants and assign the top three to `r12`/`r13`/`r14`.
fn build_register_plan(tree: &mut ScopeTree, scope: ScopeId) {
    let ancestors: Vec<ScopeId> = tree
        .ancestors(scope)
        .into_iter()
        .filter(|a| *a != scope)
        .collect();

    let mut ranked: Vec<(ScopeId, u32)> = ancestors
        .iter()
        .map(|a| {
            let total: u32 = tree.get(*a).declared_variables.iter().map(|v| v.access_frequency).sum();
            (*a, total)
        })
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0 .0.cmp(&b.0 .0)));

    let node = tree.get_mut(scope);
    node.priority_sorted_parent_scopes = ranked.iter().map(|(id, _)| id.0).collect();
    node.register_plan.clear();
    for (i, (id, _)) in ranked.iter().enumerate() {
        let source = match AncestorRegister::POOL.get(i) {
            Some(reg) => FrameSource::Register(*reg),
            None => FrameSource::StackSlot(i - AncestorRegister::POOL.len()),
        };
        node.register_plan.insert(id.0, source);
        node.self_parent_needs.insert(id.0);
    }
}

/// Offset-pack a scope's own declared variables by alignment group (8, 4,
/// 2, 1 bytes, widest first) then by descending access frequency within
/// each group, rounding the final size up to 8 bytes (spec §4.3
/// "Frame packing").
fn pack_offsets(tree: &mut ScopeTree, scope: ScopeId) {
    let node = tree.get_mut(scope);
    let mut indices: Vec<usize> = (0..node.declared_variables.len()).collect();
    indices.sort_by(|&a, &b| {
        let va = &node.declared_variables[a];
        let vb = &node.declared_variables[b];
        vb.data_type
            .alignment()
            .cmp(&va.data_type.alignment())
            .then(vb.access_frequency.cmp(&va.access_frequency))
            .then(va.name.cmp(&vb.name))
    });

    let mut offset: u64 = 0;
    node.variable_offsets.clear();
    for idx in indices {
        let var = &node.declared_variables[idx];
        let size = var.data_type.size_bytes().max(1) as u64;
        let align = var.data_type.alignment().max(1) as u64;
        offset = (offset + align - 1) / align * align;
        node.variable_offsets.insert(var.name.clone(), offset);
        offset += size;
    }
    node.total_scope_frame_size = (offset + 7) / 8 * 8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::tracker::ParseTimeScopeTracker;
    use ultrascript_sdk::DataType;

    fn empty_program() -> Program {
        Program { statements: Vec::new(), source_path: "test".into() }
    }

    #[test]
    fn var_in_block_hoists_to_function_scope() {
        let mut tracker = ParseTimeScopeTracker::new();
        let func = tracker.enter_scope(true);
        tracker.enter_scope(false);
        tracker.declare_variable("i", DeclarationKind::Var, DataType::Int32);
        tracker.exit_scope();
        let block = {
            let tree = tracker.into_tree();
            let analyzed = analyze(tree, &empty_program(), func);
            assert!(analyzed.tree.get(func).find_variable("i").is_some());
            analyzed.tree.get(func).children[0]
        };
        let _ = block;
    }

    #[test]
    fn register_plan_prefers_ancestor_registers() {
        let mut tracker = ParseTimeScopeTracker::new();
        let root = tracker.current_scope();
        tracker.declare_variable("a", DeclarationKind::Let, DataType::Int32);
        let f1 = tracker.enter_scope(true);
        let f2 = tracker.enter_scope(true);
        let f3 = tracker.enter_scope(true);
        let f4 = tracker.enter_scope(true);
        let tree = tracker.into_tree();
        let analyzed = analyze(tree, &empty_program(), root);
        let deepest = analyzed.tree.get(f4);
        assert!(deepest.priority_sorted_parent_scopes.contains(&root.0));
        let _ = (f1, f2, f3);
    }
}
