//! Function compilation manager (spec §4.4), grounded on
//! `function_compilation_manager.h`.
//!
//! Discovery walks the AST once, assigning every function a stable
//! `function_id` in the order it is first seen. Compilation itself
//! proceeds in reverse-topological, inner-functions-first order so a
//! closure's body is fully sized before anything that captures it is
//! compiled (spec §4.4 "Compilation order").

use rustc_hash::FxHashMap;

use crate::parser::ast::{ClassDecl, Expr, ExprKind, FunctionDecl, Program, Stmt};
use crate::scope::ScopeId;

/// One discovered function: its mangled name, assigned id, and the nested
/// functions it directly contains (used to build the compilation order).
pub struct FunctionInfo<'a> {
    pub name: String,
    pub function_id: u16,
    pub decl: &'a FunctionDecl,
    pub scope_id: ScopeId,
    pub children: Vec<String>,
    pub address: Option<u64>,
    pub code_offset: Option<usize>,
    pub code_size: Option<usize>,
    /// Name of the class this function is a constructor or method of, if
    /// any — lets codegen know to treat the incoming `rdi` as `this`.
    pub owning_class: Option<String>,
}

impl<'a> FunctionInfo<'a> {
    pub fn is_compiled(&self) -> bool {
        self.address.is_some()
    }
}

/// Owns every [`FunctionInfo`] discovered in a program and the order they
/// should be compiled in.
pub struct FunctionCompilationManager<'a> {
    functions: FxHashMap<String, FunctionInfo<'a>>,
    compilation_order: Vec<String>,
    next_function_id: u16,
    anon_counter: u32,
}

impl<'a> FunctionCompilationManager<'a> {
    pub fn new() -> Self {
        Self {
            functions: FxHashMap::default(),
            compilation_order: Vec::new(),
            next_function_id: 0,
            anon_counter: 0,
        }
    }

    /// Phase 1: walk the whole program, registering every function and
    /// class method, then topologically order them inner-first.
    pub fn discover(&mut self, program: &'a Program) {
        for stmt in &program.statements {
            self.discover_stmt(stmt);
        }
        self.build_compilation_order();
    }

    fn mangled_name(&mut self, scope_id: ScopeId, decl_name: Option<&str>) -> String {
        match decl_name {
            Some(name) => format!("__fn_{}_{}", scope_id.0, name),
            None => {
                let id = self.anon_counter;
                self.anon_counter += 1;
                format!("__fn_{}_anon{}", scope_id.0, id)
            }
        }
    }

    fn register_function(&mut self, decl: &'a FunctionDecl, parent_name: Option<&str>) {
        self.register_function_as(decl, decl.name.as_deref(), parent_name, None);
    }

    /// Like [`register_function`](Self::register_function) but lets the
    /// caller override the name used for mangling — needed for class
    /// methods, whose `FunctionDecl::name` is always `None` (the real
    /// name lives on the owning `MethodDecl`) — and record which class a
    /// constructor/method belongs to.
    fn register_function_as(
        &mut self,
        decl: &'a FunctionDecl,
        name_hint: Option<&str>,
        parent_name: Option<&str>,
        owning_class: Option<&str>,
    ) {
        let scope_id = decl.scope_id.borrow().expect("parser always assigns a scope_id");
        let name = self.mangled_name(scope_id, name_hint);
        let function_id = self.next_function_id;
        self.next_function_id += 1;
        *decl.function_id.borrow_mut() = Some(function_id);

        if let Some(parent) = parent_name {
            if let Some(info) = self.functions.get_mut(parent) {
                info.children.push(name.clone());
            }
        }

        self.functions.insert(
            name.clone(),
            FunctionInfo {
                name: name.clone(),
                function_id,
                decl,
                scope_id,
                children: Vec::new(),
                address: None,
                code_offset: None,
                code_size: None,
                owning_class: owning_class.map(String::from),
            },
        );

        for stmt in &decl.body {
            self.discover_stmt_with_parent(stmt, Some(&name));
        }
    }

    fn discover_stmt(&mut self, stmt: &'a Stmt) {
        self.discover_stmt_with_parent(stmt, None);
    }

    fn discover_stmt_with_parent(&mut self, stmt: &'a Stmt, parent: Option<&str>) {
        let parent = parent.map(|s| s.to_string());
        match stmt {
            Stmt::FunctionDecl(f) => self.register_function(f, parent.as_deref()),
            Stmt::ClassDecl(c) => self.discover_class(c, parent.as_deref()),
            Stmt::VarDecl { declarations, .. } => {
                for (_, value) in declarations {
                    if let Some(v) = value {
                        self.discover_expr(v, parent.as_deref());
                    }
                }
            }
            Stmt::If { cond, then_branch, else_branch } => {
                self.discover_expr(cond, parent.as_deref());
                for s in then_branch {
                    self.discover_stmt_with_parent(s, parent.as_deref());
                }
                if let Some(e) = else_branch {
                    for s in e {
                        self.discover_stmt_with_parent(s, parent.as_deref());
                    }
                }
            }
            Stmt::ForClassic { body, cond, update, .. } => {
                if let Some(c) = cond {
                    self.discover_expr(c, parent.as_deref());
                }
                if let Some(u) = update {
                    self.discover_expr(u, parent.as_deref());
                }
                for s in body {
                    self.discover_stmt_with_parent(s, parent.as_deref());
                }
            }
            Stmt::ForEach { iterable, body, .. } => {
                self.discover_expr(iterable, parent.as_deref());
                for s in body {
                    self.discover_stmt_with_parent(s, parent.as_deref());
                }
            }
            Stmt::While { cond, body } => {
                self.discover_expr(cond, parent.as_deref());
                for s in body {
                    self.discover_stmt_with_parent(s, parent.as_deref());
                }
            }
            Stmt::Switch { discriminant, cases } => {
                self.discover_expr(discriminant, parent.as_deref());
                for case in cases {
                    if let Some(t) = &case.test {
                        self.discover_expr(t, parent.as_deref());
                    }
                    for s in &case.body {
                        self.discover_stmt_with_parent(s, parent.as_deref());
                    }
                }
            }
            Stmt::Return(Some(e)) => self.discover_expr(e, parent.as_deref()),
            Stmt::Return(None) | Stmt::Break | Stmt::Import { .. } => {}
            Stmt::Export(export) => {
                if let crate::parser::ast::ExportStmt::Declaration(d) = export {
                    self.discover_stmt_with_parent(d, parent.as_deref());
                }
            }
            Stmt::Block(b) => {
                for s in b {
                    self.discover_stmt_with_parent(s, parent.as_deref());
                }
            }
            Stmt::Expr(e) => self.discover_expr(e, parent.as_deref()),
        }
    }

    fn discover_class(&mut self, class: &'a ClassDecl, parent: Option<&str>) {
        if let Some(ctor) = &class.constructor {
            self.register_function_as(ctor, Some("constructor"), parent, Some(&class.name));
        }
        for method in &class.methods {
            self.register_function_as(&method.function, Some(&method.name), parent, Some(&class.name));
        }
        for overload in &class.operator_overloads {
            self.register_function(&overload.function, parent);
        }
    }

    fn discover_expr(&mut self, expr: &'a Expr, parent: Option<&str>) {
        match &expr.kind {
            ExprKind::FunctionExpr(f) | ExprKind::ArrowFunction(f) => self.register_function(f, parent),
            ExprKind::Binary { left, right, .. } | ExprKind::OperatorCall { left, right, .. } => {
                self.discover_expr(left, parent);
                self.discover_expr(right, parent);
            }
            ExprKind::Unary { operand, .. } => self.discover_expr(operand, parent),
            ExprKind::Ternary { cond, then_branch, else_branch } => {
                self.discover_expr(cond, parent);
                self.discover_expr(then_branch, parent);
                self.discover_expr(else_branch, parent);
            }
            ExprKind::Assignment { target, value, .. } => {
                self.discover_expr(target, parent);
                self.discover_expr(value, parent);
            }
            ExprKind::PostfixIncDec { target, .. } => self.discover_expr(target, parent),
            ExprKind::PropertyAccess { object, computed_key, .. } => {
                self.discover_expr(object, parent);
                if let Some(k) = computed_key {
                    self.discover_expr(k, parent);
                }
            }
            ExprKind::PropertyAssignment { object, computed_key, value, .. } => {
                self.discover_expr(object, parent);
                if let Some(k) = computed_key {
                    self.discover_expr(k, parent);
                }
                self.discover_expr(value, parent);
            }
            ExprKind::ArrayLiteral(items) | ExprKind::TypedArrayLiteral { elements: items, .. } => {
                for item in items {
                    self.discover_expr(item, parent);
                }
            }
            ExprKind::ObjectLiteral(fields) => {
                for (_, v) in fields {
                    self.discover_expr(v, parent);
                }
            }
            ExprKind::Slice { object, start, end } => {
                self.discover_expr(object, parent);
                if let Some(s) = start {
                    self.discover_expr(s, parent);
                }
                if let Some(e) = end {
                    self.discover_expr(e, parent);
                }
            }
            ExprKind::ArrayAccess { object, index } => {
                self.discover_expr(object, parent);
                self.discover_expr(index, parent);
            }
            ExprKind::Call { callee, args } => {
                self.discover_expr(callee, parent);
                for a in args {
                    self.discover_expr(a, parent);
                }
            }
            ExprKind::MethodCall { object, args, .. } => {
                self.discover_expr(object, parent);
                for a in args {
                    self.discover_expr(a, parent);
                }
            }
            ExprKind::New { args, dart_args, .. } => {
                for a in args {
                    self.discover_expr(a, parent);
                }
                for (_, v) in dart_args {
                    self.discover_expr(v, parent);
                }
            }
            ExprKind::SuperCall { args } | ExprKind::SuperMethodCall { args, .. } => {
                for a in args {
                    self.discover_expr(a, parent);
                }
            }
            ExprKind::Go { call } => self.discover_expr(call, parent),
            ExprKind::AwaitExpr { value } => self.discover_expr(value, parent),
            ExprKind::Template(parts) => {
                for part in parts {
                    if let crate::parser::ast::TemplatePartAst::Expr(e) = part {
                        self.discover_expr(e, parent);
                    }
                }
            }
            ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::Regex { .. }
            | ExprKind::Bool(_)
            | ExprKind::Identifier(_)
            | ExprKind::This => {}
        }
    }

    /// Reverse-topological: a function with no un-ordered children is
    /// appended first, so closures are compiled before whatever captures
    /// them (spec §4.4).
    fn build_compilation_order(&mut self) {
        let mut visited = std::collections::HashSet::new();
        let names: Vec<String> = self.functions.keys().cloned().collect();
        let mut order = Vec::new();
        for name in names {
            self.visit_for_order(&name, &mut visited, &mut order);
        }
        self.compilation_order = order;
    }

    fn visit_for_order(&self, name: &str, visited: &mut std::collections::HashSet<String>, order: &mut Vec<String>) {
        if visited.contains(name) {
            return;
        }
        visited.insert(name.to_string());
        let children = self.functions.get(name).map(|f| f.children.clone()).unwrap_or_default();
        for child in children {
            self.visit_for_order(&child, visited, order);
        }
        order.push(name.to_string());
    }

    pub fn compilation_order(&self) -> &[String] {
        &self.compilation_order
    }

    pub fn get(&self, name: &str) -> Option<&FunctionInfo<'a>> {
        self.functions.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut FunctionInfo<'a>> {
        self.functions.get_mut(name)
    }

    /// Find the function whose body occupies `scope_id` — used to recover
    /// a function expression's mangled label from its AST node, since
    /// anonymous functions can't be looked up by name.
    pub fn get_by_scope(&self, scope_id: ScopeId) -> Option<&FunctionInfo<'a>> {
        self.functions.values().find(|f| f.scope_id == scope_id)
    }

    pub fn function_id(&self, name: &str) -> Option<u16> {
        self.functions.get(name).map(|f| f.function_id)
    }

    pub fn total_function_code_size(&self) -> usize {
        self.functions.values().filter_map(|f| f.code_size).sum()
    }

    pub fn assign_address(&mut self, name: &str, address: u64, code_offset: usize, code_size: usize) {
        if let Some(info) = self.functions.get_mut(name) {
            info.address = Some(address);
            info.code_offset = Some(code_offset);
            info.code_size = Some(code_size);
        }
    }
}

impl<'a> Default for FunctionCompilationManager<'a> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    #[test]
    fn inner_function_compiles_before_outer() {
        let src = "function outer() { function inner() { return 1; } return inner(); }";
        let tokens = tokenize(src).unwrap();
        let (program, _) = parse(&tokens, "<test>").unwrap();
        let mut manager = FunctionCompilationManager::new();
        manager.discover(&program);
        let order = manager.compilation_order();
        let inner_pos = order.iter().position(|n| n.contains("inner")).unwrap();
        let outer_pos = order.iter().position(|n| n.contains("outer")).unwrap();
        assert!(inner_pos < outer_pos);
    }

    #[test]
    fn each_function_gets_a_distinct_id() {
        let src = "function a() {} function b() {}";
        let tokens = tokenize(src).unwrap();
        let (program, _) = parse(&tokens, "<test>").unwrap();
        let mut manager = FunctionCompilationManager::new();
        manager.discover(&program);
        assert_eq!(manager.compilation_order().len(), 2);
    }
}
