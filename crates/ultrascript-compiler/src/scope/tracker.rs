//! Minimal parse-time scope tracking.
//!
//! Grounded on `parse_time_scope_tracker.h`: during parsing we only need to
//! know which scope a declaration or reference belongs to, not how it will
//! ultimately be laid out. No packing, escape analysis or reference
//! resolution happens here — that is the job of [`crate::scope::analyzer`],
//! which runs once the whole AST exists.

use ultrascript_sdk::DataType;

use crate::parser::ast::DeclarationKind;
use crate::scope::tree::{ScopeId, ScopeTree, VariableDecl};

/// Tracks the current scope while the parser descends into blocks and
/// function bodies, building the raw (unanalyzed) scope tree as it goes.
pub struct ParseTimeScopeTracker {
    tree: ScopeTree,
    current: ScopeId,
    stack: Vec<ScopeId>,
}

impl ParseTimeScopeTracker {
    pub fn new() -> Self {
        let mut tree = ScopeTree::new();
        let root = tree.new_root();
        Self {
            tree,
            current: root,
            stack: vec![root],
        }
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current
    }

    /// Enter a new nested scope. `is_function_scope` marks a function body
    /// (the only kind of scope `var` hoists to).
    pub fn enter_scope(&mut self, is_function_scope: bool) -> ScopeId {
        let child = self.tree.new_child(self.current, is_function_scope);
        self.stack.push(child);
        self.current = child;
        child
    }

    /// Leave the current scope, returning to its parent.
    pub fn exit_scope(&mut self) {
        self.stack.pop();
        self.current = *self.stack.last().expect("unbalanced exit_scope");
    }

    /// Record a declaration at the current scope, with no hoisting —
    /// hoisting is a Pass 1 analyzer concern (spec §4.3).
    pub fn declare_variable(&mut self, name: &str, kind: DeclarationKind, data_type: DataType) {
        let scope = self.tree.get_mut(self.current);
        if scope.find_variable(name).is_none() {
            scope.declared_variables.push(VariableDecl::new(name, kind, data_type));
        }
    }

    pub fn register_function_in_current_scope(&mut self, name: &str) {
        self.tree.get_mut(self.current).declared_functions.push(name.to_string());
    }

    /// Consume the tracker, handing its raw tree to the analyzer.
    pub fn into_tree(self) -> ScopeTree {
        self.tree
    }
}

impl Default for ParseTimeScopeTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_scopes_restore_parent_on_exit() {
        let mut tracker = ParseTimeScopeTracker::new();
        let root = tracker.current_scope();
        tracker.declare_variable("x", DeclarationKind::Var, DataType::Int32);
        tracker.enter_scope(true);
        tracker.declare_variable("y", DeclarationKind::Let, DataType::Int32);
        tracker.exit_scope();
        assert_eq!(tracker.current_scope(), root);
        let tree = tracker.into_tree();
        assert!(tree.get(root).find_variable("x").is_some());
    }

    #[test]
    fn redeclaration_in_same_scope_is_idempotent() {
        let mut tracker = ParseTimeScopeTracker::new();
        let root = tracker.current_scope();
        tracker.declare_variable("x", DeclarationKind::Var, DataType::Any);
        tracker.declare_variable("x", DeclarationKind::Var, DataType::Any);
        let tree = tracker.into_tree();
        assert_eq!(tree.get(root).declared_variables.len(), 1);
    }
}
