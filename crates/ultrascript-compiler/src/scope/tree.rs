//! The scope tree arena (spec §3 "Scope tree", Design Note §9 "arena
//! allocated nodes referenced by numeric handles").

use rustc_hash::{FxHashMap, FxHashSet};
use ultrascript_sdk::DataType;

use crate::parser::ast::DeclarationKind;

/// Handle into a [`ScopeTree`]. Children are only ever added under their
/// parent during parsing, so the graph these handles describe is acyclic
/// by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u32);

/// Either a physical ancestor-scope register or a stack slot index
/// (spec §4.3 "register_plan").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    Register(AncestorRegister),
    StackSlot(usize),
}

/// The three-member ancestor-scope register pool (spec §4.3, §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AncestorRegister {
    R12,
    R13,
    R14,
}

impl AncestorRegister {
    pub const POOL: [AncestorRegister; 3] =
        [AncestorRegister::R12, AncestorRegister::R13, AncestorRegister::R14];
}

/// A single declared variable (spec §3 "Variable record").
#[derive(Debug, Clone)]
pub struct VariableDecl {
    pub name: String,
    pub kind: DeclarationKind,
    pub data_type: DataType,
    /// Number of textual uses seen so far; the analyzer's approximation of
    /// "hot" (spec §4.3 pass 2).
    pub access_frequency: u32,
    pub is_escaping: bool,
    pub is_global: bool,
    pub is_static: bool,
}

impl VariableDecl {
    pub fn new(name: impl Into<String>, kind: DeclarationKind, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            kind,
            data_type,
            access_frequency: 0,
            is_escaping: false,
            is_global: false,
            is_static: false,
        }
    }
}

/// A node in the scope tree (spec §3 "LexicalScopeNode").
#[derive(Debug, Clone)]
pub struct LexicalScopeNode {
    pub depth: u32,
    pub is_function_scope: bool,
    pub is_loop_iteration_scoped: bool,
    /// Advisory-turned-mandatory per `SPEC_FULL.md` §9 Open Question 2:
    /// a scope containing only `var` declarations merges into its
    /// enclosing function scope unconditionally.
    pub can_be_optimized_away: bool,

    pub declared_variables: Vec<VariableDecl>,
    pub variable_offsets: FxHashMap<String, u64>,
    pub total_scope_frame_size: u64,

    pub self_parent_needs: FxHashSet<u32>,
    pub descendant_parent_needs: FxHashSet<u32>,
    pub priority_sorted_parent_scopes: Vec<u32>,
    pub register_plan: FxHashMap<u32, FrameSource>,

    pub declared_functions: Vec<String>,

    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
}

impl LexicalScopeNode {
    fn new(depth: u32, is_function_scope: bool, parent: Option<ScopeId>) -> Self {
        Self {
            depth,
            is_function_scope,
            is_loop_iteration_scoped: false,
            can_be_optimized_away: false,
            declared_variables: Vec::new(),
            variable_offsets: FxHashMap::default(),
            total_scope_frame_size: 0,
            self_parent_needs: FxHashSet::default(),
            descendant_parent_needs: FxHashSet::default(),
            priority_sorted_parent_scopes: Vec::new(),
            register_plan: FxHashMap::default(),
            declared_functions: Vec::new(),
            parent,
            children: Vec::new(),
        }
    }

    pub fn find_variable(&self, name: &str) -> Option<&VariableDecl> {
        self.declared_variables.iter().find(|v| v.name == name)
    }

    pub fn find_variable_mut(&mut self, name: &str) -> Option<&mut VariableDecl> {
        self.declared_variables.iter_mut().find(|v| v.name == name)
    }
}

/// Arena owning every [`LexicalScopeNode`] in a compiled program.
#[derive(Debug, Default)]
pub struct ScopeTree {
    nodes: Vec<LexicalScopeNode>,
}

impl ScopeTree {
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Create the program's top-level scope (depth 0, no parent).
    pub fn new_root(&mut self) -> ScopeId {
        let id = ScopeId(self.nodes.len() as u32);
        self.nodes.push(LexicalScopeNode::new(0, true, None));
        id
    }

    /// Create a new child of `parent` one depth deeper.
    pub fn new_child(&mut self, parent: ScopeId, is_function_scope: bool) -> ScopeId {
        let depth = self.get(parent).depth + 1;
        let id = ScopeId(self.nodes.len() as u32);
        self.nodes
            .push(LexicalScopeNode::new(depth, is_function_scope, Some(parent)));
        self.get_mut(parent).children.push(id);
        id
    }

    pub fn get(&self, id: ScopeId) -> &LexicalScopeNode {
        &self.nodes[id.0 as usize]
    }

    pub fn get_mut(&mut self, id: ScopeId) -> &mut LexicalScopeNode {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nearest enclosing scope with `is_function_scope == true`, inclusive
    /// of `from` itself. Used to hoist `var` declarations (spec §4.3).
    pub fn nearest_function_scope(&self, from: ScopeId) -> ScopeId {
        let mut current = from;
        loop {
            if self.get(current).is_function_scope {
                return current;
            }
            match self.get(current).parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    /// Walk from `scope` up to the root, inclusive.
    pub fn ancestors(&self, scope: ScopeId) -> Vec<ScopeId> {
        let mut out = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            out.push(id);
            current = self.get(id).parent;
        }
        out
    }

    /// Find the nearest scope at or above `from` that declares `name`.
    /// Returns `None` for an unresolved identifier (spec §4.3 "Failure
    /// semantics").
    pub fn resolve(&self, from: ScopeId, name: &str) -> Option<ScopeId> {
        let mut current = Some(from);
        while let Some(id) = current {
            if self.get(id).find_variable(name).is_some() {
                return Some(id);
            }
            current = self.get(id).parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_depth_increments() {
        let mut tree = ScopeTree::new();
        let root = tree.new_root();
        let child = tree.new_child(root, false);
        assert_eq!(tree.get(root).depth, 0);
        assert_eq!(tree.get(child).depth, 1);
        assert_eq!(tree.get(child).parent, Some(root));
    }

    #[test]
    fn resolve_walks_to_ancestor() {
        let mut tree = ScopeTree::new();
        let root = tree.new_root();
        tree.get_mut(root)
            .declared_variables
            .push(VariableDecl::new("n", DeclarationKind::Let, DataType::Int32));
        let child = tree.new_child(root, false);
        let grandchild = tree.new_child(child, true);
        assert_eq!(tree.resolve(grandchild, "n"), Some(root));
        assert_eq!(tree.resolve(grandchild, "missing"), None);
    }
}
