//! Scope tree, parse-time tracking and static analysis (spec §3, §4.3).

mod analyzer;
mod tracker;
mod tree;

pub use analyzer::{analyze, AnalyzedScopes};
pub use tracker::ParseTimeScopeTracker;
pub use tree::{AncestorRegister, FrameSource, LexicalScopeNode, ScopeId, ScopeTree, VariableDecl};
