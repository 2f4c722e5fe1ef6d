//! Abstract Syntax Tree (AST) for the C11 front-end.
//!
//! The AST is a flattened arena: every node lives in [`Ast::kinds`] and children are
//! referenced through [`NodeRef`] indices. Semantic results are kept in side tables
//! indexed the same way (see `semantic::SemanticInfo`), so the tree itself stays
//! immutable after parsing.

use std::num::NonZeroU32;

use crate::source::SourceLocation;

pub mod nodes;

pub use nodes::*;

/// The flattened AST storage.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    pub kinds: Vec<NodeKind>,
    pub locations: Vec<SourceLocation>,
    root: Option<NodeRef>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    /// Add a node to the AST and return its reference
    pub(crate) fn push_node(&mut self, kind: NodeKind, location: SourceLocation) -> NodeRef {
        let node = NodeRef::from_index(self.kinds.len());
        self.kinds.push(kind);
        self.locations.push(location);
        node
    }

    pub fn get_kind(&self, node_ref: NodeRef) -> &NodeKind {
        &self.kinds[node_ref.index()]
    }

    pub fn get_location(&self, node_ref: NodeRef) -> SourceLocation {
        self.locations[node_ref.index()]
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub(crate) fn set_root(&mut self, root: NodeRef) {
        self.root = Some(root);
    }

    /// The translation unit node, once parsing has finished.
    pub fn root(&self) -> Option<NodeRef> {
        self.root
    }
}

/// Node reference type for referencing child nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeRef(NonZeroU32);

impl NodeRef {
    pub fn new(value: u32) -> Option<Self> {
        NonZeroU32::new(value).map(Self)
    }

    fn from_index(index: usize) -> Self {
        NodeRef(NonZeroU32::MIN.saturating_add(index as u32))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    pub fn index(self) -> usize {
        (self.get() - 1) as usize
    }
}
