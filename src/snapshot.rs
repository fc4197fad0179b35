//! Read-only views of tree nodes for rendering and replay.

use alloc::vec::Vec;
use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Stable identity of a node.
///
/// Assigned once when a split (or tree construction) creates the node and never reused, even
/// after the node is destroyed by a merge or a root collapse.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Kind-specific part of a [`NodeSnapshot`].
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NodeKind {
    Internal {
        children: Vec<NodeId>,
    },
    Leaf {
        prev: Option<NodeId>,
        next: Option<NodeId>,
    },
}

/// One node as seen by [`BPlusTree::traverse`](crate::BPlusTree::traverse).
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeSnapshot<K> {
    pub id: NodeId,
    pub parent: Option<NodeId>,
    pub keys: Vec<K>,
    pub kind: NodeKind,
}

impl<K> NodeSnapshot<K> {
    #[must_use]
    pub const fn is_leaf(&self) -> bool {
        matches!(self.kind, NodeKind::Leaf { .. })
    }

    /// Child ids of an internal node; empty for a leaf.
    #[must_use]
    pub fn children(&self) -> &[NodeId] {
        match &self.kind {
            NodeKind::Internal { children } => children,
            NodeKind::Leaf { .. } => &[],
        }
    }

    /// Next leaf in key order; `None` for internal nodes and the last leaf.
    #[must_use]
    pub const fn next_leaf(&self) -> Option<NodeId> {
        match self.kind {
            NodeKind::Leaf { next, .. } => next,
            NodeKind::Internal { .. } => None,
        }
    }
}

/// Root first, then each level left to right.
pub type Levels<K> = Vec<Vec<NodeSnapshot<K>>>;
