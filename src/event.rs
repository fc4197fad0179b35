//! Structural-change records produced by `insert` and `delete`.
//!
//! Every top-level mutation starts a fresh log and appends one [`Event`] per structural step,
//! in the order the steps happen. A visualizer can replay the list to animate the operation;
//! the tree itself never reads it back.
//!
//! ```text
//! insert 30 into  [10 20]           (order_leaf = 2)
//!
//!   InsertLeaf   #1 [10 20] -> [10 20 30]
//!   SplitLeaf    #1 [10] | #2 [20 30], promote 20
//!   NewRoot      #1 -> #3 [20]
//! ```

use alloc::vec::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::snapshot::NodeId;

/// Discriminant of an [`Event`].
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum EventKind {
    InsertLeaf,
    SplitLeaf,
    SplitInternal,
    BorrowLeft,
    BorrowRight,
    Merge,
    DeleteLeaf,
    NotFound,
    NewRoot,
}

/// One structural step of a mutation, with the key snapshots needed to replay it.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Event<K> {
    /// An entry was placed at `index` of `leaf`.
    InsertLeaf {
        leaf: NodeId,
        key: K,
        index: usize,
        before: Vec<K>,
        after: Vec<K>,
    },
    /// An overflowing leaf kept its lower half and moved the rest to the new `right` leaf.
    /// `promoted` is the first key of `right`.
    SplitLeaf {
        left: NodeId,
        right: NodeId,
        promoted: K,
        before: Vec<K>,
        left_keys: Vec<K>,
        right_keys: Vec<K>,
    },
    /// An overflowing internal node was split; `promoted` left both halves and moved up.
    SplitInternal {
        left: NodeId,
        right: NodeId,
        promoted: K,
        before: Vec<K>,
        left_keys: Vec<K>,
        right_keys: Vec<K>,
    },
    /// `node` took one entry (or child) from its left `sibling`; `separator` is the new
    /// routing key between them in `parent`.
    BorrowLeft {
        node: NodeId,
        sibling: NodeId,
        parent: NodeId,
        separator: K,
        node_keys: Vec<K>,
        sibling_keys: Vec<K>,
    },
    /// `node` took one entry (or child) from its right `sibling`.
    BorrowRight {
        node: NodeId,
        sibling: NodeId,
        parent: NodeId,
        separator: K,
        node_keys: Vec<K>,
        sibling_keys: Vec<K>,
    },
    /// `absorbed` was folded into `survivor` and destroyed; `separator` was removed from
    /// `parent`.
    Merge {
        survivor: NodeId,
        absorbed: NodeId,
        parent: NodeId,
        separator: K,
        keys: Vec<K>,
    },
    /// The entry at `index` of `leaf` was removed.
    DeleteLeaf {
        leaf: NodeId,
        key: K,
        index: usize,
        before: Vec<K>,
        after: Vec<K>,
    },
    /// `delete` found no entry for `key`; the tree is unchanged.
    NotFound { key: K },
    /// The root changed: grown above a split `old_root`, or collapsed onto its only child.
    NewRoot {
        old_root: NodeId,
        new_root: NodeId,
        keys: Vec<K>,
    },
}

impl<K> Event<K> {
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Event::InsertLeaf { .. } => EventKind::InsertLeaf,
            Event::SplitLeaf { .. } => EventKind::SplitLeaf,
            Event::SplitInternal { .. } => EventKind::SplitInternal,
            Event::BorrowLeft { .. } => EventKind::BorrowLeft,
            Event::BorrowRight { .. } => EventKind::BorrowRight,
            Event::Merge { .. } => EventKind::Merge,
            Event::DeleteLeaf { .. } => EventKind::DeleteLeaf,
            Event::NotFound { .. } => EventKind::NotFound,
            Event::NewRoot { .. } => EventKind::NewRoot,
        }
    }
}

/// Append-only record of the current top-level operation.
pub(crate) struct EventLog<K> {
    events: Vec<Event<K>>,
}

impl<K> EventLog<K> {
    pub(crate) const fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub(crate) fn clear(&mut self) {
        self.events.clear();
    }

    pub(crate) fn push(&mut self, event: Event<K>) {
        self.events.push(event);
    }

    pub(crate) fn as_slice(&self) -> &[Event<K>] {
        &self.events
    }

    pub(crate) fn snapshot(&self) -> Vec<Event<K>>
    where
        K: Clone,
    {
        self.events.clone()
    }
}

/// Kinds of a slice of events, in order. Handy for asserting on a replay.
#[must_use]
pub fn kinds<K>(events: &[Event<K>]) -> Vec<EventKind> {
    events.iter().map(Event::kind).collect()
}
