use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use core::borrow::Borrow;
use core::ops::Bound;

use super::arena::Arena;
use super::handle::Handle;
use super::node::{Body, Node};
use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::event::{Event, EventLog};
use crate::payload::Payload;
use crate::snapshot::{Levels, NodeId, NodeKind, NodeSnapshot};

/// The engine behind `BPlusTree`.
///
/// There is always a root; the empty tree is a single empty leaf. Mutations live in
/// `insert.rs` and `remove.rs`.
pub(crate) struct RawBPlusTree<K, V> {
    /// Arena owning every node.
    pub(super) nodes: Arena<Node<K>>,
    /// Arena owning every payload; leaves refer to these by handle.
    pub(super) values: Arena<Payload<V>>,
    pub(super) root: Handle,
    /// Head of the leaf chain, for ascending scans.
    pub(super) first_leaf: Handle,
    /// Tail of the leaf chain, for descending scans.
    pub(super) last_leaf: Handle,
    /// Number of entries across all leaves.
    pub(super) len: usize,
    pub(super) config: TreeConfig,
    pub(super) next_id: u64,
    pub(super) log: EventLog<K>,
}

/// Position of one entry in the leaf chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct Cursor {
    pub(crate) leaf: Handle,
    pub(crate) index: usize,
}

impl<K, V> RawBPlusTree<K, V> {
    /// Creates an empty tree: one empty leaf as root.
    pub(crate) fn new(config: TreeConfig) -> Result<Self> {
        config.validate()?;
        let mut nodes = Arena::new();
        let root = nodes.alloc(Node::new_leaf(NodeId::new(1)));
        Ok(Self {
            nodes,
            values: Arena::new(),
            root,
            first_leaf: root,
            last_leaf: root,
            len: 0,
            config,
            next_id: 2,
            log: EventLog::new(),
        })
    }

    pub(crate) const fn len(&self) -> usize {
        self.len
    }

    pub(crate) const fn config(&self) -> &TreeConfig {
        &self.config
    }

    pub(crate) fn last_events(&self) -> &[Event<K>] {
        self.log.as_slice()
    }

    pub(crate) fn events_snapshot(&self) -> Vec<Event<K>>
    where
        K: Clone,
    {
        self.log.snapshot()
    }

    /// Hands out the next never-used node id.
    pub(super) fn allocate_id(&mut self) -> NodeId {
        let id = NodeId::new(self.next_id);
        self.next_id += 1;
        id
    }

    pub(super) fn id_of(&self, handle: Handle) -> NodeId {
        self.nodes.get(handle).id()
    }

    /// Drops every entry and node. Node ids keep counting from where they were.
    pub(crate) fn clear(&mut self) {
        self.nodes.clear();
        self.values.clear();
        self.log.clear();
        let id = self.allocate_id();
        self.root = self.nodes.alloc(Node::new_leaf(id));
        self.first_leaf = self.root;
        self.last_leaf = self.root;
        self.len = 0;
    }

    /// Number of levels; 1 for a tree that is a single leaf.
    pub(crate) fn height(&self) -> usize {
        let mut height = 1;
        let mut current = self.root;
        while let Body::Internal { children } = self.nodes.get(current).body() {
            current = children[0];
            height += 1;
        }
        height
    }

    /// Key and payload at `cursor`.
    pub(crate) fn entry(&self, cursor: Cursor) -> (&K, &Payload<V>) {
        let leaf = self.nodes.get(cursor.leaf);
        (leaf.key(cursor.index), self.values.get(leaf.value(cursor.index)))
    }

    pub(crate) fn first_cursor(&self) -> Option<Cursor> {
        (self.len > 0).then_some(Cursor {
            leaf: self.first_leaf,
            index: 0,
        })
    }

    pub(crate) fn last_cursor(&self) -> Option<Cursor> {
        let count = self.nodes.get(self.last_leaf).key_count();
        count.checked_sub(1).map(|index| Cursor {
            leaf: self.last_leaf,
            index,
        })
    }

    /// Next entry along the leaf chain.
    pub(crate) fn step_forward(&self, cursor: Cursor) -> Option<Cursor> {
        let leaf = self.nodes.get(cursor.leaf);
        if cursor.index + 1 < leaf.key_count() {
            return Some(Cursor {
                index: cursor.index + 1,
                ..cursor
            });
        }
        let mut next = leaf.next();
        while let Some(handle) = next {
            let node = self.nodes.get(handle);
            if node.key_count() > 0 {
                return Some(Cursor { leaf: handle, index: 0 });
            }
            next = node.next();
        }
        None
    }

    /// Previous entry along the leaf chain.
    pub(crate) fn step_back(&self, cursor: Cursor) -> Option<Cursor> {
        if cursor.index > 0 {
            return Some(Cursor {
                index: cursor.index - 1,
                ..cursor
            });
        }
        let mut prev = self.nodes.get(cursor.leaf).prev();
        while let Some(handle) = prev {
            let node = self.nodes.get(handle);
            if node.key_count() > 0 {
                return Some(Cursor {
                    leaf: handle,
                    index: node.key_count() - 1,
                });
            }
            prev = node.prev();
        }
        None
    }

    /// Snapshot of every level, root first.
    pub(crate) fn traverse(&self) -> Levels<K>
    where
        K: Clone,
    {
        let mut levels = Vec::new();
        let mut level = alloc::vec![self.root];

        while !level.is_empty() {
            let mut below = Vec::new();
            let mut snapshots = Vec::with_capacity(level.len());
            for &handle in &level {
                if let Body::Internal { children } = self.nodes.get(handle).body() {
                    below.extend_from_slice(children);
                }
                snapshots.push(self.snapshot(handle));
            }
            levels.push(snapshots);
            level = below;
        }

        levels
    }

    fn snapshot(&self, handle: Handle) -> NodeSnapshot<K>
    where
        K: Clone,
    {
        let node = self.nodes.get(handle);
        let kind = match node.body() {
            Body::Internal { children } => NodeKind::Internal {
                children: children.iter().map(|&child| self.id_of(child)).collect(),
            },
            Body::Leaf { prev, next, .. } => NodeKind::Leaf {
                prev: prev.map(|h| self.id_of(h)),
                next: next.map(|h| self.id_of(h)),
            },
        };
        NodeSnapshot {
            id: node.id(),
            parent: node.parent().map(|h| self.id_of(h)),
            keys: node.keys().to_vec(),
            kind,
        }
    }
}

impl<K: Ord, V> RawBPlusTree<K, V> {
    /// Descends to the leaf that would hold `key`.
    ///
    /// Every level picks the child whose index is the number of separators `<= key`. Search,
    /// insertion and deletion all route through here so they agree on where a key lives.
    pub(crate) fn find_leaf<Q>(&self, key: &Q) -> Handle
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut current = self.root;
        loop {
            let node = self.nodes.get(current);
            if node.is_leaf() {
                return current;
            }
            current = node.child(node.upper_bound(key));
        }
    }

    /// Walks back from `leaf` while the previous leaf still ends at or above `key`.
    ///
    /// Duplicates that straddle a split, and separators left stale by deletions, can leave
    /// equal keys in leaves to the left of the one `find_leaf` picks.
    fn rewind<Q>(&self, mut leaf: Handle, key: &Q) -> Handle
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        while let Some(prev) = self.nodes.get(leaf).prev() {
            match self.nodes.get(prev).last_key() {
                Some(last) if last.borrow() >= key => leaf = prev,
                _ => break,
            }
        }
        leaf
    }

    /// First entry `>= key` in chain order.
    pub(crate) fn seek_ge<Q>(&self, key: &Q) -> Option<Cursor>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut leaf = self.rewind(self.find_leaf(key), key);
        loop {
            let node = self.nodes.get(leaf);
            let index = node.lower_bound(key);
            if index < node.key_count() {
                return Some(Cursor { leaf, index });
            }
            leaf = node.next()?;
        }
    }

    /// First entry `> key` in chain order.
    pub(crate) fn seek_gt<Q>(&self, key: &Q) -> Option<Cursor>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut leaf = self.find_leaf(key);
        loop {
            let node = self.nodes.get(leaf);
            let index = node.upper_bound(key);
            if index < node.key_count() {
                return Some(Cursor { leaf, index });
            }
            leaf = node.next()?;
        }
    }

    /// Last entry `<= key` (or `< key` when `inclusive` is false) in chain order.
    pub(crate) fn seek_back<Q>(&self, key: &Q, inclusive: bool) -> Option<Cursor>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut leaf = self.find_leaf(key);
        loop {
            let node = self.nodes.get(leaf);
            let count = if inclusive {
                node.upper_bound(key)
            } else {
                node.lower_bound(key)
            };
            if count > 0 {
                return Some(Cursor {
                    leaf,
                    index: count - 1,
                });
            }
            leaf = node.prev()?;
        }
    }

    /// Cursor of the first entry that satisfies `bound` from below.
    pub(crate) fn seek_front<Q>(&self, bound: Bound<&Q>) -> Option<Cursor>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match bound {
            Bound::Unbounded => self.first_cursor(),
            Bound::Included(key) => self.seek_ge(key),
            Bound::Excluded(key) => self.seek_gt(key),
        }
    }

    /// Cursor of the last entry that satisfies `bound` from above.
    pub(crate) fn seek_rear<Q>(&self, bound: Bound<&Q>) -> Option<Cursor>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        match bound {
            Bound::Unbounded => self.last_cursor(),
            Bound::Included(key) => self.seek_back(key, true),
            Bound::Excluded(key) => self.seek_back(key, false),
        }
    }

    /// First entry equal to `key`.
    pub(crate) fn locate<Q>(&self, key: &Q) -> Option<Cursor>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let cursor = self.seek_ge(key)?;
        (self.entry(cursor).0.borrow() == key).then_some(cursor)
    }

    pub(crate) fn get<Q>(&self, key: &Q) -> Option<&Payload<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.locate(key).map(|cursor| self.entry(cursor).1)
    }

    /// Every payload stored under `key`, oldest first.
    ///
    /// Equal keys are contiguous in the leaf chain, so the scan stops at the first larger key.
    pub(crate) fn get_all<Q>(&self, key: &Q) -> Vec<&Payload<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let mut found = Vec::new();
        let mut cursor = self.locate(key);
        while let Some(at) = cursor {
            let (k, payload) = self.entry(at);
            if k.borrow() != key {
                break;
            }
            found.push(payload);
            cursor = self.step_forward(at);
        }
        found
    }

    /// Verifies every structural invariant and reports all violations at once.
    pub(crate) fn check_invariants(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        let mut leaves: Vec<Handle> = Vec::new();
        let mut leaf_depth: Option<usize> = None;
        let mut visited = 0usize;

        let mut checker = Checker {
            tree: self,
            errors: &mut errors,
            leaves: &mut leaves,
            leaf_depth: &mut leaf_depth,
            visited: &mut visited,
        };
        checker.check_node(self.root, None, 0, None, None);
        self.check_leaf_chain(&leaves, &mut errors);

        let counted: usize = leaves.iter().map(|&h| self.nodes.get(h).key_count()).sum();
        if counted != self.len {
            errors.push(format!("len mismatch: len={}, entries in leaves={counted}", self.len));
        }
        if self.values.len() != self.len {
            errors.push(format!("payload leak: {} payloads for {} entries", self.values.len(), self.len));
        }
        if self.nodes.len() != visited {
            errors.push(format!("node leak: {} allocated, {visited} reachable", self.nodes.len()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Invariant(errors.join("\n")))
        }
    }

    fn check_leaf_chain(&self, leaves: &[Handle], errors: &mut Vec<String>) {
        if leaves.first() != Some(&self.first_leaf) {
            errors.push(format!("first_leaf {} is not the leftmost leaf", self.id_of(self.first_leaf)));
        }
        if leaves.last() != Some(&self.last_leaf) {
            errors.push(format!("last_leaf {} is not the rightmost leaf", self.id_of(self.last_leaf)));
        }

        let mut previous_key: Option<&K> = None;
        for (i, &handle) in leaves.iter().enumerate() {
            let leaf = self.nodes.get(handle);
            let expected_prev = i.checked_sub(1).map(|j| leaves[j]);
            let expected_next = leaves.get(i + 1).copied();
            if leaf.prev() != expected_prev {
                errors.push(format!("leaf {} has a broken prev link", leaf.id()));
            }
            if leaf.next() != expected_next {
                errors.push(format!("leaf {} has a broken next link", leaf.id()));
            }

            for key in leaf.keys() {
                if let Some(previous) = previous_key {
                    let out_of_order = if self.config.is_unique() {
                        previous >= key
                    } else {
                        previous > key
                    };
                    if out_of_order {
                        errors.push(format!("leaf chain out of order at leaf {}", leaf.id()));
                    }
                }
                previous_key = Some(key);
            }
        }
    }
}

/// Recursive state of `check_invariants`.
struct Checker<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    errors: &'a mut Vec<String>,
    leaves: &'a mut Vec<Handle>,
    leaf_depth: &'a mut Option<usize>,
    visited: &'a mut usize,
}

impl<K: Ord, V> Checker<'_, K, V> {
    fn check_node(&mut self, handle: Handle, parent: Option<Handle>, depth: usize, lower: Option<&K>, upper: Option<&K>) {
        let tree = self.tree;
        let config = tree.config;
        let node = tree.nodes.get(handle);
        let id = node.id();
        let is_root = parent.is_none();
        *self.visited += 1;

        if node.parent() != parent {
            self.errors.push(format!("node {id} has a stale parent link"));
        }

        for pair in node.keys().windows(2) {
            if pair[0] > pair[1] {
                self.errors.push(format!("node {id} keys are not sorted"));
            }
        }

        match node.body() {
            Body::Leaf { values, .. } => {
                match *self.leaf_depth {
                    None => *self.leaf_depth = Some(depth),
                    Some(expected) if expected != depth => {
                        self.errors.push(format!("leaf {id} at depth {depth}, expected {expected}"));
                    }
                    Some(_) => {}
                }

                let count = node.key_count();
                if values.len() != count {
                    self.errors.push(format!("leaf {id} has {count} keys but {} payloads", values.len()));
                }
                if count > config.order_leaf() || (!is_root && count < config.min_leaf_keys()) {
                    self.errors.push(format!("leaf {id} holds {count} entries"));
                }

                for key in node.keys() {
                    let below = lower.is_some_and(|bound| key < bound);
                    let above = upper.is_some_and(|bound| {
                        if config.is_unique() { key >= bound } else { key > bound }
                    });
                    if below || above {
                        self.errors.push(format!("leaf {id} holds a key outside its separators"));
                    }
                }

                self.leaves.push(handle);
            }
            Body::Internal { children } => {
                let count = children.len();
                if node.key_count() + 1 != count {
                    self.errors.push(format!("internal {id} has {} keys for {count} children", node.key_count()));
                    return;
                }
                let min = if is_root { 2 } else { config.min_internal_children() };
                if count > config.order_internal() || count < min {
                    self.errors.push(format!("internal {id} holds {count} children"));
                }

                for key in node.keys() {
                    if lower.is_some_and(|bound| key < bound) || upper.is_some_and(|bound| key > bound) {
                        self.errors.push(format!("internal {id} holds a separator outside its range"));
                    }
                }

                for (i, &child) in children.iter().enumerate() {
                    let child_lower = if i == 0 { lower } else { Some(node.key(i - 1)) };
                    let child_upper = if i + 1 == count { upper } else { Some(node.key(i)) };
                    self.check_node(child, Some(handle), depth + 1, child_lower, child_upper);
                }
            }
        }
    }
}
