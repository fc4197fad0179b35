use core::borrow::Borrow;

use smallvec::SmallVec;

use super::handle::Handle;
use crate::snapshot::NodeId;

/// Inline capacity of key/child/value vectors; wider orders spill to the heap.
pub(crate) const INLINE_SLOTS: usize = 8;

pub(crate) type Keys<K> = SmallVec<[K; INLINE_SLOTS]>;
pub(crate) type Handles = SmallVec<[Handle; INLINE_SLOTS + 1]>;

/// Envelope shared by both node kinds.
///
/// Ownership flows root to leaf through `children`; `parent`, `prev` and `next` are plain
/// handles used for navigation only.
pub(crate) struct Node<K> {
    id: NodeId,
    parent: Option<Handle>,
    keys: Keys<K>,
    body: Body,
}

pub(crate) enum Body {
    // keys.len() + 1 == children.len() once the node is linked into the tree.
    Internal {
        children: Handles,
    },
    // values[i] is the payload handle of keys[i].
    Leaf {
        values: Handles,
        prev: Option<Handle>,
        next: Option<Handle>,
    },
}

impl<K> Node<K> {
    /// Creates a new empty leaf node.
    pub(crate) fn new_leaf(id: NodeId) -> Self {
        Self {
            id,
            parent: None,
            keys: SmallVec::new(),
            body: Body::Leaf {
                values: SmallVec::new(),
                prev: None,
                next: None,
            },
        }
    }

    /// Creates a root above two freshly split siblings.
    pub(crate) fn new_root(id: NodeId, left: Handle, separator: K, right: Handle) -> Self {
        let mut keys = SmallVec::new();
        keys.push(separator);
        let mut children = SmallVec::new();
        children.push(left);
        children.push(right);
        Self {
            id,
            parent: None,
            keys,
            body: Body::Internal { children },
        }
    }

    pub(crate) fn id(&self) -> NodeId {
        self.id
    }

    pub(crate) fn parent(&self) -> Option<Handle> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<Handle>) {
        self.parent = parent;
    }

    pub(crate) fn is_leaf(&self) -> bool {
        matches!(self.body, Body::Leaf { .. })
    }

    pub(crate) fn body(&self) -> &Body {
        &self.body
    }

    #[inline]
    pub(crate) fn key(&self, index: usize) -> &K {
        &self.keys[index]
    }

    pub(crate) fn keys(&self) -> &[K] {
        &self.keys
    }

    pub(crate) fn key_count(&self) -> usize {
        self.keys.len()
    }

    pub(crate) fn last_key(&self) -> Option<&K> {
        self.keys.last()
    }

    pub(crate) fn into_parts(self) -> (Keys<K>, Body) {
        (self.keys, self.body)
    }

    pub(crate) fn set_key(&mut self, index: usize, key: K) {
        self.keys[index] = key;
    }

    /// Number of keys `<= key`.
    ///
    /// In an internal node this is the child to descend into; in a leaf it is the stable
    /// insertion point after every equal key.
    #[inline]
    pub(crate) fn upper_bound<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() <= key)
    }

    /// Number of keys `< key`.
    #[inline]
    pub(crate) fn lower_bound<Q>(&self, key: &Q) -> usize
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.keys.partition_point(|k| k.borrow() < key)
    }

    /// Index of the first key equal to `key`.
    pub(crate) fn position_of<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        let index = self.lower_bound(key);
        (index < self.keys.len() && self.keys[index].borrow() == key).then_some(index)
    }

    // ── leaf ────────────────────────────────────────────────────────────────

    fn values_mut(&mut self) -> &mut Handles {
        match &mut self.body {
            Body::Leaf { values, .. } => values,
            Body::Internal { .. } => panic!("expected leaf node"),
        }
    }

    pub(crate) fn values(&self) -> &[Handle] {
        match &self.body {
            Body::Leaf { values, .. } => values,
            Body::Internal { .. } => panic!("expected leaf node"),
        }
    }

    #[inline]
    pub(crate) fn value(&self, index: usize) -> Handle {
        self.values()[index]
    }

    pub(crate) fn prev(&self) -> Option<Handle> {
        match self.body {
            Body::Leaf { prev, .. } => prev,
            Body::Internal { .. } => panic!("expected leaf node"),
        }
    }

    pub(crate) fn next(&self) -> Option<Handle> {
        match self.body {
            Body::Leaf { next, .. } => next,
            Body::Internal { .. } => panic!("expected leaf node"),
        }
    }

    pub(crate) fn set_prev(&mut self, handle: Option<Handle>) {
        match &mut self.body {
            Body::Leaf { prev, .. } => *prev = handle,
            Body::Internal { .. } => panic!("expected leaf node"),
        }
    }

    pub(crate) fn set_next(&mut self, handle: Option<Handle>) {
        match &mut self.body {
            Body::Leaf { next, .. } => *next = handle,
            Body::Internal { .. } => panic!("expected leaf node"),
        }
    }

    pub(crate) fn insert_entry(&mut self, index: usize, key: K, value: Handle) {
        self.keys.insert(index, key);
        self.values_mut().insert(index, value);
    }

    pub(crate) fn remove_entry(&mut self, index: usize) -> (K, Handle) {
        let key = self.keys.remove(index);
        let value = self.values_mut().remove(index);
        (key, value)
    }

    pub(crate) fn push_entry(&mut self, key: K, value: Handle) {
        self.keys.push(key);
        self.values_mut().push(value);
    }

    pub(crate) fn push_entry_front(&mut self, key: K, value: Handle) {
        self.insert_entry(0, key, value);
    }

    pub(crate) fn pop_entry(&mut self) -> (K, Handle) {
        let key = self.keys.pop().expect("`Node::pop_entry()` - leaf is empty!");
        let value = self.values_mut().pop().expect("`Node::pop_entry()` - leaf is empty!");
        (key, value)
    }

    pub(crate) fn pop_entry_front(&mut self) -> (K, Handle) {
        assert!(!self.keys.is_empty(), "`Node::pop_entry_front()` - leaf is empty!");
        self.remove_entry(0)
    }

    /// Moves entries `[len / 2, len)` into a new leaf and returns it.
    ///
    /// The new leaf shares this leaf's parent and inherits its `next` link; the caller wires
    /// the `prev`/`next` links that involve the new leaf's handle.
    pub(crate) fn split_leaf(&mut self, id: NodeId) -> Node<K> {
        let mid = self.keys.len() / 2;
        let keys: Keys<K> = self.keys.drain(mid..).collect();
        let Body::Leaf { values, next, .. } = &mut self.body else {
            panic!("expected leaf node");
        };
        let right_values: Handles = values.drain(mid..).collect();

        Node {
            id,
            parent: self.parent,
            keys,
            body: Body::Leaf {
                values: right_values,
                prev: None,
                next: *next,
            },
        }
    }

    /// Appends the entries of the leaf that follows this one and takes over its `next` link.
    pub(crate) fn absorb_leaf_back(&mut self, right: Node<K>) {
        let (keys, body) = right.into_parts();
        let Body::Leaf { values, next, .. } = body else {
            panic!("expected leaf node");
        };
        self.keys.extend(keys);
        self.values_mut().extend(values);
        self.set_next(next);
    }

    /// Prepends the entries of the leaf that precedes this one and takes over its `prev` link.
    pub(crate) fn absorb_leaf_front(&mut self, left: Node<K>) {
        let (mut keys, body) = left.into_parts();
        let Body::Leaf { mut values, prev, .. } = body else {
            panic!("expected leaf node");
        };
        keys.extend(self.keys.drain(..));
        values.extend(self.values_mut().drain(..));
        self.keys = keys;
        *self.values_mut() = values;
        self.set_prev(prev);
    }

    // ── internal ────────────────────────────────────────────────────────────

    fn children_mut(&mut self) -> &mut Handles {
        match &mut self.body {
            Body::Internal { children } => children,
            Body::Leaf { .. } => panic!("expected internal node"),
        }
    }

    pub(crate) fn children(&self) -> &[Handle] {
        match &self.body {
            Body::Internal { children } => children,
            Body::Leaf { .. } => panic!("expected internal node"),
        }
    }

    #[inline]
    pub(crate) fn child(&self, index: usize) -> Handle {
        self.children()[index]
    }

    pub(crate) fn child_count(&self) -> usize {
        self.children().len()
    }

    /// Position of `child` in this node's child list.
    pub(crate) fn index_of_child(&self, child: Handle) -> usize {
        self.children()
            .iter()
            .position(|&h| h == child)
            .expect("`Node::index_of_child()` - child is not linked to its parent!")
    }

    /// Links `child` right after `children[index]`, separated from it by `key`.
    pub(crate) fn insert_child_after(&mut self, index: usize, key: K, child: Handle) {
        self.keys.insert(index, key);
        self.children_mut().insert(index + 1, child);
    }

    /// Unlinks `children[index]` together with the separator on its left (or on its right
    /// for the first child) and returns that separator.
    pub(crate) fn remove_child(&mut self, index: usize) -> K {
        self.children_mut().remove(index);
        self.keys.remove(index.saturating_sub(1))
    }

    pub(crate) fn push_child(&mut self, key: K, child: Handle) {
        self.keys.push(key);
        self.children_mut().push(child);
    }

    pub(crate) fn push_child_front(&mut self, key: K, child: Handle) {
        self.keys.insert(0, key);
        self.children_mut().insert(0, child);
    }

    /// Removes the last child and the separator before it.
    pub(crate) fn pop_child(&mut self) -> (K, Handle) {
        let key = self.keys.pop().expect("`Node::pop_child()` - node has no separator!");
        let child = self.children_mut().pop().expect("`Node::pop_child()` - node has no child!");
        (key, child)
    }

    /// Removes the first child and the separator after it.
    pub(crate) fn pop_child_front(&mut self) -> (K, Handle) {
        assert!(!self.keys.is_empty(), "`Node::pop_child_front()` - node has no separator!");
        let key = self.keys.remove(0);
        let child = self.children_mut().remove(0);
        (key, child)
    }

    /// Splits an overflowing internal node.
    ///
    /// With `c` children, this node keeps the first `ceil(c / 2)`, the returned node takes
    /// the rest, and the key that separated the two halves is returned for promotion.
    ///
    /// # Panics
    ///
    /// If no separator is left to promote; only possible when called on a node that is not
    /// overflowing.
    pub(crate) fn split_internal(&mut self, id: NodeId) -> (K, Node<K>) {
        let count = self.child_count();
        let mid = count.div_ceil(2);
        assert!(
            mid >= 1 && self.keys.len() >= mid && self.keys.len() + 1 == count,
            "`Node::split_internal()` - split of a node with {count} children leaves no separator to promote!"
        );

        let children: Handles = self.children_mut().drain(mid..).collect();
        let keys: Keys<K> = self.keys.drain(mid..).collect();
        let promoted = self.keys.pop().expect("`Node::split_internal()` - separator vanished!");

        let right = Node {
            id,
            parent: self.parent,
            keys,
            body: Body::Internal { children },
        };
        (promoted, right)
    }

    /// Appends `separator` and then the keys and children of the right neighbour.
    pub(crate) fn absorb_internal_back(&mut self, separator: K, right: Node<K>) {
        let (keys, body) = right.into_parts();
        let Body::Internal { children } = body else {
            panic!("expected internal node");
        };
        self.keys.push(separator);
        self.keys.extend(keys);
        self.children_mut().extend(children);
    }

    /// Prepends the keys and children of the left neighbour followed by `separator`.
    pub(crate) fn absorb_internal_front(&mut self, left: Node<K>, separator: K) {
        let (mut keys, body) = left.into_parts();
        let Body::Internal { mut children } = body else {
            panic!("expected internal node");
        };
        keys.push(separator);
        keys.extend(self.keys.drain(..));
        children.extend(self.children_mut().drain(..));
        self.keys = keys;
        *self.children_mut() = children;
    }
}
