//! The public B+ tree.

use alloc::borrow::ToOwned;
use alloc::vec::Vec;
use core::borrow::Borrow;
use core::fmt;
use core::iter::FusedIterator;
use core::ops::{Bound, RangeBounds};

use crate::config::TreeConfig;
use crate::error::Result;
use crate::event::Event;
use crate::payload::Payload;
use crate::raw::{Cursor, RawBPlusTree};
use crate::snapshot::{Levels, NodeKind};

/// Validates that the start bound does not exceed the end bound.
///
/// # Panics
///
/// Panics if `start > end` or if `start == end` and both bounds are `Excluded`.
fn validate_range_bounds<T, R>(range: &R)
where
    T: ?Sized + Ord,
    R: RangeBounds<T>,
{
    if let (Bound::Included(start) | Bound::Excluded(start), Bound::Included(end) | Bound::Excluded(end)) =
        (range.start_bound(), range.end_bound())
    {
        let valid =
            if matches!(range.start_bound(), Bound::Excluded(_)) && matches!(range.end_bound(), Bound::Excluded(_)) {
                start < end
            } else {
                start <= end
            };
        assert!(valid, "range start is greater than range end in BPlusTree");
    }
}

/// An in-memory B+ tree index with configurable node orders.
///
/// All entries live in the leaves, which form a doubly linked chain in key order. Internal
/// nodes hold only separator keys used for routing. Each leaf entry carries a [`Payload`]
/// whose kind is fixed by the tree's [`ValueMode`](crate::ValueMode).
///
/// Every [`insert`](Self::insert) and [`delete`](Self::delete) returns the structural
/// [`Event`]s it caused (splits, borrows, merges, root changes), so a front end can replay the
/// operation step by step. [`traverse`](Self::traverse) returns a read-only snapshot of every
/// level for rendering.
///
/// In unique mode an existing key is rejected with [`Error::DuplicateKey`]. In non-unique mode
/// equal keys are kept in insertion order, and lookups return every match.
///
/// # Examples
///
/// ```
/// use bplus_index::{BPlusTree, EventKind, Payload, TreeConfig, ValueMode};
/// use bplus_index::event::kinds;
///
/// let config = TreeConfig::new(3, 2).with_value_mode(ValueMode::Record);
/// let mut tree = BPlusTree::new(config)?;
///
/// tree.insert(10, Payload::Record("ten"))?;
/// tree.insert(20, Payload::Record("twenty"))?;
/// let events = tree.insert(30, Payload::Record("thirty"))?;
/// assert_eq!(kinds(&events), [EventKind::InsertLeaf, EventKind::SplitLeaf, EventKind::NewRoot]);
///
/// assert_eq!(tree.get(&20), Some(&Payload::Record("twenty")));
/// assert_eq!(tree.height(), 2);
/// # Ok::<(), bplus_index::Error>(())
/// ```
///
/// [`Error::DuplicateKey`]: crate::Error::DuplicateKey
pub struct BPlusTree<K, V = ()> {
    raw: RawBPlusTree<K, V>,
}

/// Result of [`BPlusTree::search`].
///
/// The variant follows the tree's mode: a unique tree answers with at most one payload, a
/// non-unique tree with every payload stored under the key, oldest first.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Lookup<'a, V> {
    Unique(Option<&'a Payload<V>>),
    Multi(Vec<&'a Payload<V>>),
}

impl<'a, V> Lookup<'a, V> {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Lookup::Unique(found) => found.is_none(),
            Lookup::Multi(found) => found.is_empty(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Lookup::Unique(found) => usize::from(found.is_some()),
            Lookup::Multi(found) => found.len(),
        }
    }

    /// The oldest match, if any.
    #[must_use]
    pub fn first(&self) -> Option<&'a Payload<V>> {
        match self {
            Lookup::Unique(found) => *found,
            Lookup::Multi(found) => found.first().copied(),
        }
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<&'a Payload<V>> {
        match self {
            Lookup::Unique(found) => found.into_iter().collect(),
            Lookup::Multi(found) => found,
        }
    }
}

/// An iterator over the entries of a `BPlusTree`, in key order.
///
/// This `struct` is created by the [`iter`] method on [`BPlusTree`].
///
/// # Examples
///
/// ```
/// use bplus_index::{BPlusTree, Payload};
///
/// let mut tree = BPlusTree::<i32>::default();
/// for key in [2, 1, 3] {
///     tree.insert_key(key)?;
/// }
/// let mut iter = tree.iter();
/// assert_eq!(iter.next(), Some((&1, &Payload::Empty)));
/// assert_eq!(iter.next_back(), Some((&3, &Payload::Empty)));
/// assert_eq!(iter.len(), 1);
/// # Ok::<(), bplus_index::Error>(())
/// ```
///
/// [`iter`]: BPlusTree::iter
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Iter<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    front: Option<Cursor>,
    back: Option<Cursor>,
    remaining: usize,
}

/// An iterator over a sub-range of entries in a `BPlusTree`.
///
/// This `struct` is created by the [`range`] method on [`BPlusTree`].
///
/// [`range`]: BPlusTree::range
#[must_use = "iterators are lazy and do nothing unless consumed"]
pub struct Range<'a, K, V> {
    tree: &'a RawBPlusTree<K, V>,
    front: Option<Cursor>,
    back: Option<Cursor>,
    /// Set once front and back have met.
    finished: bool,
}

impl<K, V> BPlusTree<K, V> {
    /// Creates an empty tree.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidOrder`](crate::Error::InvalidOrder) when `order_internal < 3` or
    /// `order_leaf < 1`.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Error, TreeConfig};
    ///
    /// assert!(BPlusTree::<u32>::new(TreeConfig::new(4, 3)).is_ok());
    /// assert!(matches!(BPlusTree::<u32>::new(TreeConfig::new(2, 3)), Err(Error::InvalidOrder { .. })));
    /// ```
    pub fn new(config: TreeConfig) -> Result<Self> {
        Ok(Self {
            raw: RawBPlusTree::new(config)?,
        })
    }

    /// Shorthand for a unique, key-only tree with the given orders.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_orders(order_internal: usize, order_leaf: usize) -> Result<Self> {
        Self::new(TreeConfig::new(order_internal, order_leaf))
    }

    #[must_use]
    pub fn config(&self) -> &TreeConfig {
        self.raw.config()
    }

    /// Number of entries, counting every duplicate.
    #[must_use]
    pub fn len(&self) -> usize {
        self.raw.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.raw.len() == 0
    }

    /// Number of levels from the root down to the leaves; an empty tree has height 1.
    #[must_use]
    pub fn height(&self) -> usize {
        self.raw.height()
    }

    /// Removes every entry. The configuration is kept; the log is emptied.
    pub fn clear(&mut self) {
        self.raw.clear();
    }

    /// Events of the most recent `insert` or `delete`.
    ///
    /// A rejected insert leaves this empty.
    #[must_use]
    pub fn last_events(&self) -> &[Event<K>] {
        self.raw.last_events()
    }

    /// Gets an iterator over the entries of the tree, sorted by key.
    ///
    /// Duplicates come out in insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            tree: &self.raw,
            front: self.raw.first_cursor(),
            back: self.raw.last_cursor(),
            remaining: self.raw.len(),
        }
    }

    /// Returns the entry with the smallest key.
    #[must_use]
    pub fn first_key_value(&self) -> Option<(&K, &Payload<V>)> {
        self.raw.first_cursor().map(|cursor| self.raw.entry(cursor))
    }

    /// Returns the entry with the largest key; the newest one among duplicates.
    #[must_use]
    pub fn last_key_value(&self) -> Option<(&K, &Payload<V>)> {
        self.raw.last_cursor().map(|cursor| self.raw.entry(cursor))
    }

    /// Snapshot of the whole structure, root level first, each level left to right.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::<i32>::with_orders(3, 2)?;
    /// for key in [10, 20, 30] {
    ///     tree.insert_key(key)?;
    /// }
    ///
    /// let levels = tree.traverse();
    /// assert_eq!(levels[0][0].keys, [20]);
    /// assert_eq!(levels[1][0].keys, [10]);
    /// assert_eq!(levels[1][1].keys, [20, 30]);
    /// assert_eq!(levels[1][0].next_leaf(), Some(levels[1][1].id));
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    #[must_use]
    pub fn traverse(&self) -> Levels<K>
    where
        K: Clone,
    {
        self.raw.traverse()
    }
}

impl<K: Ord, V> BPlusTree<K, V> {
    /// Looks up `key`, answering in the shape of the tree's mode.
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, Lookup, Payload, TreeConfig, ValueMode};
    ///
    /// let config = TreeConfig::new(3, 2).with_unique(false).with_value_mode(ValueMode::Record);
    /// let mut tree = BPlusTree::new(config)?;
    /// for n in 0..3 {
    ///     tree.insert(20, Payload::Record(n))?;
    /// }
    ///
    /// let found = tree.search(&20);
    /// assert_eq!(found.len(), 3);
    /// assert_eq!(found.first(), Some(&Payload::Record(0)));
    /// assert_eq!(tree.search(&7), Lookup::Multi(Vec::new()));
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    pub fn search<Q>(&self, key: &Q) -> Lookup<'_, V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        if self.raw.config().is_unique() {
            Lookup::Unique(self.raw.get(key))
        } else {
            Lookup::Multi(self.raw.get_all(key))
        }
    }

    /// The payload of the first entry equal to `key`.
    pub fn get<Q>(&self, key: &Q) -> Option<&Payload<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get(key)
    }

    /// Every payload stored under `key`, oldest first.
    pub fn get_all<Q>(&self, key: &Q) -> Vec<&Payload<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.get_all(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord,
    {
        self.raw.locate(key).is_some()
    }

    /// Constructs a double-ended iterator over a sub-range of entries.
    ///
    /// The range may also be entered as `(Bound<T>, Bound<T>)`, so for example
    /// `range((Excluded(4), Included(10)))` yields a left-exclusive, right-inclusive range.
    ///
    /// # Panics
    ///
    /// Panics if range `start > end`.
    /// Panics if range `start == end` and both bounds are `Excluded`.
    ///
    /// # Examples
    ///
    /// ```
    /// use core::ops::Bound::{Excluded, Included};
    /// use bplus_index::BPlusTree;
    ///
    /// let mut tree = BPlusTree::<i32>::default();
    /// for key in [3, 5, 8, 13] {
    ///     tree.insert_key(key)?;
    /// }
    /// let keys: Vec<_> = tree.range((Excluded(&3), Included(&8))).map(|(k, _)| *k).collect();
    /// assert_eq!(keys, [5, 8]);
    /// let keys: Vec<_> = tree.range(4..).rev().map(|(k, _)| *k).collect();
    /// assert_eq!(keys, [13, 8, 5]);
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    pub fn range<T, R>(&self, range: R) -> Range<'_, K, V>
    where
        T: ?Sized + Ord,
        K: Borrow<T>,
        R: RangeBounds<T>,
    {
        validate_range_bounds(&range);

        let front = self.raw.seek_front(range.start_bound());
        let back = self.raw.seek_rear(range.end_bound());
        let finished = match (front, back) {
            (Some(front), Some(back)) => self.raw.entry(front).0 > self.raw.entry(back).0,
            _ => true,
        };

        Range {
            tree: &self.raw,
            front,
            back,
            finished,
        }
    }

    /// Verifies every structural invariant of the tree.
    ///
    /// # Errors
    ///
    /// [`Error::Invariant`](crate::Error::Invariant) listing each violation found. A tree
    /// modified only through this API never fails the check.
    pub fn check_invariants(&self) -> Result<()> {
        self.raw.check_invariants()
    }
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Inserts `key` with `payload` and returns the events it caused.
    ///
    /// Equal keys in a non-unique tree are placed after the existing ones.
    ///
    /// # Errors
    ///
    /// - [`Error::DuplicateKey`](crate::Error::DuplicateKey) in unique mode when `key` is
    ///   already present.
    /// - [`Error::PayloadMode`](crate::Error::PayloadMode) when the payload kind does not
    ///   match the configured [`ValueMode`](crate::ValueMode).
    ///
    /// The tree is unchanged on error.
    pub fn insert(&mut self, key: K, payload: Payload<V>) -> Result<Vec<Event<K>>> {
        self.raw.insert(key, payload)?;
        Ok(self.raw.events_snapshot())
    }

    /// Inserts a key without payload into a key-only tree.
    ///
    /// # Errors
    ///
    /// Same as [`insert`](Self::insert).
    pub fn insert_key(&mut self, key: K) -> Result<Vec<Event<K>>> {
        self.insert(key, Payload::Empty)
    }

    /// Deletes the first entry equal to `key` and returns the events it caused.
    ///
    /// An absent key yields a single [`Event::NotFound`].
    ///
    /// # Examples
    ///
    /// ```
    /// use bplus_index::{BPlusTree, EventKind};
    /// use bplus_index::event::kinds;
    ///
    /// let mut tree = BPlusTree::<i32>::with_orders(3, 2)?;
    /// for key in [10, 20, 30] {
    ///     tree.insert_key(key)?;
    /// }
    /// tree.delete(&30);
    /// let events = tree.delete(&10);
    /// assert_eq!(kinds(&events), [EventKind::DeleteLeaf, EventKind::Merge, EventKind::NewRoot]);
    /// assert_eq!(tree.height(), 1);
    ///
    /// assert_eq!(kinds(&tree.delete(&99)), [EventKind::NotFound]);
    /// # Ok::<(), bplus_index::Error>(())
    /// ```
    pub fn delete<Q>(&mut self, key: &Q) -> Vec<Event<K>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord + ToOwned<Owned = K>,
    {
        self.raw.remove(key);
        self.raw.events_snapshot()
    }

    /// Deletes the first entry equal to `key` and returns its payload.
    ///
    /// The events are still available through [`last_events`](Self::last_events).
    pub fn remove<Q>(&mut self, key: &Q) -> Option<Payload<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord + ToOwned<Owned = K>,
    {
        self.raw.remove(key)
    }
}

impl<K, V> Default for BPlusTree<K, V> {
    /// A unique, key-only tree with `order_internal = 3` and `order_leaf = 2`.
    fn default() -> Self {
        Self::new(TreeConfig::default()).expect("`BPlusTree::default()` - default configuration is valid!")
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for BPlusTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Prints one line per level, internal nodes as `(INTERNAL: [..])` and leaves as
/// `[LEAF: [..]]`.
///
/// ```
/// use bplus_index::BPlusTree;
///
/// let mut tree = BPlusTree::<i32>::with_orders(3, 2)?;
/// for key in [10, 20, 30] {
///     tree.insert_key(key)?;
/// }
/// assert_eq!(tree.to_string(), "(INTERNAL: [20])\n[LEAF: [10]] [LEAF: [20, 30]]\n");
/// # Ok::<(), bplus_index::Error>(())
/// ```
impl<K: fmt::Debug + Clone, V> fmt::Display for BPlusTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for level in self.raw.traverse() {
            for (i, node) in level.iter().enumerate() {
                if i > 0 {
                    f.write_str(" ")?;
                }
                match node.kind {
                    NodeKind::Internal { .. } => write!(f, "(INTERNAL: {:?})", node.keys)?,
                    NodeKind::Leaf { .. } => write!(f, "[LEAF: {:?}]", node.keys)?,
                }
            }
            f.write_str("\n")?;
        }
        Ok(())
    }
}

impl<'a, K, V> IntoIterator for &'a BPlusTree<K, V> {
    type Item = (&'a K, &'a Payload<V>);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Iter<'a, K, V> {
        self.iter()
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a Payload<V>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let tree = self.tree;
        let cursor = self.front?;
        self.remaining -= 1;
        self.front = tree.step_forward(cursor);
        Some(tree.entry(cursor))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let tree = self.tree;
        let cursor = self.back?;
        self.remaining -= 1;
        self.back = tree.step_back(cursor);
        Some(tree.entry(cursor))
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {
    fn len(&self) -> usize {
        self.remaining
    }
}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Iter {
            tree: self.tree,
            front: self.front,
            back: self.back,
            remaining: self.remaining,
        }
    }
}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter").field("remaining", &self.remaining).finish()
    }
}

impl<'a, K, V> Iterator for Range<'a, K, V> {
    type Item = (&'a K, &'a Payload<V>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let tree = self.tree;
        let cursor = self.front?;
        if Some(cursor) == self.back {
            self.finished = true;
        } else {
            self.front = tree.step_forward(cursor);
        }
        Some(tree.entry(cursor))
    }
}

impl<K, V> DoubleEndedIterator for Range<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let tree = self.tree;
        let cursor = self.back?;
        if Some(cursor) == self.front {
            self.finished = true;
        } else {
            self.back = tree.step_back(cursor);
        }
        Some(tree.entry(cursor))
    }
}

impl<K, V> FusedIterator for Range<'_, K, V> {}

impl<K, V> Clone for Range<'_, K, V> {
    fn clone(&self) -> Self {
        Range {
            tree: self.tree,
            front: self.front,
            back: self.back,
            finished: self.finished,
        }
    }
}

impl<K, V> fmt::Debug for Range<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Range").field("finished", &self.finished).finish()
    }
}
