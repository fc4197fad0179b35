use alloc::borrow::ToOwned;
use alloc::vec::Vec;
use core::borrow::Borrow;

use super::handle::Handle;
use super::tree::{Cursor, RawBPlusTree};
use crate::event::Event;
use crate::payload::Payload;

/// Position of an underflowing node among its siblings.
struct Siblings {
    parent: Handle,
    index: usize,
    left: Option<Handle>,
    right: Option<Handle>,
}

impl<K: Ord + Clone, V> RawBPlusTree<K, V> {
    /// Removes the first entry equal to `key` and rebalances upward.
    ///
    /// A missing key is not an error: the log records `NotFound` and nothing changes.
    pub(crate) fn remove<Q>(&mut self, key: &Q) -> Option<Payload<V>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Ord + ToOwned<Owned = K>,
    {
        self.log.clear();

        let Some(Cursor { leaf, index }) = self.locate(key) else {
            self.log.push(Event::NotFound { key: key.to_owned() });
            return None;
        };

        let node = self.nodes.get_mut(leaf);
        let before = node.keys().to_vec();
        let (removed, value) = node.remove_entry(index);
        let count = node.key_count();
        let underflow = node.parent().is_some() && count < self.config.min_leaf_keys();
        self.log.push(Event::DeleteLeaf {
            leaf: node.id(),
            key: removed,
            index,
            before,
            after: node.keys().to_vec(),
        });
        self.len -= 1;
        let payload = self.values.take(value);

        if underflow {
            self.rebalance_leaf(leaf);
        }
        Some(payload)
    }

    fn siblings(&self, child: Handle) -> Siblings {
        let parent = self
            .nodes
            .get(child)
            .parent()
            .expect("`RawBPlusTree::siblings()` - the root has no siblings!");
        let node = self.nodes.get(parent);
        let index = node.index_of_child(child);
        Siblings {
            parent,
            index,
            left: index.checked_sub(1).map(|i| node.child(i)),
            right: (index + 1 < node.child_count()).then(|| node.child(index + 1)),
        }
    }

    /// Restores the occupancy of a non-root leaf: borrow from the left, else from the right,
    /// else merge.
    fn rebalance_leaf(&mut self, leaf: Handle) {
        let min = self.config.min_leaf_keys();
        let siblings = self.siblings(leaf);
        let surplus = |handle: &Handle| self.nodes.get(*handle).key_count() > min;

        if let Some(left) = siblings.left.filter(surplus) {
            self.borrow_leaf_left(leaf, left, &siblings);
        } else if let Some(right) = siblings.right.filter(surplus) {
            self.borrow_leaf_right(leaf, right, &siblings);
        } else {
            self.merge_leaf(leaf, &siblings);
        }
    }

    fn borrow_leaf_left(&mut self, leaf: Handle, left: Handle, at: &Siblings) {
        let parent = self.id_of(at.parent);
        let (node, sibling) = self.nodes.get_pair_mut(leaf, left);
        let (key, value) = sibling.pop_entry();
        node.push_entry_front(key.clone(), value);

        let event = Event::BorrowLeft {
            node: node.id(),
            sibling: sibling.id(),
            parent,
            separator: key.clone(),
            node_keys: node.keys().to_vec(),
            sibling_keys: sibling.keys().to_vec(),
        };
        self.nodes.get_mut(at.parent).set_key(at.index - 1, key);

        #[cfg(feature = "tracing")]
        tracing::debug!(node = self.id_of(leaf).get(), sibling = self.id_of(left).get(), "leaf borrowed from left");

        self.log.push(event);
    }

    fn borrow_leaf_right(&mut self, leaf: Handle, right: Handle, at: &Siblings) {
        let parent = self.id_of(at.parent);
        let (node, sibling) = self.nodes.get_pair_mut(leaf, right);
        let (key, value) = sibling.pop_entry_front();
        node.push_entry(key, value);
        let separator = sibling.key(0).clone();

        let event = Event::BorrowRight {
            node: node.id(),
            sibling: sibling.id(),
            parent,
            separator: separator.clone(),
            node_keys: node.keys().to_vec(),
            sibling_keys: sibling.keys().to_vec(),
        };
        self.nodes.get_mut(at.parent).set_key(at.index, separator);

        #[cfg(feature = "tracing")]
        tracing::debug!(node = self.id_of(leaf).get(), sibling = self.id_of(right).get(), "leaf borrowed from right");

        self.log.push(event);
    }

    /// Folds `leaf` into its left sibling, or into its right sibling when it is the first
    /// child, then unlinks it from the chain and the parent and frees it.
    fn merge_leaf(&mut self, leaf: Handle, at: &Siblings) {
        let parent = self.id_of(at.parent);
        let separator = self.nodes.get_mut(at.parent).remove_child(at.index);
        let absorbed = self.nodes.take(leaf);
        let absorbed_id = absorbed.id();

        let survivor = match (at.left, at.right) {
            (Some(left), _) => {
                self.nodes.get_mut(left).absorb_leaf_back(absorbed);
                left
            }
            (None, Some(right)) => {
                self.nodes.get_mut(right).absorb_leaf_front(absorbed);
                right
            }
            (None, None) => unreachable!("`RawBPlusTree::merge_leaf()` - non-root leaf without siblings!"),
        };

        let node = self.nodes.get(survivor);
        let (prev, next) = (node.prev(), node.next());
        match prev {
            Some(prev) => self.nodes.get_mut(prev).set_next(Some(survivor)),
            None => self.first_leaf = survivor,
        }
        match next {
            Some(next) => self.nodes.get_mut(next).set_prev(Some(survivor)),
            None => self.last_leaf = survivor,
        }

        let node = self.nodes.get(survivor);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            survivor = node.id().get(),
            absorbed = absorbed_id.get(),
            len = node.key_count(),
            "merged leaves"
        );

        self.log.push(Event::Merge {
            survivor: node.id(),
            absorbed: absorbed_id,
            parent,
            separator,
            keys: node.keys().to_vec(),
        });

        self.fix_internal(at.parent);
    }

    /// Checks an internal node that just lost a child.
    fn fix_internal(&mut self, handle: Handle) {
        let node = self.nodes.get(handle);
        match node.parent() {
            None if node.child_count() == 1 => self.collapse_root(handle),
            None => {}
            Some(_) if node.child_count() < self.config.min_internal_children() => self.rebalance_internal(handle),
            Some(_) => {}
        }
    }

    /// Replaces a root with a single child by that child.
    fn collapse_root(&mut self, handle: Handle) {
        let old = self.nodes.take(handle);
        let child = old.child(0);
        let node = self.nodes.get_mut(child);
        node.set_parent(None);
        self.root = child;

        #[cfg(feature = "tracing")]
        tracing::debug!(old_root = old.id().get(), new_root = node.id().get(), "collapsed root");

        self.log.push(Event::NewRoot {
            old_root: old.id(),
            new_root: node.id(),
            keys: node.keys().to_vec(),
        });
    }

    /// Same policy as `rebalance_leaf`, moving children instead of entries. Separators rotate
    /// through the parent.
    fn rebalance_internal(&mut self, handle: Handle) {
        let min = self.config.min_internal_children();
        let siblings = self.siblings(handle);
        let surplus = |h: &Handle| self.nodes.get(*h).child_count() > min;

        if let Some(left) = siblings.left.filter(surplus) {
            self.borrow_internal_left(handle, left, &siblings);
        } else if let Some(right) = siblings.right.filter(surplus) {
            self.borrow_internal_right(handle, right, &siblings);
        } else {
            self.merge_internal(handle, &siblings);
        }
    }

    fn borrow_internal_left(&mut self, handle: Handle, left: Handle, at: &Siblings) {
        let parent = self.id_of(at.parent);
        let down = self.nodes.get(at.parent).key(at.index - 1).clone();
        let (node, sibling) = self.nodes.get_pair_mut(handle, left);
        let (up, child) = sibling.pop_child();
        node.push_child_front(down, child);

        let event = Event::BorrowLeft {
            node: node.id(),
            sibling: sibling.id(),
            parent,
            separator: up.clone(),
            node_keys: node.keys().to_vec(),
            sibling_keys: sibling.keys().to_vec(),
        };
        self.nodes.get_mut(at.parent).set_key(at.index - 1, up);
        self.nodes.get_mut(child).set_parent(Some(handle));

        #[cfg(feature = "tracing")]
        tracing::debug!(node = self.id_of(handle).get(), sibling = self.id_of(left).get(), "internal borrowed from left");

        self.log.push(event);
    }

    fn borrow_internal_right(&mut self, handle: Handle, right: Handle, at: &Siblings) {
        let parent = self.id_of(at.parent);
        let down = self.nodes.get(at.parent).key(at.index).clone();
        let (node, sibling) = self.nodes.get_pair_mut(handle, right);
        let (up, child) = sibling.pop_child_front();
        node.push_child(down, child);

        let event = Event::BorrowRight {
            node: node.id(),
            sibling: sibling.id(),
            parent,
            separator: up.clone(),
            node_keys: node.keys().to_vec(),
            sibling_keys: sibling.keys().to_vec(),
        };
        self.nodes.get_mut(at.parent).set_key(at.index, up);
        self.nodes.get_mut(child).set_parent(Some(handle));

        #[cfg(feature = "tracing")]
        tracing::debug!(node = self.id_of(handle).get(), sibling = self.id_of(right).get(), "internal borrowed from right");

        self.log.push(event);
    }

    fn merge_internal(&mut self, handle: Handle, at: &Siblings) {
        let parent = self.id_of(at.parent);
        let separator = self.nodes.get_mut(at.parent).remove_child(at.index);
        let absorbed = self.nodes.take(handle);
        let absorbed_id = absorbed.id();
        let moved: Vec<Handle> = absorbed.children().to_vec();

        let survivor = match (at.left, at.right) {
            (Some(left), _) => {
                self.nodes.get_mut(left).absorb_internal_back(separator.clone(), absorbed);
                left
            }
            (None, Some(right)) => {
                self.nodes.get_mut(right).absorb_internal_front(absorbed, separator.clone());
                right
            }
            (None, None) => unreachable!("`RawBPlusTree::merge_internal()` - non-root node without siblings!"),
        };
        for child in moved {
            self.nodes.get_mut(child).set_parent(Some(survivor));
        }

        let node = self.nodes.get(survivor);
        #[cfg(feature = "tracing")]
        tracing::debug!(
            survivor = node.id().get(),
            absorbed = absorbed_id.get(),
            children = node.child_count(),
            "merged internal nodes"
        );

        self.log.push(Event::Merge {
            survivor: node.id(),
            absorbed: absorbed_id,
            parent,
            separator,
            keys: node.keys().to_vec(),
        });

        self.fix_internal(at.parent);
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use alloc::vec;
    use alloc::vec::Vec;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::config::TreeConfig;
    use crate::event::{EventKind, kinds};
    use crate::payload::ValueMode;

    fn tree_with(order_internal: usize, order_leaf: usize, keys: &[i32]) -> RawBPlusTree<i32, ()> {
        let mut tree = RawBPlusTree::new(TreeConfig::new(order_internal, order_leaf)).unwrap();
        for &key in keys {
            tree.insert(key, Payload::Empty).unwrap();
        }
        tree
    }

    fn leaf_keys(tree: &RawBPlusTree<i32, ()>) -> Vec<Vec<i32>> {
        let levels = tree.traverse();
        levels.last().unwrap().iter().map(|leaf| leaf.keys.clone()).collect()
    }

    #[test]
    fn missing_key_is_reported_not_failed() {
        let mut tree = tree_with(3, 2, &[10, 20]);
        assert_eq!(tree.remove(&15), None);
        assert_eq!(tree.last_events(), &[Event::NotFound { key: 15 }]);
        assert_eq!(tree.len(), 2);

        let mut empty = tree_with(3, 2, &[]);
        assert_eq!(empty.remove(&1), None);
        assert_eq!(kinds(empty.last_events()), [EventKind::NotFound]);
    }

    #[test]
    fn root_leaf_may_empty_out() {
        let mut tree = tree_with(3, 2, &[10, 20]);
        assert_eq!(tree.remove(&10), Some(Payload::Empty));
        assert_eq!(tree.remove(&20), Some(Payload::Empty));
        assert_eq!(kinds(tree.last_events()), [EventKind::DeleteLeaf]);
        assert_eq!(tree.height(), 1);
        tree.check_invariants().unwrap();
    }

    #[test]
    fn underflow_borrows_from_left_sibling() {
        // [20] / [10 15] [20 30]
        let mut tree = tree_with(3, 2, &[10, 20, 30, 15]);
        tree.remove(&30).unwrap();
        tree.remove(&20).unwrap();
        tree.check_invariants().unwrap();

        assert_eq!(leaf_keys(&tree), [vec![10], vec![15]]);
        assert_eq!(tree.traverse()[0][0].keys, [15]);
        assert_eq!(kinds(tree.last_events()), [EventKind::DeleteLeaf, EventKind::BorrowLeft]);
        match &tree.last_events()[1] {
            Event::BorrowLeft {
                separator,
                node_keys,
                sibling_keys,
                ..
            } => {
                assert_eq!(*separator, 15);
                assert_eq!(node_keys, &[15]);
                assert_eq!(sibling_keys, &[10]);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn underflow_borrows_from_right_sibling() {
        // [20] / [10] [20 30]
        let mut tree = tree_with(3, 2, &[10, 20, 30]);
        tree.remove(&10).unwrap();
        tree.check_invariants().unwrap();

        assert_eq!(leaf_keys(&tree), [vec![20], vec![30]]);
        assert_eq!(tree.traverse()[0][0].keys, [30]);
        assert_eq!(kinds(tree.last_events()), [EventKind::DeleteLeaf, EventKind::BorrowRight]);
    }

    #[test]
    fn merge_collapses_root_onto_single_leaf() {
        // [20] / [10] [20] after dropping 30
        let mut tree = tree_with(3, 2, &[10, 20, 30]);
        tree.remove(&30).unwrap();
        tree.remove(&10).unwrap();
        tree.check_invariants().unwrap();

        assert_eq!(tree.height(), 1);
        assert_eq!(leaf_keys(&tree), [vec![20]]);
        assert_eq!(
            kinds(tree.last_events()),
            [EventKind::DeleteLeaf, EventKind::Merge, EventKind::NewRoot]
        );
        let levels = tree.traverse();
        assert_eq!(levels[0][0].parent, None);
        assert!(levels[0][0].is_leaf());
    }

    #[test]
    fn merge_prefers_left_sibling() {
        // [20 30] / [10] [20] [30]
        let mut tree = tree_with(3, 2, &[10, 20, 30, 40]);
        tree.remove(&40).unwrap();
        assert_eq!(leaf_keys(&tree), [vec![10], vec![20], vec![30]]);
        let middle = tree.traverse()[1][1].id;
        let left = tree.traverse()[1][0].id;

        tree.remove(&20).unwrap();
        tree.check_invariants().unwrap();
        assert_eq!(leaf_keys(&tree), [vec![10], vec![30]]);
        match &tree.last_events()[1] {
            Event::Merge {
                survivor,
                absorbed,
                separator,
                ..
            } => {
                assert_eq!(*survivor, left);
                assert_eq!(*absorbed, middle);
                assert_eq!(*separator, 20);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn draining_shrinks_every_level() {
        for order in [(3, 2), (3, 1), (4, 3), (5, 4)] {
            let keys: Vec<i32> = (0..60).collect();
            let mut tree = tree_with(order.0, order.1, &keys);
            let mut seen = Vec::new();

            for key in keys.iter().rev().step_by(2).chain(keys.iter().step_by(2)) {
                assert!(tree.remove(key).is_some());
                tree.check_invariants().unwrap();
                seen.extend(kinds(tree.last_events()));
            }

            assert_eq!(tree.len(), 0);
            assert_eq!(tree.height(), 1);
            assert!(seen.contains(&EventKind::Merge));
            assert!(seen.contains(&EventKind::NewRoot));
        }
    }

    #[test]
    fn non_unique_remove_takes_oldest_duplicate() {
        let config = TreeConfig::new(3, 2).with_unique(false).with_value_mode(ValueMode::Record);
        let mut tree: RawBPlusTree<i32, u32> = RawBPlusTree::new(config).unwrap();
        for seq in 0..5 {
            tree.insert(20, Payload::Record(seq)).unwrap();
        }

        assert_eq!(tree.remove(&20), Some(Payload::Record(0)));
        assert_eq!(tree.remove(&20), Some(Payload::Record(1)));
        tree.check_invariants().unwrap();
        let rest: Vec<u32> = tree.get_all(&20).into_iter().filter_map(Payload::record).copied().collect();
        assert_eq!(rest, [2, 3, 4]);
    }

    #[derive(Clone, Debug)]
    enum Op {
        Insert(i32),
        Remove(i32),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![(0i32..64).prop_map(Op::Insert), (0i32..64).prop_map(Op::Remove)]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(96))]

        #[test]
        fn random_ops_match_model(
            order_internal in 3usize..7,
            order_leaf in 1usize..6,
            ops in prop::collection::vec(op(), 0..300),
        ) {
            let mut tree = tree_with(order_internal, order_leaf, &[]);
            let mut model = alloc::collections::BTreeSet::new();

            for op in ops {
                match op {
                    Op::Insert(key) => {
                        prop_assert_eq!(tree.insert(key, Payload::Empty).is_ok(), model.insert(key));
                    }
                    Op::Remove(key) => {
                        prop_assert_eq!(tree.remove(&key).is_some(), model.remove(&key));
                    }
                }
                prop_assert!(tree.check_invariants().is_ok(), "{:?}", tree.check_invariants());
            }

            let scanned: Vec<i32> = leaf_keys(&tree).into_iter().flatten().collect();
            prop_assert_eq!(scanned, model.into_iter().collect::<Vec<_>>());
        }

        #[test]
        fn random_ops_match_multiset_model(
            order_internal in 3usize..6,
            order_leaf in 1usize..5,
            ops in prop::collection::vec(op(), 0..300),
        ) {
            let config = TreeConfig::new(order_internal, order_leaf)
                .with_unique(false)
                .with_value_mode(ValueMode::Record);
            let mut tree: RawBPlusTree<i32, usize> = RawBPlusTree::new(config).unwrap();
            let mut model: Vec<(i32, usize)> = Vec::new();

            for (seq, op) in ops.into_iter().enumerate() {
                match op {
                    Op::Insert(key) => {
                        tree.insert(key, Payload::Record(seq)).unwrap();
                        let at = model.partition_point(|&(k, _)| k <= key);
                        model.insert(at, (key, seq));
                    }
                    Op::Remove(key) => {
                        let expected = model.iter().position(|&(k, _)| k == key).map(|i| model.remove(i).1);
                        prop_assert_eq!(tree.remove(&key).and_then(Payload::into_record), expected);
                    }
                }
                prop_assert!(tree.check_invariants().is_ok(), "{:?}", tree.check_invariants());
            }

            let mut cursor = tree.first_cursor();
            let mut scanned = Vec::new();
            while let Some(at) = cursor {
                let (key, payload) = tree.entry(at);
                scanned.push((*key, *payload.record().unwrap()));
                cursor = tree.step_forward(at);
            }
            prop_assert_eq!(scanned, model);
        }
    }
}
