use std::collections::BTreeMap;
use std::ops::Bound;

use bplus_index::event::kinds;
use bplus_index::{BPlusTree, BlockPtr, Error, Event, EventKind, Lookup, Payload, TreeConfig, ValueMode};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

/// The number of operations to perform in each proptest case.
const TEST_SIZE: usize = 2_000;

/// Narrow enough to produce plenty of collisions and deletions of present keys.
fn key_strategy() -> impl Strategy<Value = i64> {
    -500i64..500i64
}

fn order_strategy() -> impl Strategy<Value = (usize, usize)> {
    (3usize..9, 1usize..9)
}

// ─── Operations enum for driving randomized tests ────────────────────────────

#[derive(Debug, Clone)]
enum TreeOp {
    Insert(i64, u32),
    Delete(i64),
    Search(i64),
    First,
    Last,
}

fn tree_op_strategy() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        5 => (key_strategy(), any::<u32>()).prop_map(|(k, v)| TreeOp::Insert(k, v)),
        4 => key_strategy().prop_map(TreeOp::Delete),
        2 => key_strategy().prop_map(TreeOp::Search),
        1 => Just(TreeOp::First),
        1 => Just(TreeOp::Last),
    ]
}

fn record_tree(order: (usize, usize), unique: bool) -> BPlusTree<i64, u32> {
    let config = TreeConfig::new(order.0, order.1)
        .with_unique(unique)
        .with_value_mode(ValueMode::Record);
    BPlusTree::new(config).unwrap()
}

fn key_tree(order: (usize, usize), keys: &[i64]) -> BPlusTree<i64> {
    let mut tree = BPlusTree::with_orders(order.0, order.1).unwrap();
    for &key in keys {
        tree.insert_key(key).unwrap();
    }
    tree
}

fn leaf_keys(tree: &BPlusTree<i64>) -> Vec<Vec<i64>> {
    tree.traverse().last().unwrap().iter().map(|leaf| leaf.keys.clone()).collect()
}

// ─── Randomized model tests ──────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Replays a random operation sequence on a unique tree and on `BTreeMap`, checking
    /// results and every structural invariant after each step.
    #[test]
    fn unique_ops_match_btreemap(order in order_strategy(), ops in proptest::collection::vec(tree_op_strategy(), TEST_SIZE)) {
        let mut tree = record_tree(order, true);
        let mut model: BTreeMap<i64, u32> = BTreeMap::new();

        for op in &ops {
            match *op {
                TreeOp::Insert(k, v) => {
                    let result = tree.insert(k, Payload::Record(v));
                    if model.contains_key(&k) {
                        prop_assert_eq!(result, Err(Error::DuplicateKey), "insert({})", k);
                    } else {
                        prop_assert!(result.is_ok(), "insert({})", k);
                        model.insert(k, v);
                    }
                }
                TreeOp::Delete(k) => {
                    let removed = tree.remove(&k).and_then(Payload::into_record);
                    prop_assert_eq!(removed, model.remove(&k), "delete({})", k);
                }
                TreeOp::Search(k) => {
                    let found = tree.search(&k).first().and_then(Payload::record).copied();
                    prop_assert_eq!(found, model.get(&k).copied(), "search({})", k);
                }
                TreeOp::First => {
                    let first = tree.first_key_value().map(|(k, p)| (*k, *p.record().unwrap()));
                    prop_assert_eq!(first, model.first_key_value().map(|(k, v)| (*k, *v)));
                }
                TreeOp::Last => {
                    let last = tree.last_key_value().map(|(k, p)| (*k, *p.record().unwrap()));
                    prop_assert_eq!(last, model.last_key_value().map(|(k, v)| (*k, *v)));
                }
            }
            prop_assert!(tree.check_invariants().is_ok(), "{:?}", tree.check_invariants());
            prop_assert_eq!(tree.len(), model.len());
        }

        let entries: Vec<(i64, u32)> = tree.iter().map(|(k, p)| (*k, *p.record().unwrap())).collect();
        prop_assert_eq!(entries, model.into_iter().collect::<Vec<_>>());
    }

    /// Non-unique trees against a sorted multiset that keeps duplicates in insertion order.
    #[test]
    fn non_unique_ops_match_sorted_vec(order in order_strategy(), ops in proptest::collection::vec(tree_op_strategy(), TEST_SIZE)) {
        let mut tree = record_tree(order, false);
        let mut model: Vec<(i64, u32)> = Vec::new();

        for op in &ops {
            match *op {
                TreeOp::Insert(k, v) => {
                    tree.insert(k, Payload::Record(v)).unwrap();
                    let at = model.partition_point(|&(mk, _)| mk <= k);
                    model.insert(at, (k, v));
                }
                TreeOp::Delete(k) => {
                    let expected = model.iter().position(|&(mk, _)| mk == k).map(|i| model.remove(i).1);
                    let removed = tree.remove(&k).and_then(Payload::into_record);
                    prop_assert_eq!(removed, expected, "delete({})", k);
                }
                TreeOp::Search(k) => {
                    let found: Vec<u32> = tree.search(&k).into_vec().into_iter().filter_map(Payload::record).copied().collect();
                    let expected: Vec<u32> = model.iter().filter(|&&(mk, _)| mk == k).map(|&(_, v)| v).collect();
                    prop_assert_eq!(found, expected, "search({})", k);
                }
                TreeOp::First => {
                    prop_assert_eq!(tree.first_key_value().map(|(k, _)| *k), model.first().map(|e| e.0));
                }
                TreeOp::Last => {
                    let last = tree.last_key_value().map(|(k, p)| (*k, *p.record().unwrap()));
                    prop_assert_eq!(last, model.last().copied());
                }
            }
            prop_assert!(tree.check_invariants().is_ok(), "{:?}", tree.check_invariants());
        }

        let entries: Vec<(i64, u32)> = tree.iter().map(|(k, p)| (*k, *p.record().unwrap())).collect();
        prop_assert_eq!(entries, model);
    }

    /// Ranges in both directions against `BTreeMap::range`.
    #[test]
    fn range_matches_btreemap(
        order in order_strategy(),
        keys in proptest::collection::vec(key_strategy(), 0..500),
        a in key_strategy(),
        b in key_strategy(),
        start_kind in 0u8..3,
        end_kind in 0u8..3,
    ) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        let bound = |kind: u8, key: i64| match kind {
            0 => Bound::Included(key),
            1 => Bound::Excluded(key),
            _ => Bound::Unbounded,
        };
        let start = bound(start_kind, lo);
        let end = bound(end_kind, hi);
        // `BTreeMap` panics on these; so does the tree.
        prop_assume!(!(lo == hi && matches!((start, end), (Bound::Excluded(_), Bound::Excluded(_)))));

        let mut tree = BPlusTree::<i64>::with_orders(order.0, order.1).unwrap();
        let mut model = BTreeMap::new();
        for key in keys {
            let _ = tree.insert_key(key);
            model.insert(key, ());
        }

        let forward: Vec<i64> = tree.range((start, end)).map(|(k, _)| *k).collect();
        let expected: Vec<i64> = model.range((start, end)).map(|(k, _)| *k).collect();
        prop_assert_eq!(&forward, &expected);

        let backward: Vec<i64> = tree.range((start, end)).rev().map(|(k, _)| *k).collect();
        prop_assert_eq!(backward, expected.into_iter().rev().collect::<Vec<_>>());
    }

    /// Inserting a fresh key and deleting it again leaves the same key set.
    #[test]
    fn insert_then_delete_round_trips(
        order in order_strategy(),
        keys in proptest::collection::btree_set(key_strategy(), 0..300),
        extra in key_strategy(),
    ) {
        prop_assume!(!keys.contains(&extra));
        let keys: Vec<i64> = keys.into_iter().collect();
        let mut tree = key_tree(order, &keys);

        tree.insert_key(extra).unwrap();
        tree.delete(&extra);

        tree.check_invariants().unwrap();
        let after: Vec<i64> = tree.iter().map(|(k, _)| *k).collect();
        prop_assert_eq!(after, keys);
    }

    /// Every leaf sits at the same depth, whatever the order and key sequence.
    #[test]
    fn leaves_share_one_depth(order in order_strategy(), keys in proptest::collection::vec(key_strategy(), 0..400)) {
        let mut tree = BPlusTree::<i64>::with_orders(order.0, order.1).unwrap();
        for (i, key) in keys.iter().enumerate() {
            if i % 3 == 2 {
                tree.delete(key);
            } else {
                let _ = tree.insert_key(*key);
            }
        }
        let levels = tree.traverse();
        prop_assert_eq!(levels.len(), tree.height());
        let (last, upper) = levels.split_last().unwrap();
        prop_assert!(last.iter().all(|node| node.is_leaf()));
        prop_assert!(upper.iter().flatten().all(|node| !node.is_leaf()));
    }
}

// ─── Scenarios ───────────────────────────────────────────────────────────────

#[test]
fn leaf_split_promotes_first_key_of_right_leaf() {
    let tree = key_tree((3, 2), &[10, 20, 30]);
    let levels = tree.traverse();

    assert_eq!(levels.len(), 2);
    assert_eq!(levels[0][0].keys, [20]);
    assert_eq!(leaf_keys(&tree), [vec![10], vec![20, 30]]);
    assert_eq!(levels[0][0].children(), [levels[1][0].id, levels[1][1].id]);
    assert_eq!(levels[1][0].parent, Some(levels[0][0].id));
}

#[test]
fn fourth_leaf_split_splits_internal_node() {
    let mut tree = key_tree((3, 2), &[10, 20, 30, 40]);
    assert_eq!(tree.traverse()[0][0].children().len(), 3);

    tree.insert_key(50).unwrap();
    let levels = tree.traverse();
    assert_eq!(levels.len(), 3);
    assert_eq!(levels[0][0].keys.len(), 1);
    assert_eq!(levels[1].len(), 2);
    for node in &levels[1] {
        assert_eq!(node.children().len(), 2);
        assert_eq!(node.parent, Some(levels[0][0].id));
    }
    tree.check_invariants().unwrap();
}

#[test]
fn borrow_left_moves_last_entry_and_updates_separator() {
    let mut tree = key_tree((3, 2), &[10, 20, 30, 15]);
    tree.delete(&30);
    assert_eq!(leaf_keys(&tree), [vec![10, 15], vec![20]]);

    tree.delete(&20);
    assert_eq!(leaf_keys(&tree), [vec![10], vec![15]]);
    assert_eq!(tree.traverse()[0][0].keys, [15]);
    tree.check_invariants().unwrap();
}

#[test]
fn merge_collapses_root_to_single_leaf() {
    let mut tree = key_tree((3, 2), &[10, 20, 30]);
    tree.delete(&30);
    assert_eq!(leaf_keys(&tree), [vec![10], vec![20]]);

    tree.delete(&20);
    let levels = tree.traverse();
    assert_eq!(levels.len(), 1);
    assert!(levels[0][0].is_leaf());
    assert_eq!(levels[0][0].keys, [10]);
    assert_eq!(levels[0][0].parent, None);
    tree.check_invariants().unwrap();
}

#[test]
fn duplicates_across_a_leaf_boundary_are_all_found() {
    let mut tree = record_tree((3, 2), false);
    for seq in 0..3 {
        tree.insert(20, Payload::Record(seq)).unwrap();
    }
    assert_eq!(tree.height(), 2);

    let found: Vec<u32> = tree.get_all(&20).into_iter().filter_map(Payload::record).copied().collect();
    assert_eq!(found, [0, 1, 2]);
    assert_eq!(tree.search(&20).len(), 3);
    assert!(matches!(tree.search(&21), Lookup::Multi(ref v) if v.is_empty()));
}

#[test]
fn duplicate_rejection_leaves_tree_unchanged() {
    let mut tree = key_tree((3, 2), &[5, 1, 9, 3, 7]);
    let before = tree.traverse();

    assert_eq!(tree.insert_key(7), Err(Error::DuplicateKey));
    assert_eq!(tree.traverse(), before);
    assert!(tree.last_events().is_empty());
}

#[test]
fn separators_are_thresholds_not_keys() {
    let mut tree = key_tree((3, 2), &[10, 20, 30, 40, 50, 60]);
    for key in [20, 40] {
        tree.delete(&key);
    }
    tree.check_invariants().unwrap();

    for key in [10, 30, 50, 60] {
        assert!(tree.contains_key(&key), "{key} went missing");
    }
    for key in [20, 40] {
        assert_eq!(tree.get(&key), None);
    }
    // Reinserting a deleted key routes by the surviving separators.
    tree.insert_key(40).unwrap();
    assert!(tree.contains_key(&40));
    tree.check_invariants().unwrap();
}

#[test]
fn construction_validates_orders() {
    for (internal, leaf) in [(2, 2), (0, 5), (3, 0), (1, 1)] {
        assert_eq!(
            BPlusTree::<i64>::with_orders(internal, leaf).err(),
            Some(Error::InvalidOrder {
                order_internal: internal,
                order_leaf: leaf
            })
        );
    }
    assert!(BPlusTree::<i64>::with_orders(3, 1).is_ok());
}

#[test]
fn payload_kind_must_match_value_mode() {
    let config = TreeConfig::new(4, 4).with_value_mode(ValueMode::BlockPtr);
    let mut tree: BPlusTree<u64> = BPlusTree::new(config).unwrap();

    assert_eq!(
        tree.insert_key(1),
        Err(Error::PayloadMode {
            expected: ValueMode::BlockPtr,
            found: ValueMode::KeyOnly
        })
    );
    assert!(tree.is_empty());

    tree.insert(1, BlockPtr::new(3, 64).into()).unwrap();
    assert_eq!(tree.get(&1).and_then(Payload::location), Some(BlockPtr::new(3, 64)));
}

#[test]
fn large_orders_spill_past_inline_storage() {
    let keys: Vec<i64> = (0..2_000).map(|i| (i * 7919) % 2_000).collect();
    let mut tree = key_tree((32, 24), &keys);
    tree.check_invariants().unwrap();
    assert_eq!(tree.len(), 2_000);
    assert!(tree.iter().map(|(k, _)| *k).eq(0..2_000));

    for key in (0..2_000).filter(|k| k % 3 != 0) {
        tree.delete(&key);
    }
    tree.check_invariants().unwrap();
    assert!(tree.iter().map(|(k, _)| *k).eq((0..2_000).filter(|k| k % 3 == 0)));
}

#[test]
fn string_keys_support_borrowed_lookups() {
    let mut tree: BPlusTree<String> = BPlusTree::default();
    for word in ["pear", "apple", "fig", "kiwi"] {
        tree.insert_key(word.to_string()).unwrap();
    }
    assert!(tree.contains_key("fig"));
    assert!(!tree.contains_key("plum"));
    let words: Vec<&str> = tree.range::<str, _>((Bound::Included("b"), Bound::Excluded("l"))).map(|(k, _)| k.as_str()).collect();
    assert_eq!(words, ["fig", "kiwi"]);

    assert_eq!(kinds(&tree.delete("fig"))[0], EventKind::DeleteLeaf);
    assert_eq!(tree.remove("kiwi"), Some(Payload::Empty));
    assert_eq!(tree.delete("plum"), [Event::NotFound { key: "plum".to_string() }]);
    assert_eq!(tree.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), ["apple", "pear"]);
    tree.check_invariants().unwrap();
}
