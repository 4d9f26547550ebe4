//! Property-based tests for the ordered tick tree.
//!
//! Random operation sequences are generated via proptest strategies and
//! checked against a flat model: after any interleaving of inserts and
//! removes, an in-order walk must visit exactly the live entries sorted by
//! key with FIFO order among duplicates, and `lookup_ge` must agree with a
//! linear scan of the sorted model.
//!
//! # Weighted Generation
//!
//! Inserts outweigh removes 3:1 so generated trees actually grow and the
//! walks cover non-trivial shapes.

use coopsched::sched::ticktree::{EntryId, TickTree};
use coopsched::test_utils::init_test_logging;
use proptest::prelude::*;

// ============================================================================
// Operations & strategies
// ============================================================================

/// One mutation of the tree under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TreeOp {
    /// Insert under this key. The small key range forces duplicates.
    Insert(u32),
    /// Remove a live entry; the index is reduced modulo the live count and
    /// the operation is skipped while the tree is empty.
    Remove(usize),
}

fn arb_tree_op() -> impl Strategy<Value = TreeOp> {
    prop_oneof![
        3 => (0u32..128).prop_map(TreeOp::Insert),
        1 => (0usize..100).prop_map(TreeOp::Remove),
    ]
}

fn arb_tree_ops() -> impl Strategy<Value = Vec<TreeOp>> {
    prop::collection::vec(arb_tree_op(), 1..400)
}

// ============================================================================
// Model helpers
// ============================================================================

/// Applies `ops`, keeping a flat model of the live entries as
/// `(key, insertion ticket, handle)` and checking the population after every
/// step.
fn apply_ops(tree: &mut TickTree<usize>, ops: &[TreeOp]) -> Vec<(u32, usize, EntryId)> {
    let mut live: Vec<(u32, usize, EntryId)> = Vec::new();
    let mut ticket = 0usize;
    for &op in ops {
        match op {
            TreeOp::Insert(key) => {
                let entry = tree.insert(key, ticket);
                live.push((key, ticket, entry));
                ticket += 1;
            }
            TreeOp::Remove(selector) => {
                if !live.is_empty() {
                    let (_, _, entry) = live.swap_remove(selector % live.len());
                    assert!(tree.remove(entry).is_some(), "live entry must remove");
                }
            }
        }
        assert_eq!(tree.len(), live.len(), "population tracks the model");
    }
    live
}

fn in_order(tree: &TickTree<usize>) -> Vec<EntryId> {
    let mut out = Vec::new();
    let mut cursor = tree.first();
    while let Some(entry) = cursor {
        out.push(entry);
        cursor = tree.next(entry);
    }
    out
}

/// Sorts the model the way the tree must order it: by key, then by insertion.
fn sorted_handles(mut model: Vec<(u32, usize, EntryId)>) -> Vec<EntryId> {
    model.sort_by_key(|&(key, ticket, _)| (key, ticket));
    model.into_iter().map(|(_, _, entry)| entry).collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    /// An in-order walk visits entries sorted by key, FIFO among duplicates.
    #[test]
    fn in_order_walk_is_sorted(keys in prop::collection::vec(0u32..64, 1..200)) {
        init_test_logging();
        let mut tree = TickTree::new();
        let mut model: Vec<(u32, usize, EntryId)> = Vec::new();
        for (ticket, &key) in keys.iter().enumerate() {
            let entry = tree.insert(key, ticket);
            model.push((key, ticket, entry));
        }
        prop_assert_eq!(in_order(&tree), sorted_handles(model));
    }

    /// `lookup_ge` returns what a linear scan of the sorted model finds:
    /// the first entry at or above the probe, earliest-inserted among equals.
    #[test]
    fn lookup_ge_matches_a_linear_scan(
        keys in prop::collection::vec(0u32..1000, 1..200),
        probes in prop::collection::vec(0u32..1100, 1..32),
    ) {
        init_test_logging();
        let mut tree = TickTree::new();
        let mut model: Vec<(u32, EntryId)> = Vec::new();
        for (ticket, &key) in keys.iter().enumerate() {
            let entry = tree.insert(key, ticket);
            model.push((key, entry));
        }
        // Stable sort: equal keys keep insertion order, so the first match in
        // the model is also the tree's answer.
        model.sort_by_key(|&(key, _)| key);

        for probe in probes.into_iter().chain([0, 999, 1000, u32::MAX]) {
            let expected = model.iter().find(|&&(key, _)| key >= probe).map(|&(_, e)| e);
            prop_assert_eq!(tree.lookup_ge(probe), expected, "probe {}", probe);
        }
    }

    /// Any interleaving of inserts and removes leaves the walk equal to the
    /// model of the surviving entries.
    #[test]
    fn interleaved_insert_remove_stays_consistent(ops in arb_tree_ops()) {
        init_test_logging();
        let mut tree = TickTree::new();
        let live = apply_ops(&mut tree, &ops);
        prop_assert_eq!(tree.len(), live.len());
        prop_assert_eq!(in_order(&tree), sorted_handles(live));
    }
}
