//! Property-Based Tests for the Ranked Set
//!
//! Drives the skip list with random operation sequences and compares every
//! observable answer against a naive sorted vector.
//!
//! # Test Properties
//!
//! 1. **Model Agreement**: rank, score and top-k match the naive model
//! 2. **Span Bookkeeping**: link spans stay consistent after every operation
//! 3. **Rank Consistency**: top(n) followed by rank() yields 0..n in order

#![cfg(test)]

use std::collections::HashMap;

use proptest::prelude::*;

use super::skiplist::RankedSet;

#[derive(Debug, Clone)]
enum Op {
    Insert(u8, u8),
    Remove(u8),
}

/// Small member and score domains force frequent ties and replacements.
fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0u8..40, 0u8..20).prop_map(|(m, s)| Op::Insert(m, s)),
        1 => (0u8..40).prop_map(Op::Remove),
    ]
}

fn model_order(model: &HashMap<u8, f64>) -> Vec<(u8, f64)> {
    let mut entries: Vec<(u8, f64)> = model.iter().map(|(m, s)| (*m, *s)).collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    entries
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the skip list answers exactly like a sorted vector.
    #[test]
    fn prop_matches_sorted_model(
        seed in any::<u64>(),
        ops in prop::collection::vec(op_strategy(), 1..300),
    ) {
        let mut set = RankedSet::with_seed(seed);
        let mut model: HashMap<u8, f64> = HashMap::new();

        for op in ops {
            match op {
                Op::Insert(m, s) => {
                    let previous = set.insert(m, f64::from(s));
                    prop_assert_eq!(previous, model.insert(m, f64::from(s)));
                }
                Op::Remove(m) => {
                    prop_assert_eq!(set.remove(&m), model.remove(&m));
                }
            }
        }

        set.check_invariants();
        let expected = model_order(&model);
        prop_assert_eq!(set.len(), expected.len());
        prop_assert_eq!(set.top(expected.len()), expected.clone());

        for (position, (member, score)) in expected.iter().enumerate() {
            prop_assert_eq!(set.rank(member), Some(position));
            prop_assert_eq!(set.score(member), Some(*score));
        }
    }

    /// Property: any page of the list equals the same slice of the model.
    #[test]
    fn prop_range_matches_slice(
        entries in prop::collection::hash_map(0u16..500, 0u8..50, 0..200),
        offset in 0usize..220,
        limit in 0usize..50,
    ) {
        let mut set = RankedSet::with_seed(3);
        let mut model = HashMap::new();
        for (m, s) in &entries {
            set.insert(*m, f64::from(*s));
            model.insert(*m, f64::from(*s));
        }

        let mut expected: Vec<(u16, f64)> = model.into_iter().collect();
        expected.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        let slice: Vec<(u16, f64)> = expected.into_iter().skip(offset).take(limit).collect();

        prop_assert_eq!(set.range(offset, limit), slice);
    }

    /// Property: top(n) then rank() for each member yields 0..n in order.
    #[test]
    fn prop_top_then_rank_is_consistent(
        entries in prop::collection::vec((0u16..100, 0u8..10), 0..150),
        n in 0usize..60,
    ) {
        let mut set = RankedSet::with_seed(11);
        for (m, s) in entries {
            set.insert(m, f64::from(s));
        }

        let top = set.top(n);
        prop_assert!(top.len() <= n);
        for (position, (member, _)) in top.iter().enumerate() {
            prop_assert_eq!(set.rank(member), Some(position));
        }
    }
}
