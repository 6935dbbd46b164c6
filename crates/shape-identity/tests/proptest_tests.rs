//! Property-based tests for identity bookkeeping invariants.

use proptest::prelude::*;
use uuid::Uuid;

use shape_identity::{EvolutionLedger, EvolutionRelation, SequentialIds, ShapeHistory};

// ---------------------------------------------------------------------------
// Strategy helpers
// ---------------------------------------------------------------------------

/// Sequence of split sizes a single input id goes through across recomputes.
fn arb_split_sizes() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1usize..8, 1..12)
}

/// Chain length and an arbitrary set of extra forward edges (i < j).
fn arb_dag() -> impl Strategy<Value = (usize, Vec<(usize, usize)>)> {
    (2usize..20).prop_flat_map(|n| {
        let edge = (0..n, 0..n).prop_filter_map("forward only", |(a, b)| {
            (a < b).then_some((a, b))
        });
        (Just(n), prop::collection::vec(edge, 0..30))
    })
}

fn id(n: usize) -> Uuid {
    Uuid::from_u128(n as u128 + 1)
}

// ---------------------------------------------------------------------------
// 1. Split ids are a stable prefix: every request returns the first K ids
//    ever assigned to the input, whatever the request sequence.
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn split_ids_are_a_stable_prefix(sizes in arb_split_sizes(), seed in 0u64..1000) {
        let mut ids = SequentialIds::new(seed);
        let mut ledger = EvolutionLedger::new();
        let face = Uuid::from_u128(u128::MAX);
        let mut longest: Vec<Uuid> = Vec::new();

        for k in sizes {
            let outs = ledger.update_splits(face, EvolutionRelation::Modified, k, &mut ids);
            prop_assert_eq!(outs.len(), k);
            let shared = k.min(longest.len());
            prop_assert_eq!(&outs[..shared], &longest[..shared]);
            if outs.len() > longest.len() {
                longest = outs;
            }
        }
        prop_assert_eq!(ledger.evolve(face), longest.clone());
        prop_assert_eq!(ids.issued() as usize, longest.len());
    }
}

// ---------------------------------------------------------------------------
// 2. Rebuilding a ledger from its rows reproduces every lookup.
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn ledger_rows_rebuild_identical_lookups(pairs in prop::collection::vec((0usize..6, 0usize..40), 0..40)) {
        let mut ledger = EvolutionLedger::new();
        for (a, b) in &pairs {
            ledger.insert_evolve(id(*a), id(100 + *b));
        }
        let rebuilt = EvolutionLedger::from(ledger.records().to_vec());
        for a in 0..6 {
            prop_assert_eq!(rebuilt.evolve(id(a)), ledger.evolve(id(a)));
        }
    }
}

// ---------------------------------------------------------------------------
// 3. Along a chain, evolve from the head reaches every later feature and
//    devolve from the tail reaches every earlier one.
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn history_bfs_follows_every_path((n, extra) in arb_dag()) {
        let mut history = ShapeHistory::new();
        // feature i emits shape i
        for i in 0..n {
            history.add_shape(id(1000 + i), id(i));
        }
        for i in 1..n {
            history.add_connection(id(i - 1), id(i)).unwrap();
        }
        for (a, b) in extra {
            history.add_connection(id(a), id(b)).unwrap();
        }

        for i in 0..n {
            prop_assert_eq!(history.evolve(id(1000 + i), id(0)), Some(id(i)));
            prop_assert_eq!(history.devolve(id(1000 + i), id(n - 1)), Some(id(i)));
        }
        prop_assert_eq!(history.create_evolve_history(id(0)).len(), n);
        prop_assert_eq!(history.create_devolve_history(id(0)).len(), 1);
    }
}

// ---------------------------------------------------------------------------
// 4. Pruning a chain's head does not stop a pick history from resolving to
//    the tail.
// ---------------------------------------------------------------------------

proptest! {
    #[test]
    fn resolve_survives_pruned_prefix(n in 3usize..15, pruned in 1usize..3) {
        let mut full = ShapeHistory::new();
        for i in 0..n {
            full.add_shape(id(1000 + i), id(i));
        }
        for i in 1..n {
            full.add_connection(id(i - 1), id(i)).unwrap();
        }
        let pick = full.create_evolve_history(id(0));

        let mut live = ShapeHistory::new();
        for i in pruned..n {
            live.add_shape(id(1000 + i), id(i));
        }
        for i in pruned + 1..n {
            live.add_connection(id(i - 1), id(i)).unwrap();
        }
        prop_assert_eq!(live.resolve_histories(&pick, id(1000 + n - 1)), vec![id(n - 1)]);
    }
}
