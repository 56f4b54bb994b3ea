//! Universal invariants (spec.md §8, P1–P7), checked over random
//! `add`/`remove` sequences with `proptest`.

use std::collections::{HashMap, HashSet};

use proptest::prelude::*;
use rivulet::{Engine, RowId, Stage};
use rivulet_expr::{new_register, AccumulatorKind, ScalarExpr, ScalarOp};
use rivulet_repr::{Map, Record, Sign, Value};

fn record_with_n(n: i64) -> Record {
    let mut fields = Map::new();
    fields.insert("n".into(), Value::Int(n));
    Record::new(fields)
}

/// P1 — IVM-equals-batch: a filter's incrementally maintained snapshot
/// agrees, as a multiset, with re-filtering the live-set from scratch.
proptest! {
    #[test]
    fn p1_filter_snapshot_matches_batch_recompute(values in prop::collection::vec(-50i64..50, 0..30)) {
        let mut engine = Engine::default();
        let handle = engine
            .compile(vec![Stage::filter(ScalarExpr::call(
                ScalarOp::Gt,
                vec![ScalarExpr::field("n"), ScalarExpr::lit(0i64)],
            ))])
            .unwrap();

        for v in &values {
            engine.add(record_with_n(*v));
        }

        let mut incremental: Vec<i64> = engine
            .snapshot(handle)
            .unwrap()
            .into_iter()
            .map(|r| match r.get("n") {
                Some(Value::Int(n)) => *n,
                _ => unreachable!(),
            })
            .collect();
        let mut batch: Vec<i64> = values.into_iter().filter(|v| *v > 0).collect();
        incremental.sort();
        batch.sort();
        prop_assert_eq!(incremental, batch);
    }
}

/// P2 — Add/Remove inverse: adding then removing the same record restores
/// the prior snapshot.
proptest! {
    #[test]
    fn p2_add_then_remove_is_a_no_op(seed in prop::collection::vec(-20i64..20, 0..10), extra in -20i64..20) {
        let mut engine = Engine::default();
        let handle = engine.compile(vec![]).unwrap();
        for v in &seed {
            engine.add(record_with_n(*v));
        }
        let before = engine.snapshot(handle).unwrap();

        let id = engine.add(record_with_n(extra));
        engine.remove(id);
        let after = engine.snapshot(handle).unwrap();

        prop_assert_eq!(before.len(), after.len());
    }
}

/// P3 — Delta associativity: splitting the same add sequence into
/// differently sized batches yields the same final snapshot, since every
/// `add`/`remove` call already runs to completion against every plan
/// before the next is accepted (spec.md §5 "Scheduling model").
proptest! {
    #[test]
    fn p3_batch_partitioning_does_not_affect_final_snapshot(values in prop::collection::vec(-50i64..50, 0..40)) {
        let build = |chunk_size: usize| {
            let mut engine = Engine::default();
            let handle = engine
                .compile(vec![Stage::filter(ScalarExpr::call(
                    ScalarOp::Gt,
                    vec![ScalarExpr::field("n"), ScalarExpr::lit(0i64)],
                ))])
                .unwrap();
            for chunk in values.chunks(chunk_size.max(1)) {
                engine.add_many(chunk.iter().map(|v| record_with_n(*v)).collect());
            }
            let mut snapshot: Vec<i64> = engine
                .snapshot(handle)
                .unwrap()
                .into_iter()
                .map(|r| match r.get("n") {
                    Some(Value::Int(n)) => *n,
                    _ => unreachable!(),
                })
                .collect();
            snapshot.sort();
            snapshot
        };

        prop_assert_eq!(build(1), build(3));
        prop_assert_eq!(build(3), build(7));
    }
}

/// P4 — Group reversibility: `apply(apply(state, +v), -v) = state` for
/// every accumulator kind.
proptest! {
    #[test]
    fn p4_accumulators_reverse_their_own_contribution(values in prop::collection::vec(-100i64..100, 1..20)) {
        for kind in [
            AccumulatorKind::Sum,
            AccumulatorKind::Avg,
            AccumulatorKind::Min,
            AccumulatorKind::Max,
            AccumulatorKind::Count,
            AccumulatorKind::First,
            AccumulatorKind::Last,
            AccumulatorKind::Push,
            AccumulatorKind::AddToSet,
        ] {
            let mut register = new_register(kind);
            for v in &values {
                register.apply(&Value::Int(*v), Sign::Positive);
            }
            let steady_state = register.output();
            for v in &values {
                register.apply(&Value::Int(*v), Sign::Negative);
            }
            prop_assert!(register.is_empty());

            for v in &values {
                register.apply(&Value::Int(*v), Sign::Positive);
            }
            prop_assert_eq!(register.output(), steady_state, "kind = {:?}", kind);
        }
    }
}

/// P5 — Sort stability: records sharing a sort key come out in the order
/// they were added (row id as the final tie-break).
proptest! {
    #[test]
    fn p5_equal_keys_preserve_insertion_order(count in 1usize..15) {
        let mut engine = Engine::default();
        let handle = engine
            .compile(vec![Stage::Sort(vec![rivulet::SortKey {
                field: "n".into(),
                direction: rivulet::SortDirection::Ascending,
            }])])
            .unwrap();
        for tag in 0..count {
            let mut fields = Map::new();
            fields.insert("n".into(), Value::Int(7));
            fields.insert("tag".into(), Value::Int(tag as i64));
            engine.add(Record::new(fields));
        }
        let tags: Vec<i64> = engine
            .snapshot(handle)
            .unwrap()
            .into_iter()
            .map(|r| match r.get("tag") {
                Some(Value::Int(n)) => *n,
                _ => unreachable!(),
            })
            .collect();
        let expected: Vec<i64> = (0..count as i64).collect();
        prop_assert_eq!(tags, expected);
    }
}

/// P6 — Virtual-id determinism: minting a virtual id is a pure function of
/// its stage index and component parts.
proptest! {
    #[test]
    fn p6_virtual_id_is_a_pure_function_of_its_parts(stage in 0usize..8, upstream in 0u64..1000, element in 0usize..50) {
        let a = RowId::virtual_id(stage, &[&RowId::physical(upstream).to_string(), &element.to_string()]);
        let b = RowId::virtual_id(stage, &[&RowId::physical(upstream).to_string(), &element.to_string()]);
        prop_assert_eq!(a, b);
    }
}

/// P7 — Dimension consistency: after an arbitrary add/remove burst, a
/// dimension's value map reflects exactly the currently live records.
proptest! {
    #[test]
    fn p7_dimension_matches_live_records(
        adds in prop::collection::vec(-30i64..30, 1..25),
        remove_every in 1usize..5,
    ) {
        let mut engine = Engine::default();
        // Forces eager dimension construction on "n" via a sort stage.
        let handle = engine
            .compile(vec![Stage::Sort(vec![rivulet::SortKey {
                field: "n".into(),
                direction: rivulet::SortDirection::Ascending,
            }])])
            .unwrap();

        let mut live: HashMap<RowId, i64> = HashMap::new();
        for (index, v) in adds.iter().enumerate() {
            let id = engine.add(record_with_n(*v));
            live.insert(id.clone(), *v);
            if index % remove_every == 0 {
                engine.remove(id.clone());
                live.remove(&id);
            }
        }

        let snapshot = engine.snapshot(handle).unwrap();
        let mut got: Vec<i64> = snapshot
            .into_iter()
            .map(|r| match r.get("n") {
                Some(Value::Int(n)) => *n,
                _ => unreachable!(),
            })
            .collect();
        let mut expected: Vec<i64> = live.values().copied().collect();
        got.sort();
        expected.sort();
        prop_assert_eq!(got, expected);

        let live_ids: HashSet<RowId> = live.keys().cloned().collect();
        prop_assert_eq!(live_ids.len(), live.len());
    }
}
