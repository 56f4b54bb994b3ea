//! Literal end-to-end scenarios (spec.md §8 "End-to-end scenarios with
//! literal inputs", S1–S6).

use std::sync::Arc;

use rivulet::{Engine, RecordDelta};
use rivulet_expr::{AccumulatorKind, ScalarExpr, ScalarOp};
use rivulet_repr::{Map, Value};
use rivulet_transform::{FieldSpec, JoinForeign, JoinSpec, ReshapeSpec, SortDirection, SortKey, Stage};

fn record(pairs: &[(&str, Value)]) -> rivulet_repr::Record {
    let mut fields = Map::new();
    for (k, v) in pairs {
        fields.insert((*k).to_string(), v.clone());
    }
    rivulet_repr::Record::new(fields)
}

/// S1 — filter + reshape fusion.
#[test]
fn s1_filter_reshape_fusion() {
    let mut engine = Engine::default();
    let pipeline = vec![
        Stage::filter(ScalarExpr::call(ScalarOp::Gt, vec![ScalarExpr::field("a"), ScalarExpr::lit(1i64)])),
        Stage::Reshape(ReshapeSpec::new(vec![FieldSpec::Computed(
            "doubled".into(),
            ScalarExpr::call(ScalarOp::Multiply, vec![ScalarExpr::field("b"), ScalarExpr::lit(2i64)]),
        )])),
    ];
    let handle = engine.compile(pipeline).unwrap();

    engine.add(record(&[("a", Value::Int(1)), ("b", Value::Int(10))]));
    engine.add(record(&[("a", Value::Int(2)), ("b", Value::Int(20))]));
    engine.add(record(&[("a", Value::Int(3)), ("b", Value::Int(30))]));

    let mut snapshot = engine.snapshot(handle).unwrap();
    snapshot.sort_by(|a, b| a.get("doubled").unwrap().stringify().cmp(&b.get("doubled").unwrap().stringify()));
    assert_eq!(snapshot.len(), 2);
    assert_eq!(snapshot[0].get("doubled"), Some(&Value::Float(40.0)));
    assert_eq!(snapshot[1].get("doubled"), Some(&Value::Float(60.0)));
}

/// S2 — group with incremental remove.
#[test]
fn s2_group_with_incremental_remove() {
    let mut engine = Engine::default();
    let pipeline = vec![Stage::group(
        ScalarExpr::field("k"),
        vec![
            ("total".to_string(), AccumulatorKind::Sum, ScalarExpr::field("v")),
            ("count".to_string(), AccumulatorKind::Count, ScalarExpr::field("v")),
        ],
    )];
    let handle = engine.compile(pipeline).unwrap();

    engine.add(record(&[("k", Value::String("x".into())), ("v", Value::Int(1))]));
    let id1 = engine.add(record(&[("k", Value::String("x".into())), ("v", Value::Int(2))]));
    engine.add(record(&[("k", Value::String("y".into())), ("v", Value::Int(4))]));

    let mut snapshot = engine.snapshot(handle).unwrap();
    snapshot.sort_by(|a, b| a.get("_id").unwrap().stringify().cmp(&b.get("_id").unwrap().stringify()));
    assert_eq!(snapshot[0].get("total"), Some(&Value::Float(3.0)));
    assert_eq!(snapshot[0].get("count"), Some(&Value::Int(2)));
    assert_eq!(snapshot[1].get("total"), Some(&Value::Float(4.0)));
    assert_eq!(snapshot[1].get("count"), Some(&Value::Int(1)));

    engine.remove(id1);
    let mut snapshot = engine.snapshot(handle).unwrap();
    snapshot.sort_by(|a, b| a.get("_id").unwrap().stringify().cmp(&b.get("_id").unwrap().stringify()));
    assert_eq!(snapshot[0].get("total"), Some(&Value::Float(1.0)));
    assert_eq!(snapshot[0].get("count"), Some(&Value::Int(1)));
    assert_eq!(snapshot[1].get("total"), Some(&Value::Float(4.0)));
}

/// S3 — sort + limit fuses into top-K.
#[test]
fn s3_sort_limit_fuses_into_top_k() {
    let mut engine = Engine::default();
    let pipeline = vec![
        Stage::Sort(vec![SortKey { field: "s".into(), direction: SortDirection::Descending }]),
        Stage::Limit(3),
    ];
    let handle = engine.compile(pipeline).unwrap();

    let mut ids: Vec<i64> = (0..1000).collect();
    // Arbitrary (non-sorted) insertion order.
    ids.sort_by_key(|i| (i * 37) % 1000);
    for i in ids {
        engine.add(record(&[("s", Value::Int(i))]));
    }

    let snapshot = engine.snapshot(handle).unwrap();
    let values: Vec<&Value> = snapshot.iter().map(|r| r.get("s").unwrap()).collect();
    assert_eq!(values, vec![&Value::Int(999), &Value::Int(998), &Value::Int(997)]);
}

/// S4 — unwind mints deterministic virtual ids on re-compile: two fresh
/// engines fed the same record through the same pipeline end up with
/// identical virtual row ids for each element, since a virtual id is a
/// pure function of stage index, upstream row id, and element index.
#[test]
fn s4_unwind_determinism() {
    let xs = record(&[
        ("id", Value::Int(0)),
        ("xs", Value::Array(vec![Value::String("a".into()), Value::String("b".into()), Value::String("c".into())])),
    ]);

    // A fresh engine assigns the first record physical id 0, and the sole
    // stage is index 0, so `RowId::virtual_id(0, [row_id, element_index])`
    // mints the same triple of ids on both runs below (unwind.rs exercises
    // the id formula directly; this checks the visible consequence of it).
    for _ in 0..2 {
        let mut engine = Engine::default();
        let handle = engine.compile(vec![Stage::unwind("xs")]).unwrap();
        engine.add(xs.clone());
        let snapshot = engine.snapshot(handle).unwrap();
        assert_eq!(snapshot.len(), 3);
        let values: Vec<&Value> = snapshot.iter().map(|r| r.get("xs").unwrap()).collect();
        assert_eq!(
            values,
            vec![&Value::String("a".into()), &Value::String("b".into()), &Value::String("c".into())]
        );
    }
}

/// S5 — left-outer equality join.
#[test]
fn s5_left_outer_join() {
    let mut engine = Engine::default();
    let foreign = Arc::new(vec![
        record(&[("fk", Value::Int(1)), ("n", Value::String("one".into()))]),
        record(&[("fk", Value::Int(1)), ("n", Value::String("uno".into()))]),
        record(&[("fk", Value::Int(3)), ("n", Value::String("three".into()))]),
    ]);
    let pipeline = vec![Stage::Join(JoinSpec {
        foreign: JoinForeign::Frozen(foreign),
        local_field: "k".into(),
        foreign_field: "fk".into(),
        output_field: "matches".into(),
    })];
    let handle = engine.compile(pipeline).unwrap();

    engine.add(record(&[("k", Value::Int(1))]));
    engine.add(record(&[("k", Value::Int(2))]));

    let mut snapshot = engine.snapshot(handle).unwrap();
    snapshot.sort_by(|a, b| a.get("k").unwrap().stringify().cmp(&b.get("k").unwrap().stringify()));

    let Value::Array(matches) = snapshot[0].get("matches").unwrap() else {
        panic!("expected array");
    };
    assert_eq!(matches.len(), 2);
    assert_eq!(snapshot[1].get("matches"), Some(&Value::Array(vec![])));
}

/// S6 — a subpipeline-backed join taints the plan non-incremental, so
/// `snapshot` takes the whole-collection fallback path: a fresh operator
/// chain replayed over the live-set on every call instead of reading the
/// incrementally-maintained one. Executing the live subpipeline itself is
/// out of scope (join.rs documents this), so every local row still
/// forwards with an empty `matches` array standing in for the unexecuted
/// foreign side — but the replay is real, not a stale incremental read.
#[test]
fn s6_non_incremental_join_falls_back_without_crashing() {
    let planner = rivulet_transform::Planner::new();
    let plan = planner
        .plan(vec![Stage::Join(JoinSpec {
            foreign: JoinForeign::Subpipeline(7),
            local_field: "k".into(),
            foreign_field: "fk".into(),
            output_field: "matches".into(),
        })])
        .unwrap();
    assert!(!plan.can_increment);
    assert!(!plan.can_decrement);

    let mut engine = Engine::default();
    let pipeline = vec![Stage::Join(JoinSpec {
        foreign: JoinForeign::Subpipeline(7),
        local_field: "k".into(),
        foreign_field: "fk".into(),
        output_field: "matches".into(),
    })];
    let handle = engine.compile(pipeline).unwrap();
    let added = engine.add(record(&[("k", Value::Int(1))]));
    let snapshot = engine.snapshot(handle).unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].get("matches"), Some(&Value::Array(vec![])));

    let after = engine.apply_delta(RecordDelta::Remove(added), handle).unwrap();
    assert!(after.is_empty());
}
