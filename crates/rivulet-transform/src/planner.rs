//! Rewrites a caller-supplied pipeline shape into a [`Plan`] the engine can
//! render into operators, applying the rewrite rules of spec.md §4.4:
//!
//! 1. canonicalize synonym stages (`set` is rewritten to `add_fields`),
//! 2. push filters past a reshape/add_fields they don't depend on,
//! 3. fuse filter+reshape into one operator, and sort+limit into a top-K,
//! 4. drop an adjacent stage that exactly repeats the one before it,
//! 5. taint the plan non-incremental when a join draws from a live
//!    subpipeline rather than a frozen snapshot.
//!
//! Rules 1, 2 and 4 operate on the stage list and are applied to a fixpoint
//! before rule 3 (fusion) and the final conversion into [`PlannedStage`]s,
//! an "apply until no stage changes" loop.

use std::collections::BTreeSet;

use rivulet_expr::{Compiler, ScalarExpr};

use crate::error::PlanError;
use crate::plan::{CardinalityEstimate, FusionCounters, GroupStrategy, Plan, PlannedStage};
use crate::stage::{JoinForeign, Stage};

#[derive(Default)]
pub struct Planner {
    compiler: Compiler,
}

impl Planner {
    pub fn new() -> Planner {
        Planner {
            compiler: Compiler::new(),
        }
    }

    pub fn plan(&self, pipeline: Vec<Stage>) -> Result<Plan, PlanError> {
        let mut stages = pipeline;
        canonicalize(&mut stages);

        let mut fusions = FusionCounters::default();
        loop {
            let pushed = push_down_filters(&mut stages);
            let deduped = dedup_adjacent(&mut stages);
            fusions.predicate_pushdowns += pushed;
            fusions.dedup_removed += deduped;
            if pushed == 0 && deduped == 0 {
                break;
            }
        }

        self.validate(&stages)?;

        let can_decrement = !stages.iter().any(is_non_incremental_join);
        let can_increment = can_decrement;

        let dimension_fields = collect_dimension_fields(&stages);

        let (planned, fusion_delta) = fuse_and_convert(stages);
        fusions.filter_reshape_fusions += fusion_delta.filter_reshape_fusions;
        fusions.top_k_fusions += fusion_delta.top_k_fusions;

        let cardinality_estimates = planned.iter().map(|_| CardinalityEstimate(1.0)).collect();

        Ok(Plan {
            stages: planned,
            can_increment,
            can_decrement,
            dimension_fields,
            cardinality_estimates,
            fusions,
        })
    }

    fn validate(&self, stages: &[Stage]) -> Result<(), PlanError> {
        for (index, stage) in stages.iter().enumerate() {
            match stage {
                Stage::Filter(expr) => {
                    self.compiler
                        .compile_predicate(expr.clone())
                        .map_err(|source| PlanError::Expr {
                            index,
                            kind: "filter",
                            source,
                        })?;
                }
                Stage::Reshape(spec) | Stage::AddFields(spec) | Stage::Set(spec) => {
                    for field in spec.computed_fields() {
                        let expr = spec
                            .fields
                            .iter()
                            .find_map(|f| match f {
                                crate::stage::FieldSpec::Computed(name, expr) if name == field => {
                                    Some(expr)
                                }
                                _ => None,
                            })
                            .expect("computed_fields only yields Computed entries");
                        self.compiler
                            .compile_expr(expr.clone())
                            .map_err(|source| PlanError::Expr {
                                index,
                                kind: "reshape",
                                source,
                            })?;
                    }
                }
                Stage::Group { key, outputs } => {
                    self.compiler
                        .compile_expr(key.clone())
                        .map_err(|source| PlanError::Expr {
                            index,
                            kind: "group key",
                            source,
                        })?;
                    for (_, _, expr) in outputs {
                        self.compiler
                            .compile_expr(expr.clone())
                            .map_err(|source| PlanError::Expr {
                                index,
                                kind: "group output",
                                source,
                            })?;
                    }
                }
                Stage::Sort(_) | Stage::Limit(_) | Stage::Skip(_) => {}
                Stage::Unwind(field) => {
                    if field.is_empty() {
                        return Err(PlanError::EmptyUnwindField { index });
                    }
                }
                Stage::Join(join) => {
                    if join.local_field.is_empty()
                        || join.foreign_field.is_empty()
                        || join.output_field.is_empty()
                    {
                        return Err(PlanError::EmptyJoinField { index });
                    }
                }
            }
        }
        Ok(())
    }
}

fn canonicalize(stages: &mut [Stage]) {
    for stage in stages.iter_mut() {
        if let Stage::Set(spec) = stage {
            *stage = Stage::AddFields(std::mem::take(spec));
        }
    }
}

/// Moves a `Filter` stage ahead of an immediately preceding `Reshape`/
/// `AddFields` stage when doing so cannot change which fields the filter
/// sees. Returns the number of swaps performed.
///
/// The safety condition differs by mode. `add_fields` preserves every input
/// field except the ones it computes or excludes, so a filter is safe to
/// push past it as long as the filter doesn't depend on those. `reshape`
/// (Project mode) is the opposite: it *drops* every field not explicitly
/// named, so a filter is only safe to push past it when every dependency is
/// one of the fields reshape passes through unchanged (spec.md §4.4 rule 2
/// "fields that reshape preserves unchanged").
fn push_down_filters(stages: &mut [Stage]) -> usize {
    let mut swaps = 0;
    for i in 0..stages.len().saturating_sub(1) {
        let safe = match (&stages[i], &stages[i + 1]) {
            (Stage::Reshape(spec), Stage::Filter(predicate)) => {
                let mut deps = BTreeSet::new();
                predicate.field_dependencies(&mut deps);
                let preserved: BTreeSet<&str> = spec.included_fields().collect();
                deps.iter().all(|d| preserved.contains(d.as_str()))
            }
            (Stage::AddFields(spec), Stage::Filter(predicate)) => {
                let mut deps = BTreeSet::new();
                predicate.field_dependencies(&mut deps);
                let unsafe_fields: BTreeSet<&str> =
                    spec.computed_fields().chain(spec.excluded_fields()).collect();
                deps.iter().all(|d| !unsafe_fields.contains(d.as_str()))
            }
            _ => false,
        };
        if safe {
            stages.swap(i, i + 1);
            swaps += 1;
        }
    }
    swaps
}

fn dedup_adjacent(stages: &mut Vec<Stage>) -> usize {
    let mut removed = 0;
    let mut i = 1;
    while i < stages.len() {
        if stages[i] == stages[i - 1] {
            stages.remove(i);
            removed += 1;
        } else {
            i += 1;
        }
    }
    removed
}

fn is_non_incremental_join(stage: &Stage) -> bool {
    matches!(
        stage,
        Stage::Join(join) if matches!(join.foreign, JoinForeign::Subpipeline(_))
    )
}

fn collect_dimension_fields(stages: &[Stage]) -> BTreeSet<String> {
    let mut fields = BTreeSet::new();
    for stage in stages {
        match stage {
            Stage::Filter(expr) => extract_probeable_field(expr, &mut fields),
            Stage::Sort(keys) => {
                for key in keys {
                    fields.insert(key.field.clone());
                }
            }
            Stage::Join(join) => {
                fields.insert(join.local_field.clone());
            }
            _ => {}
        }
    }
    fields
}

fn extract_probeable_field(expr: &ScalarExpr, out: &mut BTreeSet<String>) {
    if let ScalarExpr::Call(_, args) = expr {
        for arg in args {
            if let ScalarExpr::Field(path) = arg {
                out.insert(path.clone());
            }
        }
    }
}

fn fuse_and_convert(stages: Vec<Stage>) -> (Vec<PlannedStage>, FusionCounters) {
    let mut planned = Vec::with_capacity(stages.len());
    let mut fusions = FusionCounters::default();
    let mut iter = stages.into_iter().peekable();

    while let Some(stage) = iter.next() {
        match stage {
            Stage::Filter(predicate) => {
                let fused = matches!(iter.peek(), Some(Stage::Reshape(_)));
                if fused {
                    if let Some(Stage::Reshape(reshape)) = iter.next() {
                        fusions.filter_reshape_fusions += 1;
                        planned.push(PlannedStage::FilterReshape { predicate, reshape });
                        continue;
                    }
                }
                planned.push(PlannedStage::Filter { predicate });
            }
            Stage::Sort(keys) => {
                let fused = matches!(iter.peek(), Some(Stage::Limit(_)));
                if fused {
                    if let Some(Stage::Limit(k)) = iter.next() {
                        fusions.top_k_fusions += 1;
                        planned.push(PlannedStage::TopK { sort: keys, k });
                        continue;
                    }
                }
                planned.push(PlannedStage::Sort(keys));
            }
            Stage::Reshape(spec) => planned.push(PlannedStage::Reshape(spec)),
            Stage::AddFields(spec) | Stage::Set(spec) => planned.push(PlannedStage::AddFields(spec)),
            Stage::Group { key, outputs } => {
                let strategy = if matches!(key, ScalarExpr::Field(_)) {
                    GroupStrategy::Ordered
                } else {
                    GroupStrategy::Hashed
                };
                planned.push(PlannedStage::Group {
                    key,
                    outputs,
                    strategy,
                });
            }
            Stage::Limit(k) => planned.push(PlannedStage::Limit(k)),
            Stage::Skip(n) => planned.push(PlannedStage::Skip(n)),
            Stage::Unwind(field) => planned.push(PlannedStage::Unwind(field)),
            Stage::Join(join) => planned.push(PlannedStage::Join(join)),
        }
    }

    (planned, fusions)
}

#[cfg(test)]
mod tests {
    use rivulet_expr::ScalarOp;

    use super::*;
    use crate::stage::{FieldSpec, ReshapeSpec, SortDirection, SortKey};

    #[test]
    fn canonicalizes_set_to_add_fields() {
        let planner = Planner::new();
        let pipeline = vec![Stage::Set(ReshapeSpec::new(vec![FieldSpec::Computed(
            "total".into(),
            ScalarExpr::lit(1i64),
        )]))];
        let plan = planner.plan(pipeline).unwrap();
        assert!(matches!(plan.stages[0], PlannedStage::AddFields(_)));
    }

    #[test]
    fn pushes_filter_before_project_reshape_when_field_is_included() {
        let planner = Planner::new();
        let pipeline = vec![
            Stage::Reshape(ReshapeSpec::new(vec![
                FieldSpec::Include("age".into()),
                FieldSpec::Computed("total".into(), ScalarExpr::lit(1i64)),
            ])),
            Stage::Filter(ScalarExpr::call(
                ScalarOp::Gt,
                vec![ScalarExpr::field("age"), ScalarExpr::lit(18i64)],
            )),
        ];
        let plan = planner.plan(pipeline).unwrap();
        // The filter only depends on a field the reshape explicitly passes
        // through, so it moves ahead of the reshape and the pair fuses into
        // one operator.
        assert_eq!(plan.stages.len(), 1);
        assert!(matches!(plan.stages[0], PlannedStage::FilterReshape { .. }));
        assert_eq!(plan.fusions.predicate_pushdowns, 1);
        assert_eq!(plan.fusions.filter_reshape_fusions, 1);
    }

    #[test]
    fn does_not_push_dependent_filter() {
        let planner = Planner::new();
        let pipeline = vec![
            Stage::Reshape(ReshapeSpec::new(vec![FieldSpec::Computed(
                "total".into(),
                ScalarExpr::lit(1i64),
            )])),
            Stage::Filter(ScalarExpr::call(
                ScalarOp::Gt,
                vec![ScalarExpr::field("total"), ScalarExpr::lit(0i64)],
            )),
        ];
        let plan = planner.plan(pipeline).unwrap();
        // The filter depends on a field the reshape computes, so it cannot
        // move ahead of the reshape and the two stages stay distinct.
        assert_eq!(plan.stages.len(), 2);
        assert!(matches!(plan.stages[0], PlannedStage::Reshape(_)));
        assert!(matches!(plan.stages[1], PlannedStage::Filter { .. }));
    }

    #[test]
    fn does_not_push_filter_past_project_reshape_that_drops_its_field() {
        let planner = Planner::new();
        let pipeline = vec![
            Stage::Reshape(ReshapeSpec::new(vec![FieldSpec::Include("name".into())])),
            Stage::Filter(ScalarExpr::call(
                ScalarOp::Gt,
                vec![ScalarExpr::field("age"), ScalarExpr::lit(18i64)],
            )),
        ];
        let plan = planner.plan(pipeline).unwrap();
        // "age" isn't in the reshape's include list, so the Project-mode
        // reshape already drops it — pushing the filter up would let it see
        // "age" on the raw record instead of correctly seeing it as absent.
        assert_eq!(plan.stages.len(), 2);
        assert!(matches!(plan.stages[0], PlannedStage::Reshape(_)));
        assert!(matches!(plan.stages[1], PlannedStage::Filter { .. }));
        assert_eq!(plan.fusions.predicate_pushdowns, 0);
    }

    #[test]
    fn pushes_filter_before_add_fields_when_independent() {
        let planner = Planner::new();
        let pipeline = vec![
            Stage::AddFields(ReshapeSpec::new(vec![FieldSpec::Computed(
                "total".into(),
                ScalarExpr::lit(1i64),
            )])),
            Stage::Filter(ScalarExpr::call(
                ScalarOp::Gt,
                vec![ScalarExpr::field("age"), ScalarExpr::lit(18i64)],
            )),
        ];
        let plan = planner.plan(pipeline).unwrap();
        // add_fields preserves every field it doesn't compute, so "age"
        // survives unchanged and the filter is safe to push ahead of it.
        assert_eq!(plan.stages.len(), 1);
        assert!(matches!(plan.stages[0], PlannedStage::FilterReshape { .. }));
        assert_eq!(plan.fusions.predicate_pushdowns, 1);
    }

    #[test]
    fn fuses_filter_then_reshape() {
        let planner = Planner::new();
        let pipeline = vec![
            Stage::Filter(ScalarExpr::call(
                ScalarOp::Gt,
                vec![ScalarExpr::field("age"), ScalarExpr::lit(18i64)],
            )),
            Stage::Reshape(ReshapeSpec::new(vec![FieldSpec::Include("name".into())])),
        ];
        let plan = planner.plan(pipeline).unwrap();
        assert_eq!(plan.stages.len(), 1);
        assert!(matches!(plan.stages[0], PlannedStage::FilterReshape { .. }));
        assert_eq!(plan.fusions.filter_reshape_fusions, 1);
    }

    #[test]
    fn fuses_sort_then_limit_into_top_k() {
        let planner = Planner::new();
        let pipeline = vec![
            Stage::Sort(vec![SortKey {
                field: "score".into(),
                direction: SortDirection::Descending,
            }]),
            Stage::Limit(10),
        ];
        let plan = planner.plan(pipeline).unwrap();
        assert_eq!(plan.stages.len(), 1);
        assert!(matches!(plan.stages[0], PlannedStage::TopK { k: 10, .. }));
    }

    #[test]
    fn dedups_identical_adjacent_stages() {
        let planner = Planner::new();
        let predicate = ScalarExpr::call(
            ScalarOp::Gt,
            vec![ScalarExpr::field("age"), ScalarExpr::lit(18i64)],
        );
        let pipeline = vec![Stage::Filter(predicate.clone()), Stage::Filter(predicate)];
        let plan = planner.plan(pipeline).unwrap();
        assert_eq!(plan.stages.len(), 1);
        assert_eq!(plan.fusions.dedup_removed, 1);
    }

    #[test]
    fn subpipeline_join_taints_plan_non_incremental() {
        let planner = Planner::new();
        let pipeline = vec![Stage::Join(crate::stage::JoinSpec {
            foreign: JoinForeign::Subpipeline(7),
            local_field: "customer_id".into(),
            foreign_field: "id".into(),
            output_field: "customer".into(),
        })];
        let plan = planner.plan(pipeline).unwrap();
        assert!(!plan.can_increment);
        assert!(!plan.can_decrement);
    }

    #[test]
    fn frozen_join_stays_incremental() {
        let planner = Planner::new();
        let pipeline = vec![Stage::Join(crate::stage::JoinSpec {
            foreign: JoinForeign::Frozen(std::sync::Arc::new(vec![])),
            local_field: "customer_id".into(),
            foreign_field: "id".into(),
            output_field: "customer".into(),
        })];
        let plan = planner.plan(pipeline).unwrap();
        assert!(plan.can_increment);
        assert!(plan.can_decrement);
    }

    #[test]
    fn rejects_bad_arity_filter() {
        let planner = Planner::new();
        let pipeline = vec![Stage::Filter(ScalarExpr::call(
            ScalarOp::Gt,
            vec![ScalarExpr::field("age")],
        ))];
        assert!(planner.plan(pipeline).is_err());
    }

    #[test]
    fn rejects_empty_unwind_field() {
        let planner = Planner::new();
        let pipeline = vec![Stage::Unwind(String::new())];
        assert!(matches!(
            planner.plan(pipeline),
            Err(PlanError::EmptyUnwindField { index: 0 })
        ));
    }
}
