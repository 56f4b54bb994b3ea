//! The filter operator (spec.md §4.5.1): stateless pass/drop against a
//! compiled predicate, with a dimension-probe fast path at the first
//! stage of a pipeline.

use rivulet_expr::{CompiledPredicate, EvalContext, ScalarOp};
use rivulet_repr::{Delta, Record, RowId};

use crate::operator::{EngineContext, Operator};

#[derive(Debug)]
pub struct FilterOp {
    predicate: CompiledPredicate,
}

impl FilterOp {
    pub fn new(predicate: CompiledPredicate) -> FilterOp {
        FilterOp { predicate }
    }

    fn test(&self, record: &Record) -> bool {
        self.predicate.test(&EvalContext::new(record))
    }
}

impl Operator for FilterOp {
    fn on_add(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        if self.test(upstream_record) {
            vec![Delta::add(row_id)]
        } else {
            vec![]
        }
    }

    fn on_remove(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        if self.test(upstream_record) {
            vec![Delta::remove(row_id)]
        } else {
            vec![]
        }
    }

    fn snapshot(&self, ctx: &EngineContext) -> Vec<RowId> {
        if let Some(hint) = &self.predicate.probe_hint {
            if ctx.is_first_stage() {
                if let Some(rows) = self.probe(ctx, hint) {
                    return rows;
                }
            }
        }
        ctx.upstream_snapshot()
            .into_iter()
            .filter(|row_id| ctx.resolve(row_id).is_some_and(|record| self.test(&record)))
            .collect()
    }

    fn effective_record(&self, _row_id: &RowId, _ctx: &EngineContext) -> Option<Record> {
        None
    }
}

impl FilterOp {
    fn probe(
        &self,
        ctx: &EngineContext,
        hint: &rivulet_expr::ProbeHint,
    ) -> Option<Vec<RowId>> {
        let dimension = ctx.dimensions.get(&hint.field)?;
        let rows = match hint.op {
            ScalarOp::Eq => dimension.rows_with_value(&hint.literal).to_vec(),
            ScalarOp::Gt => dimension.rows_greater_than(&hint.literal, false),
            ScalarOp::Gte => dimension.rows_greater_than(&hint.literal, true),
            ScalarOp::Lt => dimension.rows_less_than(&hint.literal, false),
            ScalarOp::Lte => dimension.rows_less_than(&hint.literal, true),
            ScalarOp::Ne => return None,
            _ => return None,
        };
        Some(rows)
    }
}

#[cfg(test)]
mod tests {
    use rivulet_expr::{Compiler, ScalarExpr};
    use rivulet_repr::{Map, Value};

    use super::*;
    use crate::dimension::DimensionRegistry;
    use crate::store::RecordStore;

    fn compiled_gt_age_18() -> CompiledPredicate {
        let compiler = Compiler::new();
        compiler
            .compile_predicate(ScalarExpr::call(
                ScalarOp::Gt,
                vec![ScalarExpr::field("age"), ScalarExpr::lit(18i64)],
            ))
            .unwrap()
    }

    #[test]
    fn forwards_matching_and_drops_non_matching() {
        let mut op = FilterOp::new(compiled_gt_age_18());
        let store = RecordStore::new();
        let dims = DimensionRegistry::new();
        let ctx = EngineContext::new(&store, &dims, &[]);

        let mut adult = Map::new();
        adult.insert("age".into(), Value::Int(30));
        let adult = Record::new(adult);
        assert_eq!(op.on_add(RowId::physical(0), &adult, &ctx), vec![Delta::add(RowId::physical(0))]);

        let mut minor = Map::new();
        minor.insert("age".into(), Value::Int(10));
        let minor = Record::new(minor);
        assert!(op.on_add(RowId::physical(1), &minor, &ctx).is_empty());
    }
}
