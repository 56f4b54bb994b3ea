//! The filter+reshape fusion (spec.md §4.4 rule 3): evaluates the
//! predicate and, on a pass, the projection, in one pass. Membership is
//! tracked by the reshape cache itself, so a second `on_remove` for the
//! same row id is naturally idempotent.

use std::collections::HashMap;

use rivulet_expr::{CompiledPredicate, EvalContext};
use rivulet_repr::{Delta, Record, RowId};

use crate::operator::{EngineContext, Operator};
use crate::reshape::CompiledReshape;

#[derive(Debug)]
pub struct FilterReshapeOp {
    predicate: CompiledPredicate,
    reshape: CompiledReshape,
    cache: HashMap<RowId, Record>,
}

impl FilterReshapeOp {
    pub fn new(predicate: CompiledPredicate, reshape: CompiledReshape) -> FilterReshapeOp {
        FilterReshapeOp {
            predicate,
            reshape,
            cache: HashMap::new(),
        }
    }

    fn test(&self, record: &Record) -> bool {
        self.predicate.test(&EvalContext::new(record))
    }
}

impl Operator for FilterReshapeOp {
    fn on_add(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        if !self.test(upstream_record) {
            return vec![];
        }
        let reshaped = self.reshape.apply(upstream_record);
        self.cache.insert(row_id.clone(), reshaped);
        vec![Delta::add(row_id)]
    }

    fn on_remove(&mut self, row_id: RowId, _upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        if self.cache.remove(&row_id).is_some() {
            vec![Delta::remove(row_id)]
        } else {
            vec![]
        }
    }

    fn snapshot(&self, ctx: &EngineContext) -> Vec<RowId> {
        ctx.upstream_snapshot()
            .into_iter()
            .filter(|row_id| ctx.resolve(row_id).is_some_and(|record| self.test(&record)))
            .collect()
    }

    fn effective_record(&self, row_id: &RowId, _ctx: &EngineContext) -> Option<Record> {
        self.cache.get(row_id).cloned()
    }
}
