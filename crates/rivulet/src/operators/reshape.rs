//! The reshape and add-fields operators (spec.md §4.5.2, §4.5.3): both
//! cache the reshaped record keyed by upstream row id, invalidated on
//! upstream remove, and forward the same row id 1:1.

use std::collections::HashMap;

use rivulet_repr::{Delta, Record, RowId};

use crate::operator::{EngineContext, Operator};
use crate::reshape::CompiledReshape;

#[derive(Debug)]
pub struct ReshapeOp {
    reshape: CompiledReshape,
    cache: HashMap<RowId, Record>,
}

impl ReshapeOp {
    pub fn new(reshape: CompiledReshape) -> ReshapeOp {
        ReshapeOp {
            reshape,
            cache: HashMap::new(),
        }
    }
}

impl Operator for ReshapeOp {
    fn on_add(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
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
    }

    fn effective_record(&self, row_id: &RowId, _ctx: &EngineContext) -> Option<Record> {
        self.cache.get(row_id).cloned()
    }
}
