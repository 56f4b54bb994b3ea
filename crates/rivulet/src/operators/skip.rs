//! The skip operator (spec.md §4.5.6): drops the first `k` rows of the
//! upstream order and forwards the rest. Symmetric to [`super::limit`]:
//! every add/remove recomputes the tail of the current upstream snapshot
//! and diffs it against what was last forwarded.

use std::collections::HashSet;

use rivulet_repr::{Delta, Record, RowId};

use crate::operator::{EngineContext, Operator};

#[derive(Debug)]
pub struct SkipOp {
    k: usize,
    forwarded: Vec<RowId>,
}

impl SkipOp {
    pub fn new(k: usize) -> SkipOp {
        SkipOp { k, forwarded: Vec::new() }
    }

    fn recompute(&mut self, ctx: &EngineContext) -> Vec<Delta> {
        let next: Vec<RowId> = ctx.upstream_snapshot().into_iter().skip(self.k).collect();
        let before: HashSet<&RowId> = self.forwarded.iter().collect();
        let after: HashSet<&RowId> = next.iter().collect();
        let mut deltas: Vec<Delta> = before
            .difference(&after)
            .map(|id| Delta::remove((*id).clone()))
            .collect();
        deltas.extend(after.difference(&before).map(|id| Delta::add((*id).clone())));
        self.forwarded = next;
        deltas
    }
}

impl Operator for SkipOp {
    fn on_add(&mut self, _row_id: RowId, _upstream_record: &Record, ctx: &EngineContext) -> Vec<Delta> {
        self.recompute(ctx)
    }

    fn on_remove(&mut self, _row_id: RowId, _upstream_record: &Record, ctx: &EngineContext) -> Vec<Delta> {
        self.recompute(ctx)
    }

    fn snapshot(&self, ctx: &EngineContext) -> Vec<RowId> {
        ctx.upstream_snapshot().into_iter().skip(self.k).collect()
    }

    fn effective_record(&self, _row_id: &RowId, _ctx: &EngineContext) -> Option<Record> {
        None
    }
}
