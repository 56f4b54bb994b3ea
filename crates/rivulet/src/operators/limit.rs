//! The limit operator (spec.md §4.5.6): forwards only the first `k` rows
//! of the upstream order. Rather than tracking a separate pending queue,
//! every add/remove recomputes the first `k` of the current upstream
//! snapshot and diffs it against what was last forwarded — this gives the
//! "promote a pending eligible record on removal" behavior for free,
//! since the recompute naturally picks up whatever row now occupies slot
//! `k` once the departing row's slot opens up.

use std::collections::HashSet;

use rivulet_repr::{Delta, Record, RowId};

use crate::operator::{EngineContext, Operator};

#[derive(Debug)]
pub struct LimitOp {
    k: usize,
    forwarded: Vec<RowId>,
}

impl LimitOp {
    pub fn new(k: usize) -> LimitOp {
        LimitOp { k, forwarded: Vec::new() }
    }

    fn recompute(&mut self, ctx: &EngineContext) -> Vec<Delta> {
        let next: Vec<RowId> = ctx.upstream_snapshot().into_iter().take(self.k).collect();
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

impl Operator for LimitOp {
    fn on_add(&mut self, _row_id: RowId, _upstream_record: &Record, ctx: &EngineContext) -> Vec<Delta> {
        self.recompute(ctx)
    }

    fn on_remove(&mut self, _row_id: RowId, _upstream_record: &Record, ctx: &EngineContext) -> Vec<Delta> {
        self.recompute(ctx)
    }

    fn snapshot(&self, ctx: &EngineContext) -> Vec<RowId> {
        ctx.upstream_snapshot().into_iter().take(self.k).collect()
    }

    fn effective_record(&self, _row_id: &RowId, _ctx: &EngineContext) -> Option<Record> {
        None
    }
}
