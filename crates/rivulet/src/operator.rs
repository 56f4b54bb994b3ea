//! The operator contract shared by every stage kind (spec.md §4.0).
//!
//! An operator never blocks, owns only the state it needs to reverse its
//! own contribution to the output, and resolves the record it operates on
//! through [`EngineContext`] rather than holding a reference to the store
//! or to sibling operators directly. The engine driver chains operators by
//! slicing the running `Vec<Box<dyn Operator>>` at the current stage so
//! that `effective_record` walks strictly upstream.

use rivulet_repr::{Delta, Record, RowId};

use crate::dimension::DimensionRegistry;
use crate::store::RecordStore;

/// Everything an operator needs to resolve the effective record for a row
/// id at the output of the stage immediately before it, or to ask that
/// stage for its current snapshot.
#[derive(Clone, Copy)]
pub struct EngineContext<'a> {
    pub store: &'a RecordStore,
    pub dimensions: &'a DimensionRegistry,
    upstream_stages: &'a [Box<dyn Operator>],
}

impl<'a> EngineContext<'a> {
    pub fn new(
        store: &'a RecordStore,
        dimensions: &'a DimensionRegistry,
        upstream_stages: &'a [Box<dyn Operator>],
    ) -> EngineContext<'a> {
        EngineContext {
            store,
            dimensions,
            upstream_stages,
        }
    }

    fn for_prefix(&self, len: usize) -> EngineContext<'a> {
        EngineContext {
            store: self.store,
            dimensions: self.dimensions,
            upstream_stages: &self.upstream_stages[..len],
        }
    }

    /// Resolves the effective record for `row_id` as seen immediately
    /// upstream of this stage: the most recent upstream stage that reshapes
    /// or mints that row id wins; a row id no stage claims falls back to a
    /// direct physical lookup in the store.
    pub fn resolve(&self, row_id: &RowId) -> Option<Record> {
        for i in (0..self.upstream_stages.len()).rev() {
            let prefix = self.for_prefix(i);
            if let Some(record) = self.upstream_stages[i].effective_record(row_id, &prefix) {
                return Some(record);
            }
        }
        match row_id {
            RowId::Physical(id) => self.store.get(*id).cloned(),
            RowId::Virtual(_) => None,
        }
    }

    /// True when this stage has no upstream operator — the dimension index
    /// is only guaranteed to mirror the raw store record at this point.
    pub fn is_first_stage(&self) -> bool {
        self.upstream_stages.is_empty()
    }

    /// The row ids currently live at the output of the stage immediately
    /// before this one (or the store's live-set, for the first stage).
    pub fn upstream_snapshot(&self) -> Vec<RowId> {
        match self.upstream_stages.split_last() {
            Some((last, rest)) => {
                let prefix = EngineContext {
                    store: self.store,
                    dimensions: self.dimensions,
                    upstream_stages: rest,
                };
                last.snapshot(&prefix)
            }
            None => self.store.iter_live().map(RowId::Physical).collect(),
        }
    }
}

/// The common operations every stage kind implements (spec.md §4.0).
pub trait Operator: std::fmt::Debug {
    /// `upstream_record` is the effective record at the output of the
    /// preceding stage for `row_id`; the caller guarantees it is visible in
    /// the store/upstream state before calling.
    fn on_add(&mut self, row_id: RowId, upstream_record: &Record, ctx: &EngineContext) -> Vec<Delta>;

    /// The caller guarantees `row_id` was previously added; implementations
    /// must be idempotent against a double remove (return empty).
    fn on_remove(&mut self, row_id: RowId, upstream_record: &Record, ctx: &EngineContext) -> Vec<Delta>;

    /// Row ids currently in this stage's output, in the order the stage
    /// defines (most stages: unspecified; sort/top-K/limit: defined order).
    fn snapshot(&self, ctx: &EngineContext) -> Vec<RowId>;

    /// `Some` when this stage reshapes or mints `row_id`'s record; `None`
    /// signals the caller to keep walking upstream.
    fn effective_record(&self, row_id: &RowId, ctx: &EngineContext) -> Option<Record>;

    /// Active group count, for stages that maintain one (spec.md §6
    /// "active groups" diagnostic). `None` for every stage but `Group`.
    fn group_len(&self) -> Option<usize> {
        None
    }

    /// Load factor (`len / capacity`) of the stage's hashed group map, used
    /// as a lightweight proxy for average probe length since
    /// `std::collections::HashMap` does not expose actual probe depth.
    /// `None` for every stage but a hash-strategy `Group`.
    fn hashed_group_load(&self) -> Option<f64> {
        None
    }
}
