//! The sort operator and its top-K fusion (spec.md §4.5.5): a compound-key
//! comparator over compiled key expressions, with row id as the final
//! tie-break so equal keys still produce a deterministic, stable order
//! (P5). Top-K tracks the same ordering but only forwards membership in
//! the first `k` rows, emitting an evict/admit pair when a new row
//! displaces the current boundary.

use std::cmp::Ordering;
use std::collections::HashSet;

use rivulet_expr::CompiledExpr;
use rivulet_repr::{compare_values, Delta, Record, RowId, Value};
use rivulet_transform::{SortDirection, SortKey};

use crate::operator::{EngineContext, Operator};

fn compare_keys(a: &[Value], b: &[Value], directions: &[SortDirection]) -> Ordering {
    for ((x, y), direction) in a.iter().zip(b.iter()).zip(directions.iter()) {
        let ordering = compare_values(x, y);
        let ordering = match direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compiled_keys(keys: &[SortKey], compiler: &rivulet_expr::Compiler) -> Vec<(CompiledExpr, SortDirection)> {
    keys.iter()
        .map(|key| {
            let expr = compiler
                .compile_expr(rivulet_expr::ScalarExpr::field(key.field.clone()))
                .expect("sort key field path always compiles");
            (expr, key.direction)
        })
        .collect()
}

struct SortedRows {
    keys: Vec<(CompiledExpr, SortDirection)>,
    entries: Vec<(RowId, Vec<Value>)>,
}

impl std::fmt::Debug for SortedRows {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SortedRows").field("len", &self.entries.len()).finish()
    }
}

impl SortedRows {
    fn new(keys: Vec<(CompiledExpr, SortDirection)>) -> SortedRows {
        SortedRows { keys, entries: Vec::new() }
    }

    fn key_values(&self, record: &Record) -> Vec<Value> {
        self.keys.iter().map(|(expr, _)| expr.eval_record(record)).collect()
    }

    fn directions(&self) -> Vec<SortDirection> {
        self.keys.iter().map(|(_, direction)| *direction).collect()
    }

    /// Comparator for the full entry, with row id as the final tie-break so
    /// the sorted position is unique regardless of key collisions.
    fn compare_entries(&self, a: &(RowId, Vec<Value>), b: &(RowId, Vec<Value>)) -> Ordering {
        let directions = self.directions();
        compare_keys(&a.1, &b.1, &directions).then_with(|| a.0.cmp(&b.0))
    }

    fn insert(&mut self, row_id: RowId, record: &Record) {
        let entry = (row_id, self.key_values(record));
        let index = self
            .entries
            .partition_point(|existing| self.compare_entries(existing, &entry) == Ordering::Less);
        self.entries.insert(index, entry);
    }

    fn remove(&mut self, row_id: &RowId, record: &Record) {
        let entry = (row_id.clone(), self.key_values(record));
        if let Ok(index) = self
            .entries
            .binary_search_by(|existing| self.compare_entries(existing, &entry))
        {
            self.entries.remove(index);
        } else if let Some(index) = self.entries.iter().position(|(id, _)| id == row_id) {
            // Falls back to a linear scan if the upstream record changed
            // shape between add and remove in a way that shifts its key.
            self.entries.remove(index);
        }
    }

    fn ids(&self) -> Vec<RowId> {
        self.entries.iter().map(|(id, _)| id.clone()).collect()
    }
}

/// Orders every upstream row by a compound key; never filters.
#[derive(Debug)]
pub struct SortOp {
    rows: SortedRows,
}

impl SortOp {
    pub fn new(keys: Vec<SortKey>, compiler: &rivulet_expr::Compiler) -> SortOp {
        SortOp { rows: SortedRows::new(compiled_keys(&keys, compiler)) }
    }
}

impl Operator for SortOp {
    fn on_add(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        self.rows.insert(row_id.clone(), upstream_record);
        vec![Delta::add(row_id)]
    }

    fn on_remove(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        self.rows.remove(&row_id, upstream_record);
        vec![Delta::remove(row_id)]
    }

    fn snapshot(&self, _ctx: &EngineContext) -> Vec<RowId> {
        self.rows.ids()
    }

    fn effective_record(&self, _row_id: &RowId, _ctx: &EngineContext) -> Option<Record> {
        None
    }
}

/// The sort+limit fusion (spec.md §4.4 rule 4): maintains the full sort
/// order internally but only forwards the first `k` row ids, emitting an
/// evict/admit pair whenever an insertion or removal shifts the boundary.
#[derive(Debug)]
pub struct TopKOp {
    rows: SortedRows,
    k: usize,
}

impl TopKOp {
    pub fn new(keys: Vec<SortKey>, k: usize, compiler: &rivulet_expr::Compiler) -> TopKOp {
        TopKOp { rows: SortedRows::new(compiled_keys(&keys, compiler)), k }
    }

    fn top_ids(&self) -> HashSet<RowId> {
        self.rows.entries.iter().take(self.k).map(|(id, _)| id.clone()).collect()
    }

    fn diff(&self, before: &HashSet<RowId>) -> Vec<Delta> {
        let after = self.top_ids();
        let mut deltas: Vec<Delta> = before
            .difference(&after)
            .cloned()
            .map(Delta::remove)
            .collect();
        deltas.extend(after.difference(before).cloned().map(Delta::add));
        deltas
    }
}

impl Operator for TopKOp {
    fn on_add(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        let before = self.top_ids();
        self.rows.insert(row_id, upstream_record);
        self.diff(&before)
    }

    fn on_remove(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        let before = self.top_ids();
        self.rows.remove(&row_id, upstream_record);
        self.diff(&before)
    }

    fn snapshot(&self, _ctx: &EngineContext) -> Vec<RowId> {
        self.rows.entries.iter().take(self.k).map(|(id, _)| id.clone()).collect()
    }

    fn effective_record(&self, _row_id: &RowId, _ctx: &EngineContext) -> Option<Record> {
        None
    }
}
