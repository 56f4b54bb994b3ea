//! The unwind operator (spec.md §4.5.7): mints one virtual row per element
//! of an upstream array field, keeping the element count the upstream row
//! produced so a remove can mint and retire the exact same virtual ids
//! without re-reading the (now gone) upstream record.

use std::collections::HashMap;

use rivulet_repr::{Delta, Record, RowId, Value};

use crate::operator::{EngineContext, Operator};

#[derive(Debug)]
pub struct UnwindOp {
    stage_index: usize,
    field: String,
    emitted: HashMap<RowId, usize>,
    cache: HashMap<RowId, Record>,
}

impl UnwindOp {
    pub fn new(stage_index: usize, field: String) -> UnwindOp {
        UnwindOp { stage_index, field, emitted: HashMap::new(), cache: HashMap::new() }
    }

    fn element_id(&self, row_id: &RowId, index: usize) -> RowId {
        RowId::virtual_id(self.stage_index, &[&row_id.to_string(), &index.to_string()])
    }
}

impl Operator for UnwindOp {
    fn on_add(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        let Some(Value::Array(items)) = upstream_record.get(&self.field) else {
            return vec![];
        };
        let mut deltas = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let virtual_id = self.element_id(&row_id, index);
            let mut fields = upstream_record.fields().clone();
            fields.insert(self.field.clone(), item.clone());
            self.cache.insert(virtual_id.clone(), Record::new(fields));
            deltas.push(Delta::add(virtual_id));
        }
        self.emitted.insert(row_id, items.len());
        deltas
    }

    fn on_remove(&mut self, row_id: RowId, _upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        let Some(count) = self.emitted.remove(&row_id) else {
            return vec![];
        };
        (0..count)
            .map(|index| {
                let virtual_id = self.element_id(&row_id, index);
                self.cache.remove(&virtual_id);
                Delta::remove(virtual_id)
            })
            .collect()
    }

    fn snapshot(&self, _ctx: &EngineContext) -> Vec<RowId> {
        self.cache.keys().cloned().collect()
    }

    fn effective_record(&self, row_id: &RowId, _ctx: &EngineContext) -> Option<Record> {
        self.cache.get(row_id).cloned()
    }
}
