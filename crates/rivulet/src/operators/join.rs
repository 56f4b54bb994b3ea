//! The left-outer equality join (spec.md §4.5.8): a probe index built once
//! over a frozen foreign collection, keyed by the foreign field's value.
//! Every upstream row is forwarded regardless of match (left-outer), with
//! the matches attached as an array under `output_field`.
//!
//! A subpipeline-backed foreign collection already taints the plan
//! non-incremental during planning; this operator does not attempt to
//! execute that subpipeline itself; it joins against an empty probe index
//! until a later full re-execution path (outside this crate's scope)
//! supplies one.

use std::collections::HashMap;

use rivulet_repr::{Delta, Map, OrdKey, Record, RowId, Value};
use rivulet_transform::JoinForeign;

use crate::operator::{EngineContext, Operator};

#[derive(Debug)]
pub struct JoinOp {
    local_field: String,
    foreign_field: String,
    output_field: String,
    probe: HashMap<OrdKey, Vec<Record>>,
    cache: HashMap<RowId, Record>,
}

impl JoinOp {
    pub fn new(foreign: &JoinForeign, local_field: String, foreign_field: String, output_field: String) -> JoinOp {
        let mut probe: HashMap<OrdKey, Vec<Record>> = HashMap::new();
        if let JoinForeign::Frozen(rows) = foreign {
            for row in rows.iter() {
                if let Some(value) = row.get(&foreign_field) {
                    probe.entry(OrdKey(value.clone())).or_default().push(row.clone());
                }
            }
        }
        JoinOp { local_field, foreign_field, output_field, probe, cache: HashMap::new() }
    }

    fn matches_for(&self, upstream_record: &Record) -> Vec<Record> {
        match upstream_record.get(&self.local_field) {
            Some(value) => self.probe.get(&OrdKey(value.clone())).cloned().unwrap_or_default(),
            None => Vec::new(),
        }
    }

    fn attach(&self, upstream_record: &Record, matches: Vec<Record>) -> Record {
        let mut fields = upstream_record.fields().clone();
        let matches = matches
            .into_iter()
            .map(|record| Value::Map(record.into_fields()))
            .collect();
        fields.insert(self.output_field.clone(), Value::Array(matches));
        Record::new(fields)
    }
}

impl Operator for JoinOp {
    fn on_add(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        let matches = self.matches_for(upstream_record);
        let joined = self.attach(upstream_record, matches);
        self.cache.insert(row_id.clone(), joined);
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

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::dimension::DimensionRegistry;
    use crate::store::RecordStore;

    fn foreign_row(id: i64, label: &str) -> Record {
        let mut fields = Map::new();
        fields.insert("id".into(), Value::Int(id));
        fields.insert("label".into(), Value::String(label.into()));
        Record::new(fields)
    }

    fn local_row(foreign_id: i64) -> Record {
        let mut fields = Map::new();
        fields.insert("fk".into(), Value::Int(foreign_id));
        Record::new(fields)
    }

    #[test]
    fn attaches_matches_and_forwards_unmatched_rows() {
        let foreign = JoinForeign::Frozen(Arc::new(vec![foreign_row(1, "a"), foreign_row(1, "b")]));
        let mut op = JoinOp::new(&foreign, "fk".into(), "id".into(), "matches".into());
        let store = RecordStore::new();
        let dims = DimensionRegistry::new();
        let ctx = EngineContext::new(&store, &dims, &[]);

        op.on_add(RowId::physical(0), &local_row(1), &ctx);
        let effective = op.effective_record(&RowId::physical(0), &ctx).unwrap();
        let Value::Array(matches) = effective.get("matches").unwrap() else {
            panic!("expected array");
        };
        assert_eq!(matches.len(), 2);

        op.on_add(RowId::physical(1), &local_row(99), &ctx);
        let effective = op.effective_record(&RowId::physical(1), &ctx).unwrap();
        assert_eq!(effective.get("matches"), Some(&Value::Array(vec![])));
    }
}
