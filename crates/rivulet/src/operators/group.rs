//! The group operator (spec.md §4.5.4): incrementally maintained
//! accumulator registers keyed by group key, minting one virtual row id
//! per distinct key (I5: deterministic pure function of the key's value).

use std::collections::{BTreeMap, HashMap};

use rivulet_expr::{new_register, AccumulatorKind, CompiledExpr, EvalContext, Register};
use rivulet_repr::{Delta, Map, OrdKey, Record, RowId, Sign, Value};

use crate::operator::{EngineContext, Operator};

struct GroupState {
    virtual_id: RowId,
    members: Vec<RowId>,
    registers: Vec<Box<dyn Register>>,
}

impl std::fmt::Debug for GroupState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupState")
            .field("virtual_id", &self.virtual_id)
            .field("member_count", &self.members.len())
            .finish()
    }
}

/// The hashed-vs-ordered strategy only changes iteration/snapshot order;
/// both back the same incremental contract.
enum GroupMap {
    Hashed(HashMap<OrdKey, GroupState>),
    Ordered(BTreeMap<OrdKey, GroupState>),
}

impl GroupMap {
    fn get_mut(&mut self, key: &OrdKey) -> Option<&mut GroupState> {
        match self {
            GroupMap::Hashed(m) => m.get_mut(key),
            GroupMap::Ordered(m) => m.get_mut(key),
        }
    }

    fn insert(&mut self, key: OrdKey, state: GroupState) {
        match self {
            GroupMap::Hashed(m) => {
                m.insert(key, state);
            }
            GroupMap::Ordered(m) => {
                m.insert(key, state);
            }
        }
    }

    fn remove(&mut self, key: &OrdKey) -> Option<GroupState> {
        match self {
            GroupMap::Hashed(m) => m.remove(key),
            GroupMap::Ordered(m) => m.remove(key),
        }
    }

    fn values(&self) -> Box<dyn Iterator<Item = &GroupState> + '_> {
        match self {
            GroupMap::Hashed(m) => Box::new(m.values()),
            GroupMap::Ordered(m) => Box::new(m.values()),
        }
    }

    fn len(&self) -> usize {
        match self {
            GroupMap::Hashed(m) => m.len(),
            GroupMap::Ordered(m) => m.len(),
        }
    }

    /// `len / capacity` for the hashed variant; `None` for the ordered one
    /// (`BTreeMap` has no notion of probe length).
    fn hashed_load(&self) -> Option<f64> {
        match self {
            GroupMap::Hashed(m) if m.capacity() > 0 => Some(m.len() as f64 / m.capacity() as f64),
            GroupMap::Hashed(_) => Some(0.0),
            GroupMap::Ordered(_) => None,
        }
    }
}

impl std::fmt::Debug for GroupMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupMap::Hashed(m) => f.debug_map().entries(m.iter()).finish(),
            GroupMap::Ordered(m) => f.debug_map().entries(m.iter()).finish(),
        }
    }
}

#[derive(Debug)]
pub struct GroupOp {
    stage_index: usize,
    key: CompiledExpr,
    outputs: Vec<(String, AccumulatorKind, CompiledExpr)>,
    groups: GroupMap,
    by_virtual: HashMap<RowId, OrdKey>,
}

impl GroupOp {
    pub fn new(
        stage_index: usize,
        key: CompiledExpr,
        outputs: Vec<(String, AccumulatorKind, CompiledExpr)>,
        ordered: bool,
    ) -> GroupOp {
        GroupOp {
            stage_index,
            key,
            outputs,
            groups: if ordered {
                GroupMap::Ordered(BTreeMap::new())
            } else {
                GroupMap::Hashed(HashMap::new())
            },
            by_virtual: HashMap::new(),
        }
    }

    fn group_key(&self, record: &Record) -> Value {
        self.key.eval_record(record)
    }

    fn output_record(&self, state: &GroupState, key_value: &Value) -> Record {
        let mut fields = Map::new();
        fields.insert("_id".into(), key_value.clone());
        for ((name, _, _), register) in self.outputs.iter().zip(state.registers.iter()) {
            fields.insert(name.clone(), register.output());
        }
        Record::new(fields)
    }
}

impl Operator for GroupOp {
    fn on_add(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        let key_value = self.group_key(upstream_record);
        let key = OrdKey(key_value.clone());
        let ctx = EvalContext::new(upstream_record);

        if let Some(state) = self.groups.get_mut(&key) {
            state.members.push(row_id);
            for ((_, _, expr), register) in self.outputs.iter().zip(state.registers.iter_mut()) {
                let value = expr.eval(&ctx);
                register.apply(&value, Sign::Positive);
            }
            return vec![];
        }

        let virtual_id = RowId::virtual_id(self.stage_index, &[&key_value.stringify()]);
        let mut registers: Vec<Box<dyn Register>> = self
            .outputs
            .iter()
            .map(|(_, kind, _)| new_register(*kind))
            .collect();
        for ((_, _, expr), register) in self.outputs.iter().zip(registers.iter_mut()) {
            let value = expr.eval(&ctx);
            register.apply(&value, Sign::Positive);
        }
        self.groups.insert(
            key.clone(),
            GroupState {
                virtual_id: virtual_id.clone(),
                members: vec![row_id],
                registers,
            },
        );
        self.by_virtual.insert(virtual_id.clone(), key);
        vec![Delta::add(virtual_id)]
    }

    fn on_remove(&mut self, row_id: RowId, upstream_record: &Record, _ctx: &EngineContext) -> Vec<Delta> {
        let key_value = self.group_key(upstream_record);
        let key = OrdKey(key_value);
        let ctx = EvalContext::new(upstream_record);

        let Some(state) = self.groups.get_mut(&key) else {
            return vec![];
        };
        let Some(position) = state.members.iter().position(|m| *m == row_id) else {
            return vec![];
        };
        state.members.swap_remove(position);
        for ((_, _, expr), register) in self.outputs.iter().zip(state.registers.iter_mut()) {
            let value = expr.eval(&ctx);
            register.apply(&value, Sign::Negative);
        }

        if state.members.is_empty() {
            let removed = self.groups.remove(&key).expect("checked present above");
            self.by_virtual.remove(&removed.virtual_id);
            vec![Delta::remove(removed.virtual_id)]
        } else {
            vec![]
        }
    }

    fn snapshot(&self, _ctx: &EngineContext) -> Vec<RowId> {
        self.groups.values().map(|state| state.virtual_id.clone()).collect()
    }

    fn effective_record(&self, row_id: &RowId, _ctx: &EngineContext) -> Option<Record> {
        let key = self.by_virtual.get(row_id)?;
        let state = match &self.groups {
            GroupMap::Hashed(m) => m.get(key)?,
            GroupMap::Ordered(m) => m.get(key)?,
        };
        Some(self.output_record(state, &key.0))
    }

    fn group_len(&self) -> Option<usize> {
        Some(self.groups.len())
    }

    fn hashed_group_load(&self) -> Option<f64> {
        self.groups.hashed_load()
    }
}
