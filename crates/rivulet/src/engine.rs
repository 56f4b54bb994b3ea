//! The engine driver (spec.md §4.6): owns the store, the dimension
//! registry, the plan cache, and one compiled operator chain per
//! registered pipeline. Every public operation is synchronous and runs to
//! completion before returning (§5 "Scheduling model").

use std::collections::HashMap;

use rivulet_expr::Compiler;
use rivulet_repr::{Delta, PhysicalId, Record, RowId, Sign};
use rivulet_transform::{Plan, PlannedStage, Planner, Stage};
use tracing::{debug, debug_span, trace};

use crate::config::EngineConfig;
use crate::dimension::DimensionRegistry;
use crate::error::EngineError;
use crate::operator::{EngineContext, Operator};
use crate::operators::{
    FilterOp, FilterReshapeOp, GroupOp, JoinOp, LimitOp, ReshapeOp, SkipOp, SortOp, TopKOp, UnwindOp,
};
use crate::reshape::{CompiledReshape, ReshapeMode};
use crate::statistics::EngineStatistics;
use crate::store::RecordStore;

/// Opaque handle to one compiled pipeline, returned by [`Engine::compile`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PlanHandle(u64);

/// A record-level delta for [`Engine::apply_delta`]: unlike the internal
/// [`Delta`] (which carries a row id and sign against already-stored
/// content), this carries the record content for an add.
#[derive(Clone, Debug, PartialEq)]
pub enum RecordDelta {
    Add(Record),
    Remove(RowId),
}

struct PlanState {
    plan: Plan,
    runtime: Vec<Box<dyn Operator>>,
}

/// Depth-first delta propagation through one plan's operator chain
/// (spec.md §5 "Ordering"): each delta a stage emits is drained fully
/// before the next queued delta is processed. Slicing `runtime` at the
/// current stage index gives a `(before, rest)` split so `rest[0]` can be
/// borrowed mutably while `before` is reborrowed immutably into the
/// [`EngineContext`] passed to it.
fn propagate(
    runtime: &mut [Box<dyn Operator>],
    store: &RecordStore,
    dimensions: &DimensionRegistry,
    stage_index: usize,
    deltas: Vec<Delta>,
) {
    if stage_index >= runtime.len() {
        return;
    }
    for delta in deltas {
        let (before, rest) = runtime.split_at_mut(stage_index);
        let ctx = EngineContext::new(store, dimensions, before);
        let Some(upstream_record) = ctx.resolve(&delta.row_id) else {
            continue;
        };
        let op = &mut rest[0];
        let next = match delta.sign {
            Sign::Positive => op.on_add(delta.row_id.clone(), &upstream_record, &ctx),
            Sign::Negative => op.on_remove(delta.row_id.clone(), &upstream_record, &ctx),
        };
        propagate(runtime, store, dimensions, stage_index + 1, next);
    }
}

/// Renders every stage of a plan into a fresh, unpopulated operator chain.
fn render_runtime(plan: &Plan, compiler: &Compiler) -> Vec<Box<dyn Operator>> {
    plan.stages
        .iter()
        .enumerate()
        .map(|(index, stage)| render_stage(index, stage, compiler))
        .collect()
}

/// Feeds a `+1` delta for every currently live record through `runtime`,
/// in physical-id order. Used both to backfill a newly compiled plan and,
/// for a non-incrementally-maintainable plan, to re-derive its output from
/// scratch on every `snapshot` call.
fn replay_live_set(runtime: &mut [Box<dyn Operator>], store: &RecordStore, dimensions: &DimensionRegistry) {
    let live_ids: Vec<PhysicalId> = store.iter_live().collect();
    for physical_id in live_ids {
        propagate(runtime, store, dimensions, 0, vec![Delta::add(RowId::Physical(physical_id))]);
    }
}

/// Renders one [`PlannedStage`] into its boxed [`Operator`]. Every
/// expression here was already compiled once during `Planner::validate`,
/// so a second compile failure would indicate an engine bug, not bad
/// input — `expect` is appropriate.
fn render_stage(stage_index: usize, stage: &PlannedStage, compiler: &Compiler) -> Box<dyn Operator> {
    match stage {
        PlannedStage::Filter { predicate } => {
            let predicate = compiler
                .compile_predicate(predicate.clone())
                .expect("planner already validated this predicate");
            Box::new(FilterOp::new(predicate))
        }
        PlannedStage::Reshape(spec) => {
            let reshape = CompiledReshape::compile(ReshapeMode::Project, spec, compiler)
                .expect("planner already validated this reshape");
            Box::new(ReshapeOp::new(reshape))
        }
        PlannedStage::AddFields(spec) => {
            let reshape = CompiledReshape::compile(ReshapeMode::AddFields, spec, compiler)
                .expect("planner already validated this reshape");
            Box::new(ReshapeOp::new(reshape))
        }
        PlannedStage::FilterReshape { predicate, reshape } => {
            let predicate = compiler
                .compile_predicate(predicate.clone())
                .expect("planner already validated this predicate");
            let reshape = CompiledReshape::compile(ReshapeMode::Project, reshape, compiler)
                .expect("planner already validated this reshape");
            Box::new(FilterReshapeOp::new(predicate, reshape))
        }
        PlannedStage::Group { key, outputs, strategy } => {
            let key = compiler
                .compile_expr(key.clone())
                .expect("planner already validated this group key");
            let outputs = outputs
                .iter()
                .map(|(name, kind, expr)| {
                    let expr = compiler
                        .compile_expr(expr.clone())
                        .expect("planner already validated this group output");
                    (name.clone(), *kind, expr)
                })
                .collect();
            let ordered = matches!(strategy, rivulet_transform::GroupStrategy::Ordered);
            Box::new(GroupOp::new(stage_index, key, outputs, ordered))
        }
        PlannedStage::Sort(keys) => Box::new(SortOp::new(keys.clone(), compiler)),
        PlannedStage::TopK { sort, k } => Box::new(TopKOp::new(sort.clone(), *k, compiler)),
        PlannedStage::Limit(k) => Box::new(LimitOp::new(*k)),
        PlannedStage::Skip(n) => Box::new(SkipOp::new(*n)),
        PlannedStage::Unwind(field) => Box::new(UnwindOp::new(stage_index, field.clone())),
        PlannedStage::Join(join) => Box::new(JoinOp::new(
            &join.foreign,
            join.local_field.clone(),
            join.foreign_field.clone(),
            join.output_field.clone(),
        )),
    }
}

/// The embeddable incremental aggregation engine (spec.md §1 overview).
///
/// Not `Sync`: every method takes `&mut self` or reads state that is only
/// safe to share with callers already serializing access to one instance.
pub struct Engine {
    store: RecordStore,
    dimensions: DimensionRegistry,
    config: EngineConfig,
    planner: Planner,
    plans: HashMap<u64, PlanState>,
    plan_cache: Vec<(String, u64)>,
    next_plan_id: u64,
}

impl Default for Engine {
    fn default() -> Engine {
        Engine::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Engine {
        Engine {
            store: RecordStore::new(),
            dimensions: DimensionRegistry::new(),
            config,
            planner: Planner::new(),
            plans: HashMap::new(),
            plan_cache: Vec::new(),
            next_plan_id: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stores `record`, updates every dimension it touches, then feeds a
    /// `+1` delta through every registered plan's chain.
    pub fn add(&mut self, record: Record) -> RowId {
        let physical_id = self.store.add(record.clone());
        let row_id = RowId::Physical(physical_id);
        self.dimensions.on_add(row_id.clone(), &record);
        trace!(row_id = %row_id, "add");

        let store = &self.store;
        let dimensions = &self.dimensions;
        for plan_state in self.plans.values_mut() {
            propagate(&mut plan_state.runtime, store, dimensions, 0, vec![Delta::add(row_id.clone())]);
        }
        row_id
    }

    pub fn add_many(&mut self, records: Vec<Record>) -> Vec<RowId> {
        records.into_iter().map(|record| self.add(record)).collect()
    }

    /// Tombstones `row_id` in the store and propagates a `-1` through
    /// every plan. Returns `false` (never an error, per spec.md §7) if the
    /// row id was never live.
    pub fn remove(&mut self, row_id: RowId) -> bool {
        let Some(physical_id) = row_id.as_physical() else {
            return false;
        };
        if !self.store.remove(physical_id) {
            return false;
        }
        self.dimensions.on_remove(&row_id);
        trace!(row_id = %row_id, "remove");

        let store = &self.store;
        let dimensions = &self.dimensions;
        for plan_state in self.plans.values_mut() {
            propagate(&mut plan_state.runtime, store, dimensions, 0, vec![Delta::remove(row_id.clone())]);
        }
        true
    }

    pub fn remove_many(&mut self, row_ids: Vec<RowId>) -> usize {
        row_ids.into_iter().filter(|id| self.remove(id.clone())).count()
    }

    /// Looks up an already-compiled plan for an identical pipeline, or
    /// builds, validates, renders, and backfills a new one from the
    /// current live-set (spec.md §4.6 "late compiles see existing data").
    pub fn compile(&mut self, pipeline: Vec<Stage>) -> Result<PlanHandle, EngineError> {
        let canonical = format!("{pipeline:?}");
        if let Some((_, id)) = self.plan_cache.iter().find(|(key, _)| *key == canonical) {
            return Ok(PlanHandle(*id));
        }

        let plan = {
            let span = debug_span!("optimize");
            let _guard = span.enter();
            self.planner.plan(pipeline)?
        };

        if self.config.eager_dimensions {
            for field in plan.dimension_fields.clone() {
                self.backfill_dimension(&field);
            }
        }

        let compiler = Compiler::new();
        let runtime = render_runtime(&plan, &compiler);

        let id = self.next_plan_id;
        self.next_plan_id += 1;
        let mut plan_state = PlanState { plan, runtime };
        replay_live_set(&mut plan_state.runtime, &self.store, &self.dimensions);

        debug!(plan_id = %id, stage_count = %plan_state.plan.stages.len(), "compiled plan");
        self.plans.insert(id, plan_state);
        self.plan_cache.push((canonical, id));
        Ok(PlanHandle(id))
    }

    /// Backfills a newly referenced dimension from the current live-set;
    /// a no-op if the dimension already exists.
    fn backfill_dimension(&mut self, field: &str) {
        if self.dimensions.get(field).is_some() {
            return;
        }
        self.dimensions.ensure(field);
        let live_ids: Vec<PhysicalId> = self.store.iter_live().collect();
        let Some(dimension) = self.dimensions.get_mut(field) else {
            return;
        };
        for physical_id in live_ids {
            if let Some(record) = self.store.get(physical_id) {
                if let Some(value) = record.get_path(dimension.field()) {
                    dimension.set(RowId::Physical(physical_id), value.clone());
                }
            }
        }
    }

    /// Materializes the terminal operator's current snapshot into records,
    /// in the order the terminal stage defines.
    ///
    /// A fully incremental plan (spec.md §4.4 "can_increment"/
    /// "can_decrement") reads off the chain `add`/`remove` have already
    /// maintained. A plan a live-subpipeline join taints non-incremental
    /// (rule 5) cannot trust that chain — nothing keeps it consistent with
    /// the subpipeline's own changes — so instead it falls back to the
    /// whole-collection executor (spec.md §1, I4): a throwaway operator
    /// chain, replayed from the current live-set from scratch, discarded
    /// once this call returns.
    pub fn snapshot(&self, handle: PlanHandle) -> Result<Vec<Record>, EngineError> {
        let plan_state = self.plans.get(&handle.0).ok_or(EngineError::UnknownPlan(handle.0))?;
        if plan_state.plan.is_fully_incremental() {
            return Ok(self.snapshot_runtime(&plan_state.runtime));
        }
        let compiler = Compiler::new();
        let mut runtime = render_runtime(&plan_state.plan, &compiler);
        replay_live_set(&mut runtime, &self.store, &self.dimensions);
        Ok(self.snapshot_runtime(&runtime))
    }

    fn snapshot_runtime(&self, runtime: &[Box<dyn Operator>]) -> Vec<Record> {
        let Some((last, rest)) = runtime.split_last() else {
            return self.store.iter_live().filter_map(|id| self.store.get(id).cloned()).collect();
        };
        let upstream_ctx = EngineContext::new(&self.store, &self.dimensions, rest);
        let row_ids = last.snapshot(&upstream_ctx);

        let full_ctx = EngineContext::new(&self.store, &self.dimensions, runtime);
        row_ids.into_iter().filter_map(|id| full_ctx.resolve(&id)).collect()
    }

    /// Applies a record-level delta to the store, then returns the
    /// current view of one plan (spec.md §6 "convenience").
    pub fn apply_delta(&mut self, delta: RecordDelta, handle: PlanHandle) -> Result<Vec<Record>, EngineError> {
        match delta {
            RecordDelta::Add(record) => {
                self.add(record);
            }
            RecordDelta::Remove(row_id) => {
                self.remove(row_id);
            }
        }
        self.snapshot(handle)
    }

    pub fn statistics(&self) -> EngineStatistics {
        let group_operators: Vec<&Box<dyn Operator>> = self
            .plans
            .values()
            .flat_map(|plan_state| plan_state.runtime.iter())
            .filter(|op| op.group_len().is_some())
            .collect();
        let active_groups = group_operators.iter().filter_map(|op| op.group_len()).sum();
        let hashed_loads: Vec<f64> = group_operators.iter().filter_map(|op| op.hashed_group_load()).collect();
        let average_hashed_group_probe_length = if hashed_loads.is_empty() {
            0.0
        } else {
            hashed_loads.iter().sum::<f64>() / hashed_loads.len() as f64
        };
        let fusions = self
            .plans
            .values()
            .fold(rivulet_transform::FusionCounters::default(), |mut acc, plan_state| {
                acc.filter_reshape_fusions += plan_state.plan.fusions.filter_reshape_fusions;
                acc.top_k_fusions += plan_state.plan.fusions.top_k_fusions;
                acc.dedup_removed += plan_state.plan.fusions.dedup_removed;
                acc.predicate_pushdowns += plan_state.plan.fusions.predicate_pushdowns;
                acc
            });
        EngineStatistics {
            total_records: self.store.total_count(),
            live_records: self.store.live_count(),
            dimensions_built: self.dimensions.len(),
            active_groups,
            compiled_plan_count: self.plans.len(),
            average_hashed_group_probe_length,
            fusions,
        }
    }

    /// Drops every record, dimension, and compiled plan (spec.md §5
    /// "the only reclamation point").
    pub fn clear(&mut self) {
        self.store.clear();
        self.dimensions = DimensionRegistry::new();
        self.plans.clear();
        self.plan_cache.clear();
        self.next_plan_id = 0;
    }
}

#[cfg(test)]
mod tests {
    use rivulet_expr::{AccumulatorKind, ScalarExpr, ScalarOp};
    use rivulet_repr::{Map, Value};
    use rivulet_transform::Stage;

    use super::*;

    fn record(name: &str, age: i64) -> Record {
        let mut fields = Map::new();
        fields.insert("name".into(), Value::String(name.into()));
        fields.insert("age".into(), Value::Int(age));
        Record::new(fields)
    }

    #[test]
    fn filters_incrementally_on_add_and_remove() {
        let mut engine = Engine::default();
        let pipeline = vec![Stage::filter(ScalarExpr::call(
            ScalarOp::Gt,
            vec![ScalarExpr::field("age"), ScalarExpr::lit(18i64)],
        ))];
        let handle = engine.compile(pipeline).unwrap();

        let adult = engine.add(record("asha", 30));
        engine.add(record("kai", 10));
        let snapshot = engine.snapshot(handle).unwrap();
        assert_eq!(snapshot.len(), 1);

        engine.remove(adult);
        let snapshot = engine.snapshot(handle).unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn late_compile_backfills_from_existing_live_set() {
        let mut engine = Engine::default();
        engine.add(record("asha", 30));
        engine.add(record("kai", 40));

        let pipeline = vec![Stage::filter(ScalarExpr::call(
            ScalarOp::Gt,
            vec![ScalarExpr::field("age"), ScalarExpr::lit(0i64)],
        ))];
        let handle = engine.compile(pipeline).unwrap();
        assert_eq!(engine.snapshot(handle).unwrap().len(), 2);
    }

    #[test]
    fn identical_pipelines_share_one_compiled_plan() {
        let mut engine = Engine::default();
        let pipeline = || vec![Stage::filter(ScalarExpr::call(ScalarOp::Eq, vec![ScalarExpr::field("age"), ScalarExpr::lit(1i64)]))];
        let a = engine.compile(pipeline()).unwrap();
        let b = engine.compile(pipeline()).unwrap();
        assert_eq!(a, b);
        assert_eq!(engine.statistics().compiled_plan_count, 1);
    }

    #[test]
    fn group_sum_stays_consistent_through_add_and_remove() {
        let mut engine = Engine::default();
        let pipeline = vec![Stage::group(
            ScalarExpr::field("name"),
            vec![("total_age".to_string(), AccumulatorKind::Sum, ScalarExpr::field("age"))],
        )];
        let handle = engine.compile(pipeline).unwrap();

        engine.add(record("asha", 30));
        let second = engine.add(record("asha", 12));
        let snapshot = engine.snapshot(handle).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].get("total_age"), Some(&Value::Float(42.0)));

        engine.remove(second);
        let snapshot = engine.snapshot(handle).unwrap();
        assert_eq!(snapshot[0].get("total_age"), Some(&Value::Float(30.0)));
    }

    #[test]
    fn clear_drops_every_plan_and_record() {
        let mut engine = Engine::default();
        let handle = engine.compile(vec![]).unwrap();
        engine.add(record("asha", 30));
        engine.clear();
        assert_eq!(engine.statistics().total_records, 0);
        assert!(engine.snapshot(handle).is_err());
    }
}
