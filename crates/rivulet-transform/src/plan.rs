//! The planner's output: an ordered list of planned stages plus the
//! incremental-maintainability flags and dimension field set the engine
//! driver needs before it can render operators (spec.md §4.4, §3
//! "Compiled Pipeline").

use std::collections::BTreeSet;

use rivulet_expr::{AccumulatorKind, ScalarExpr};
use serde::{Deserialize, Serialize};

use crate::stage::{JoinSpec, ReshapeSpec, SortKey};

/// Whether the group operator should use a hash table keyed by group key,
/// or an ordered (sorted) structure — spec.md §4.4 "chooses between
/// hash-based group and ordered group by a threshold".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GroupStrategy {
    Hashed,
    Ordered,
}

/// A single planned stage. Fused variants (`FilterReshape`, `TopK`) do not
/// appear in the caller's input pipeline; they are produced by the
/// planner's fusion rule.
#[derive(Clone, Debug)]
pub enum PlannedStage {
    Filter {
        predicate: ScalarExpr,
    },
    Reshape(ReshapeSpec),
    AddFields(ReshapeSpec),
    FilterReshape {
        predicate: ScalarExpr,
        reshape: ReshapeSpec,
    },
    Group {
        key: ScalarExpr,
        outputs: Vec<(String, AccumulatorKind, ScalarExpr)>,
        strategy: GroupStrategy,
    },
    Sort(Vec<SortKey>),
    TopK {
        sort: Vec<SortKey>,
        k: usize,
    },
    Limit(usize),
    Skip(usize),
    Unwind(String),
    Join(JoinSpec),
}

impl PlannedStage {
    pub fn kind_name(&self) -> &'static str {
        match self {
            PlannedStage::Filter { .. } => "filter",
            PlannedStage::Reshape(_) => "reshape",
            PlannedStage::AddFields(_) => "add_fields",
            PlannedStage::FilterReshape { .. } => "filter_reshape",
            PlannedStage::Group { .. } => "group",
            PlannedStage::Sort(_) => "sort",
            PlannedStage::TopK { .. } => "top_k",
            PlannedStage::Limit(_) => "limit",
            PlannedStage::Skip(_) => "skip",
            PlannedStage::Unwind(_) => "unwind",
            PlannedStage::Join(_) => "join",
        }
    }
}

/// Counters for which fusion/rewrite rules fired, surfaced through
/// `Engine::statistics()` (spec.md §6 "counters for planned fusions
/// applied").
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionCounters {
    pub filter_reshape_fusions: usize,
    pub top_k_fusions: usize,
    pub dedup_removed: usize,
    pub predicate_pushdowns: usize,
}

/// A rough, data-free cardinality estimate for one stage's output, used
/// only to pick the group strategy (spec.md §4.4).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CardinalityEstimate(pub f64);

/// The planner's output for one pipeline.
#[derive(Clone, Debug)]
pub struct Plan {
    pub stages: Vec<PlannedStage>,
    pub can_increment: bool,
    pub can_decrement: bool,
    pub dimension_fields: BTreeSet<String>,
    pub cardinality_estimates: Vec<CardinalityEstimate>,
    pub fusions: FusionCounters,
}

impl Plan {
    pub fn is_fully_incremental(&self) -> bool {
        self.can_increment && self.can_decrement
    }
}
