//! The pipeline shape the planner consumes (spec.md §6 "Pipeline shape
//! consumed"): an ordered sequence of tagged stage variants, built directly
//! by the caller rather than parsed from a surface grammar.

use std::sync::Arc;

use rivulet_expr::{AccumulatorKind, ScalarExpr};
use rivulet_repr::Record;

/// Sort direction for a single compound-key component (spec.md §4.5.5).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// One field of a `reshape`/`add_fields` spec: keep an input field
/// unchanged, drop it, or compute a new/overwritten value for it
/// (spec.md §4.5.2, §4.5.3).
#[derive(Clone, Debug, PartialEq)]
pub enum FieldSpec {
    Include(String),
    Exclude(String),
    Computed(String, ScalarExpr),
}

#[derive(Clone, Debug, PartialEq, Default)]
pub struct ReshapeSpec {
    pub fields: Vec<FieldSpec>,
}

impl ReshapeSpec {
    pub fn new(fields: Vec<FieldSpec>) -> ReshapeSpec {
        ReshapeSpec { fields }
    }

    /// Field names this reshape computes or overwrites — the set a
    /// downstream-but-pushed-up filter must not depend on (spec.md §4.4
    /// rule 2).
    pub fn computed_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|f| match f {
            FieldSpec::Computed(name, _) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Field names this reshape drops — also unsafe for a pushed-up filter
    /// to depend on, since after pushdown the filter would run upstream of
    /// the drop and see a field that reshape would otherwise have removed
    /// (irrelevant to correctness of the filter itself, but tracked for
    /// symmetry with `computed_fields` when reasoning about `add_fields`,
    /// which never drops fields).
    pub fn excluded_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|f| match f {
            FieldSpec::Exclude(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Field names this reshape passes through unchanged. In Project mode
    /// (`reshape`) this is the *only* safe set for a pushed-up filter to
    /// depend on, since every field not named here is dropped — unlike
    /// AddFields mode, where everything but `computed_fields`/
    /// `excluded_fields` survives untouched.
    pub fn included_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().filter_map(|f| match f {
            FieldSpec::Include(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// Whether a join's foreign collection is a frozen snapshot (incrementally
/// maintainable, spec.md §4.5.8) or the result of a live subpipeline (not
/// incrementally maintainable; taints the plan per spec.md §4.4 rule 5).
#[derive(Clone, Debug, PartialEq)]
pub enum JoinForeign {
    Frozen(Arc<Vec<Record>>),
    Subpipeline(u64),
}

#[derive(Clone, Debug, PartialEq)]
pub struct JoinSpec {
    pub foreign: JoinForeign,
    pub local_field: String,
    pub foreign_field: String,
    pub output_field: String,
}

/// One stage of an uncompiled pipeline (spec.md §6).
#[derive(Clone, Debug, PartialEq)]
pub enum Stage {
    Filter(ScalarExpr),
    Reshape(ReshapeSpec),
    AddFields(ReshapeSpec),
    /// `set` is a synonym for `add_fields` (spec.md §4.4 rule 1); kept as a
    /// distinct variant so `canonicalize` has a real rewrite to perform.
    Set(ReshapeSpec),
    Group {
        key: ScalarExpr,
        outputs: Vec<(String, AccumulatorKind, ScalarExpr)>,
    },
    Sort(Vec<SortKey>),
    Limit(usize),
    Skip(usize),
    Unwind(String),
    Join(JoinSpec),
}

impl Stage {
    pub fn filter(predicate: ScalarExpr) -> Stage {
        Stage::Filter(predicate)
    }

    pub fn group(key: ScalarExpr, outputs: Vec<(String, AccumulatorKind, ScalarExpr)>) -> Stage {
        Stage::Group { key, outputs }
    }

    pub fn unwind(field: impl Into<String>) -> Stage {
        Stage::Unwind(field.into())
    }
}
