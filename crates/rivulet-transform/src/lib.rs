// Copyright the rivulet authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Pipeline planning and rewrite rules (spec.md §4.4).
//!
//! A caller builds a [`Stage`] sequence and hands it to [`Planner::plan`],
//! which canonicalizes synonym stages, pushes filters past reshapes they
//! don't depend on, fuses adjacent stages the engine can render as a single
//! operator, drops redundant adjacent duplicates, and determines whether
//! the resulting [`Plan`] can be maintained incrementally in either
//! direction.

mod error;
mod plan;
mod planner;
mod stage;

pub use error::PlanError;
pub use plan::{CardinalityEstimate, FusionCounters, GroupStrategy, Plan, PlannedStage};
pub use planner::Planner;
pub use stage::{FieldSpec, JoinForeign, JoinSpec, ReshapeSpec, SortDirection, SortKey, Stage};
