// Copyright the rivulet authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! An embeddable, in-process incremental aggregation engine for schemaless
//! records (spec.md §1).
//!
//! A caller builds a [`Record`] store by calling [`Engine::add`] and
//! [`Engine::remove`], compiles one or more pipelines with
//! [`Engine::compile`], and reads each pipeline's current result set with
//! [`Engine::snapshot`]. Every mutation is propagated through every
//! compiled pipeline's operator chain before the call returns, so a
//! snapshot taken immediately after an `add`/`remove` always reflects it.
//!
//! Pipeline construction (`Stage`, `ScalarExpr`, `AccumulatorKind`, ...)
//! lives in [`rivulet_transform`] and [`rivulet_expr`]; this crate only
//! re-exports the handful of types a caller needs without reaching into
//! those crates directly.

mod config;
mod dimension;
mod engine;
mod error;
mod operator;
mod operators;
mod reshape;
mod statistics;
mod store;

pub use config::EngineConfig;
pub use engine::{Engine, PlanHandle, RecordDelta};
pub use error::EngineError;
pub use statistics::EngineStatistics;

pub use rivulet_expr::{AccumulatorKind, ScalarExpr, ScalarOp};
pub use rivulet_repr::{Delta, PhysicalId, Record, RowId, Sign, Value};
pub use rivulet_transform::{FieldSpec, JoinForeign, JoinSpec, SortDirection, SortKey, Stage};
