// Copyright the rivulet authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Shared value, record, row-id and delta vocabulary for the rivulet
//! incremental aggregation engine (spec.md §3 "Data Model").
//!
//! This crate has no knowledge of pipelines, operators, or expressions; it
//! only defines the schemaless document representation and the primitives
//! (`RowId`, `Delta`) that every other crate in the workspace builds on.

mod delta;
mod record;
mod row_id;
mod value;

pub use delta::{Delta, Sign};
pub use record::Record;
pub use row_id::{PhysicalId, RowId};
pub use value::{compare_values, Map, OrdKey, Value};
