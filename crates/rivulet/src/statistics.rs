//! The diagnostics surface spec.md §6 "Diagnostics output" names, returned
//! by [`crate::engine::Engine::statistics`].

use serde::{Deserialize, Serialize};

use rivulet_transform::FusionCounters;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatistics {
    pub total_records: usize,
    pub live_records: usize,
    pub dimensions_built: usize,
    pub active_groups: usize,
    pub compiled_plan_count: usize,
    pub average_hashed_group_probe_length: f64,
    pub fusions: FusionCounters,
}
