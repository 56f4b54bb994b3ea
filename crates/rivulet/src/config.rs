//! Engine tunables spec.md leaves as planner/implementation choices rather
//! than protocol (§4.4): the hash-vs-ordered group strategy threshold, the
//! top-K fusion eligibility ceiling, and eager-vs-lazy dimension
//! construction, as a plain tunable-struct-plus-`::new` shape for
//! per-component configuration.

/// Tunables for one [`crate::engine::Engine`] instance.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Below this estimated cardinality, `Group` uses a hashed strategy;
    /// at or above it, an ordered (`BTreeMap`-backed) one, trading insert
    /// cost for cheaper ordered iteration on large groups (§4.4).
    pub group_hash_threshold: f64,
    /// `Sort` immediately followed by `Limit(k)` only fuses into `TopK`
    /// when `k` is at or below this ceiling; a large `k` gains little from
    /// bounding membership and is left as two plain stages.
    pub top_k_fusion_ceiling: usize,
    /// When true, every referenced dimension is built during `compile`
    /// from the current live-set; when false, a dimension is left absent
    /// until the first probe that needs it, which then scans the live-set
    /// once to backfill it.
    pub eager_dimensions: bool,
}

impl Default for EngineConfig {
    fn default() -> EngineConfig {
        EngineConfig {
            group_hash_threshold: 10_000.0,
            top_k_fusion_ceiling: 1_000,
            eager_dimensions: true,
        }
    }
}

impl EngineConfig {
    pub fn new() -> EngineConfig {
        EngineConfig::default()
    }

    pub fn with_group_hash_threshold(mut self, threshold: f64) -> EngineConfig {
        self.group_hash_threshold = threshold;
        self
    }

    pub fn with_top_k_fusion_ceiling(mut self, ceiling: usize) -> EngineConfig {
        self.top_k_fusion_ceiling = ceiling;
        self
    }

    pub fn with_eager_dimensions(mut self, eager: bool) -> EngineConfig {
        self.eager_dimensions = eager;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = EngineConfig::new()
            .with_group_hash_threshold(5.0)
            .with_top_k_fusion_ceiling(8)
            .with_eager_dimensions(false);
        assert_eq!(config.group_hash_threshold, 5.0);
        assert_eq!(config.top_k_fusion_ceiling, 8);
        assert!(!config.eager_dimensions);
    }
}
