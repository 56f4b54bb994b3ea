use rivulet_transform::PlanError;

/// Errors the engine driver can raise. Per spec.md §7, an invalid row id
/// passed to `remove` is not an error (it returns `false`); only
/// compile-time pipeline problems and internal invariant violations are.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("failed to compile pipeline: {0}")]
    Plan(#[from] PlanError),
    #[error("plan handle {0} is not registered with this engine")]
    UnknownPlan(u64),
}
