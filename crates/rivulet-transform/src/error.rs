use rivulet_expr::ExprError;

/// Errors raised while turning a caller-supplied pipeline shape into a
/// [`crate::plan::Plan`] (spec.md §7 "compile-time errors").
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("stage {index} ({kind}): {source}")]
    Expr {
        index: usize,
        kind: &'static str,
        #[source]
        source: ExprError,
    },
    #[error("stage {index}: unwind field path must be non-empty")]
    EmptyUnwindField { index: usize },
    #[error("stage {index}: join local/foreign/output field paths must be non-empty")]
    EmptyJoinField { index: usize },
}
