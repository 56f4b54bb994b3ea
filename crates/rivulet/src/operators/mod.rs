//! Operator implementations, one module per stage kind (spec.md §4.5).

mod filter;
mod filter_reshape;
mod group;
mod join;
mod limit;
mod reshape;
mod skip;
mod sort;
mod unwind;

pub use filter::FilterOp;
pub use filter_reshape::FilterReshapeOp;
pub use group::GroupOp;
pub use join::JoinOp;
pub use limit::LimitOp;
pub use reshape::ReshapeOp;
pub use skip::SkipOp;
pub use sort::{SortOp, TopKOp};
pub use unwind::UnwindOp;
