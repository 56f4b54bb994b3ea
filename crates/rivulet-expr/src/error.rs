//! Compile-time errors for expression trees (spec.md §7 "Invalid pipeline").
//!
//! Runtime evaluation never errors: type mismatches and divide-by-zero are
//! handled per the coercion table (`Value::Null` / `Value::nan()`). Only
//! `compile` can fail, and only for structural problems — arity mismatches
//! or malformed regex literals — caught before any store mutation.

use crate::ast::ScalarOp;

#[derive(Debug, thiserror::Error)]
pub enum ExprError {
    #[error("operator {op:?} expects {expected} argument(s), found {found}")]
    Arity {
        op: ScalarOp,
        expected: &'static str,
        found: usize,
    },
    #[error("invalid regex pattern {pattern:?}: {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
