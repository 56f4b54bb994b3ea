// Copyright the rivulet authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0

//! Expression, predicate and accumulator compilation (spec.md §4.3, §6).
//!
//! Callers build a [`ScalarExpr`] tree directly — there is no surface
//! grammar in scope — and hand it to a [`Compiler`], which folds constant
//! subtrees, validates operator arity, and returns a [`CompiledExpr`] or
//! [`CompiledPredicate`] ready to evaluate against records from the store.

mod accumulator;
mod ast;
mod compiler;
mod error;
mod eval;
mod regex_cache;

pub use accumulator::{fold, new_register, AccumulatorKind, Register};
pub use ast::{ScalarExpr, ScalarOp, SystemVar};
pub use compiler::{CompiledExpr, CompiledPredicate, Compiler, ProbeHint};
pub use error::ExprError;
pub use eval::EvalContext;
pub use regex_cache::RegexCache;
