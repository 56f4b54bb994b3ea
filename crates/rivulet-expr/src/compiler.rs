//! Turns an expression tree into a compiled, reusable evaluator
//! (spec.md §4.3 "Expression & Predicate Compiler").

use std::sync::Arc;

use rivulet_repr::{Record, Value};
use tracing::trace;

use crate::ast::{ScalarExpr, ScalarOp};
use crate::error::ExprError;
use crate::eval::{eval, EvalContext};
use crate::regex_cache::RegexCache;

/// A compiled expression: constants folded, arity validated, ready to
/// evaluate against any record sharing the pipeline's shape.
#[derive(Clone, Debug)]
pub struct CompiledExpr {
    expr: Arc<ScalarExpr>,
    regex_cache: Arc<RegexCache>,
}

impl CompiledExpr {
    pub fn eval(&self, ctx: &EvalContext) -> Value {
        eval(&self.expr, ctx, &self.regex_cache)
    }

    pub fn eval_record(&self, record: &Record) -> Value {
        self.eval(&EvalContext::new(record))
    }
}

/// A hint the planner can use to drive a dimension-index probe instead of a
/// full scan (spec.md §4.3: "emits ... a dimension-probe hint").
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeHint {
    pub field: String,
    pub op: ScalarOp,
    pub literal: Value,
}

/// A compiled boolean-valued expression, specialized for use as a filter
/// predicate.
#[derive(Clone, Debug)]
pub struct CompiledPredicate {
    expr: CompiledExpr,
    pub probe_hint: Option<ProbeHint>,
}

impl CompiledPredicate {
    pub fn test(&self, ctx: &EvalContext) -> bool {
        matches!(self.expr.eval(ctx), Value::Bool(true))
    }

    pub fn test_record(&self, record: &Record) -> bool {
        self.test(&EvalContext::new(record))
    }
}

/// Compiles expression trees, sharing one regex cache across every
/// expression compiled for the same pipeline (one `Compiler` per `compile`
/// call in the engine driver).
pub struct Compiler {
    regex_cache: Arc<RegexCache>,
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

impl Compiler {
    pub fn new() -> Compiler {
        Compiler {
            regex_cache: RegexCache::new(),
        }
    }

    pub fn compile_expr(&self, expr: ScalarExpr) -> Result<CompiledExpr, ExprError> {
        validate_arity(&expr)?;
        let folded = fold_constants(expr);
        Ok(CompiledExpr {
            expr: Arc::new(folded),
            regex_cache: Arc::clone(&self.regex_cache),
        })
    }

    pub fn compile_predicate(&self, expr: ScalarExpr) -> Result<CompiledPredicate, ExprError> {
        let probe_hint = extract_probe_hint(&expr);
        let expr = self.compile_expr(expr)?;
        Ok(CompiledPredicate { expr, probe_hint })
    }
}

/// Replaces constant subtrees (no field/variable dependency) with their
/// evaluated literal, per spec.md §4.3 "Constant folding".
fn fold_constants(expr: ScalarExpr) -> ScalarExpr {
    match expr {
        ScalarExpr::Call(op, args) => {
            let folded_args: Vec<ScalarExpr> = args.into_iter().map(fold_constants).collect();
            let candidate = ScalarExpr::Call(op, folded_args);
            if candidate.is_constant() {
                let dummy = Record::empty();
                let regex_cache = RegexCache::new();
                let value = eval(&candidate, &EvalContext::new(&dummy), &regex_cache);
                trace!(?op, ?value, "folded constant subtree");
                ScalarExpr::Literal(value)
            } else {
                candidate
            }
        }
        ScalarExpr::Accumulate(kind, inner) => ScalarExpr::Accumulate(kind, Box::new(fold_constants(*inner))),
        leaf => leaf,
    }
}

/// When a predicate is a single top-level comparison between a field and a
/// literal, surfaces it so the planner can drive a dimension probe instead
/// of a full filter scan.
fn extract_probe_hint(expr: &ScalarExpr) -> Option<ProbeHint> {
    let ScalarExpr::Call(op, args) = expr else {
        return None;
    };
    if !matches!(
        op,
        ScalarOp::Eq | ScalarOp::Ne | ScalarOp::Gt | ScalarOp::Gte | ScalarOp::Lt | ScalarOp::Lte
    ) {
        return None;
    }
    match (args.first(), args.get(1)) {
        (Some(ScalarExpr::Field(field)), Some(ScalarExpr::Literal(lit))) => Some(ProbeHint {
            field: field.clone(),
            op: *op,
            literal: lit.clone(),
        }),
        (Some(ScalarExpr::Literal(lit)), Some(ScalarExpr::Field(field))) => Some(ProbeHint {
            field: field.clone(),
            op: flip(*op),
            literal: lit.clone(),
        }),
        _ => None,
    }
}

fn flip(op: ScalarOp) -> ScalarOp {
    match op {
        ScalarOp::Gt => ScalarOp::Lt,
        ScalarOp::Gte => ScalarOp::Lte,
        ScalarOp::Lt => ScalarOp::Gt,
        ScalarOp::Lte => ScalarOp::Gte,
        other => other,
    }
}

enum Arity {
    Exact(usize),
    Min(usize),
}

fn expected_arity(op: ScalarOp) -> Arity {
    use Arity::*;
    use ScalarOp::*;
    match op {
        Not | Abs | Ceil | Floor | Round | Sqrt | ToUpper | ToLower | Length | Trim | Size
        | Reverse | AnyTrue | AllTrue => Exact(1),
        Eq | Ne | Gt | Gte | Lt | Lte | In | NotIn | Add | Subtract | Multiply | Divide | Mod
        | Pow | Split | ElementAt | ArrayFilter | ArrayMap | IndexOf | Contains | IfNull
        | SetEquals | SetIntersect | SetUnion | SetDifference | IsSubset | Exists | Year
        | Month | DayOfMonth | DayOfWeek | DayOfYear | Week | Hour | Minute | Second
        | Millisecond => Exact(2),
        Substring | Cond | RegexMatch => Min(2),
        Slice => Min(2),
        And | Or | Nor | Concat | ArrayConcat => Min(1),
    }
}

fn validate_arity(expr: &ScalarExpr) -> Result<(), ExprError> {
    if let ScalarExpr::Call(op, args) = expr {
        let ok = match expected_arity(*op) {
            Arity::Exact(n) => args.len() == n,
            Arity::Min(n) => args.len() >= n,
        };
        if !ok {
            return Err(ExprError::Arity {
                op: *op,
                expected: arity_description(*op),
                found: args.len(),
            });
        }
        for a in args {
            validate_arity(a)?;
        }
    }
    if let ScalarExpr::Accumulate(_, inner) = expr {
        validate_arity(inner)?;
    }
    Ok(())
}

fn arity_description(op: ScalarOp) -> &'static str {
    match expected_arity(op) {
        Arity::Exact(1) => "exactly 1",
        Arity::Exact(2) => "exactly 2",
        Arity::Exact(_) => "a fixed number of",
        Arity::Min(n) if n == 1 => "at least 1",
        Arity::Min(_) => "at least 2",
    }
}
