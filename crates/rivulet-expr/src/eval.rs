//! Runtime evaluation of a (folded) expression tree against a record
//! (spec.md §4.3). Every dispatch arm follows the "Error discipline": type
//! mismatches yield `Value::Null`, and arithmetic division/modulo by zero
//! yields `Value::nan()`. Nothing in this module can panic on malformed
//! input data.

use std::sync::Arc;

use chrono::{Datelike, Timelike};
use rivulet_repr::{compare_values, Record, Value};

use crate::accumulator::fold;
use crate::ast::{ScalarExpr, ScalarOp, SystemVar};
use crate::regex_cache::RegexCache;

/// The scratch context threaded through evaluation: the record currently in
/// scope, the pipeline stage's root record (for array-lambda bodies that
/// reach outer fields), and the bound element when evaluating inside an
/// array `filter`/`map` lambda.
pub struct EvalContext<'a> {
    pub current: &'a Record,
    pub root: &'a Record,
    pub lambda: Option<&'a Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new(record: &'a Record) -> EvalContext<'a> {
        EvalContext {
            current: record,
            root: record,
            lambda: None,
        }
    }

    fn with_lambda(&self, value: &'a Value) -> EvalContext<'a> {
        EvalContext {
            current: self.current,
            root: self.root,
            lambda: Some(value),
        }
    }
}

/// Evaluates a folded `ScalarExpr` tree, using `regex_cache` for any
/// `RegexMatch` calls (spec.md §4.3 "Regex compile cache").
pub fn eval(expr: &ScalarExpr, ctx: &EvalContext, regex_cache: &Arc<RegexCache>) -> Value {
    match expr {
        ScalarExpr::Literal(v) => v.clone(),
        ScalarExpr::Field(path) => ctx.current.get_path(path).cloned().unwrap_or(Value::Null),
        ScalarExpr::Var(SystemVar::Current) => Value::Map(ctx.current.fields().clone()),
        ScalarExpr::Var(SystemVar::Root) => Value::Map(ctx.root.fields().clone()),
        ScalarExpr::LambdaVar => ctx.lambda.cloned().unwrap_or(Value::Null),
        ScalarExpr::Accumulate(kind, inner) => {
            let v = eval(inner, ctx, regex_cache);
            match v.as_array() {
                Some(elements) => fold(*kind, elements),
                None => Value::Null,
            }
        }
        ScalarExpr::Call(op, args) => eval_call(*op, args, ctx, regex_cache),
    }
}

fn arg(args: &[ScalarExpr], i: usize, ctx: &EvalContext, regex_cache: &Arc<RegexCache>) -> Value {
    args.get(i)
        .map(|e| eval(e, ctx, regex_cache))
        .unwrap_or(Value::Null)
}

fn eval_call(op: ScalarOp, args: &[ScalarExpr], ctx: &EvalContext, regex_cache: &Arc<RegexCache>) -> Value {
    use ScalarOp::*;
    match op {
        // ---- comparison ----
        Eq => Value::Bool(values_equal(&arg(args, 0, ctx, regex_cache), &arg(args, 1, ctx, regex_cache))),
        Ne => Value::Bool(!values_equal(&arg(args, 0, ctx, regex_cache), &arg(args, 1, ctx, regex_cache))),
        Gt => cmp_bool(args, ctx, regex_cache, |o| o == std::cmp::Ordering::Greater),
        Gte => cmp_bool(args, ctx, regex_cache, |o| o != std::cmp::Ordering::Less),
        Lt => cmp_bool(args, ctx, regex_cache, |o| o == std::cmp::Ordering::Less),
        Lte => cmp_bool(args, ctx, regex_cache, |o| o != std::cmp::Ordering::Greater),
        In => {
            let needle = arg(args, 0, ctx, regex_cache);
            let haystack = arg(args, 1, ctx, regex_cache);
            Value::Bool(
                haystack
                    .as_array()
                    .map(|items| items.iter().any(|v| values_equal(v, &needle)))
                    .unwrap_or(false),
            )
        }
        NotIn => {
            let inverted = eval_call(In, args, ctx, regex_cache);
            Value::Bool(!inverted.as_bool().unwrap_or(false))
        }

        // ---- logical (short-circuit) ----
        And => {
            for a in args {
                if !truthy(&eval(a, ctx, regex_cache)) {
                    return Value::Bool(false);
                }
            }
            Value::Bool(true)
        }
        Or => {
            for a in args {
                if truthy(&eval(a, ctx, regex_cache)) {
                    return Value::Bool(true);
                }
            }
            Value::Bool(false)
        }
        Nor => {
            for a in args {
                if truthy(&eval(a, ctx, regex_cache)) {
                    return Value::Bool(false);
                }
            }
            Value::Bool(true)
        }
        Not => Value::Bool(!truthy(&arg(args, 0, ctx, regex_cache))),
        Exists => {
            let present = match args.first() {
                Some(ScalarExpr::Field(path)) => ctx.current.get_path(path).is_some(),
                Some(other) => !matches!(eval(other, ctx, regex_cache), Value::Null),
                None => false,
            };
            Value::Bool(present)
        }

        // ---- arithmetic ----
        Add => numeric2(args, ctx, regex_cache, |a, b| a + b),
        Subtract => numeric2(args, ctx, regex_cache, |a, b| a - b),
        Multiply => numeric2(args, ctx, regex_cache, |a, b| a * b),
        Divide => numeric2(args, ctx, regex_cache, |a, b| if b == 0.0 { f64::NAN } else { a / b }),
        Mod => numeric2(args, ctx, regex_cache, |a, b| if b == 0.0 { f64::NAN } else { a % b }),
        Abs => numeric1(args, ctx, regex_cache, f64::abs),
        Ceil => numeric1(args, ctx, regex_cache, f64::ceil),
        Floor => numeric1(args, ctx, regex_cache, f64::floor),
        Round => numeric1(args, ctx, regex_cache, f64::round),
        Sqrt => numeric1(args, ctx, regex_cache, f64::sqrt),
        Pow => numeric2(args, ctx, regex_cache, f64::powf),

        // ---- string ----
        Concat => {
            let mut out = String::new();
            for a in args {
                match eval(a, ctx, regex_cache) {
                    Value::Null => return Value::Null,
                    v => out.push_str(&v.stringify()),
                }
            }
            Value::String(out)
        }
        Substring => {
            let s = arg(args, 0, ctx, regex_cache);
            let start = arg(args, 1, ctx, regex_cache);
            let len = arg(args, 2, ctx, regex_cache);
            match (s.as_str(), start.as_f64()) {
                (Some(s), Some(start)) => {
                    let chars: Vec<char> = s.chars().collect();
                    let start = start.max(0.0) as usize;
                    if start >= chars.len() {
                        return Value::String(String::new());
                    }
                    let end = match len.as_f64() {
                        Some(l) if l >= 0.0 => (start + l as usize).min(chars.len()),
                        _ => chars.len(),
                    };
                    Value::String(chars[start..end].iter().collect())
                }
                _ => Value::Null,
            }
        }
        ToUpper => arg(args, 0, ctx, regex_cache).as_str().map(|s| Value::String(s.to_uppercase())).unwrap_or(Value::Null),
        ToLower => arg(args, 0, ctx, regex_cache).as_str().map(|s| Value::String(s.to_lowercase())).unwrap_or(Value::Null),
        Split => {
            let s = arg(args, 0, ctx, regex_cache);
            let sep = arg(args, 1, ctx, regex_cache);
            match (s.as_str(), sep.as_str()) {
                (Some(s), Some(sep)) if !sep.is_empty() => {
                    Value::Array(s.split(sep).map(|p| Value::String(p.to_owned())).collect())
                }
                _ => Value::Null,
            }
        }
        Length => match arg(args, 0, ctx, regex_cache) {
            Value::String(s) => Value::Int(s.chars().count() as i64),
            Value::Array(a) => Value::Int(a.len() as i64),
            _ => Value::Null,
        },
        Trim => arg(args, 0, ctx, regex_cache).as_str().map(|s| Value::String(s.trim().to_owned())).unwrap_or(Value::Null),
        RegexMatch => {
            let s = arg(args, 0, ctx, regex_cache);
            let pattern = arg(args, 1, ctx, regex_cache);
            let flags = args.get(2).map(|a| eval(a, ctx, regex_cache)).and_then(|v| v.as_str().map(str::to_owned)).unwrap_or_default();
            match (s.as_str(), pattern.as_str()) {
                (Some(s), Some(pattern)) => match regex_cache.get_or_compile(pattern, &flags) {
                    Ok(re) => Value::Bool(re.is_match(s)),
                    Err(_) => Value::Null,
                },
                _ => Value::Null,
            }
        }

        // ---- array ----
        Size => arg(args, 0, ctx, regex_cache).as_array().map(|a| Value::Int(a.len() as i64)).unwrap_or(Value::Null),
        ElementAt => {
            let array = arg(args, 0, ctx, regex_cache);
            let idx = arg(args, 1, ctx, regex_cache);
            match (array.as_array(), idx.as_f64()) {
                (Some(items), Some(i)) => index_into(items, i as i64).cloned().unwrap_or(Value::Null),
                _ => Value::Null,
            }
        }
        ArrayFilter => {
            let array = eval(&args[0], ctx, regex_cache);
            match array.as_array() {
                Some(items) => {
                    let kept: Vec<Value> = items
                        .iter()
                        .filter(|item| truthy(&eval(&args[1], &ctx.with_lambda(item), regex_cache)))
                        .cloned()
                        .collect();
                    Value::Array(kept)
                }
                None => Value::Null,
            }
        }
        ArrayMap => {
            let array = eval(&args[0], ctx, regex_cache);
            match array.as_array() {
                Some(items) => {
                    let mapped: Vec<Value> = items
                        .iter()
                        .map(|item| eval(&args[1], &ctx.with_lambda(item), regex_cache))
                        .collect();
                    Value::Array(mapped)
                }
                None => Value::Null,
            }
        }
        Slice => {
            let array = arg(args, 0, ctx, regex_cache);
            let start = arg(args, 1, ctx, regex_cache);
            let len = args.get(2).map(|a| eval(a, ctx, regex_cache));
            match (array.as_array(), start.as_f64()) {
                (Some(items), Some(start)) => {
                    let n = items.len() as i64;
                    let start_idx = normalize_index(start as i64, n);
                    let end_idx = match len.as_ref().and_then(Value::as_f64) {
                        Some(l) => (start_idx + l as i64).clamp(0, n),
                        None => n,
                    };
                    if start_idx >= end_idx {
                        Value::Array(Vec::new())
                    } else {
                        Value::Array(items[start_idx as usize..end_idx as usize].to_vec())
                    }
                }
                _ => Value::Null,
            }
        }
        ArrayConcat => {
            let mut out = Vec::new();
            for a in args {
                match eval(a, ctx, regex_cache).as_array() {
                    Some(items) => out.extend_from_slice(items),
                    None => return Value::Null,
                }
            }
            Value::Array(out)
        }
        IndexOf => {
            let array = arg(args, 0, ctx, regex_cache);
            let needle = arg(args, 1, ctx, regex_cache);
            array
                .as_array()
                .and_then(|items| items.iter().position(|v| values_equal(v, &needle)))
                .map(|i| Value::Int(i as i64))
                .unwrap_or(Value::Int(-1))
        }
        Reverse => arg(args, 0, ctx, regex_cache).as_array().map(|a| {
            let mut rev = a.to_vec();
            rev.reverse();
            Value::Array(rev)
        }).unwrap_or(Value::Null),
        Contains => {
            let array = arg(args, 0, ctx, regex_cache);
            let needle = arg(args, 1, ctx, regex_cache);
            Value::Bool(array.as_array().map(|a| a.iter().any(|v| values_equal(v, &needle))).unwrap_or(false))
        }

        // ---- date ----
        Year => date_part(args, ctx, regex_cache, |d| d.year() as i64),
        Month => date_part(args, ctx, regex_cache, |d| d.month() as i64),
        DayOfMonth => date_part(args, ctx, regex_cache, |d| d.day() as i64),
        DayOfWeek => date_part(args, ctx, regex_cache, |d| d.weekday().num_days_from_sunday() as i64 + 1),
        DayOfYear => date_part(args, ctx, regex_cache, |d| d.ordinal() as i64),
        Week => date_part(args, ctx, regex_cache, |d| d.iso_week().week() as i64),
        Hour => date_part(args, ctx, regex_cache, |d| d.hour() as i64),
        Minute => date_part(args, ctx, regex_cache, |d| d.minute() as i64),
        Second => date_part(args, ctx, regex_cache, |d| d.second() as i64),
        Millisecond => date_part(args, ctx, regex_cache, |d| (d.nanosecond() / 1_000_000) as i64),

        // ---- conditional ----
        Cond => {
            if truthy(&arg(args, 0, ctx, regex_cache)) {
                arg(args, 1, ctx, regex_cache)
            } else {
                arg(args, 2, ctx, regex_cache)
            }
        }
        IfNull => {
            let v = arg(args, 0, ctx, regex_cache);
            if v.is_null() {
                arg(args, 1, ctx, regex_cache)
            } else {
                v
            }
        }

        // ---- set ----
        SetEquals => Value::Bool(as_set(&arg(args, 0, ctx, regex_cache)) == as_set(&arg(args, 1, ctx, regex_cache))),
        SetIntersect => {
            let a = as_set(&arg(args, 0, ctx, regex_cache));
            let b = as_set(&arg(args, 1, ctx, regex_cache));
            set_to_value(a.intersection(&b).cloned())
        }
        SetUnion => {
            let a = as_set(&arg(args, 0, ctx, regex_cache));
            let b = as_set(&arg(args, 1, ctx, regex_cache));
            set_to_value(a.union(&b).cloned())
        }
        SetDifference => {
            let a = as_set(&arg(args, 0, ctx, regex_cache));
            let b = as_set(&arg(args, 1, ctx, regex_cache));
            set_to_value(a.difference(&b).cloned())
        }
        IsSubset => {
            let a = as_set(&arg(args, 0, ctx, regex_cache));
            let b = as_set(&arg(args, 1, ctx, regex_cache));
            Value::Bool(a.is_subset(&b))
        }
        AnyTrue => Value::Bool(arg(args, 0, ctx, regex_cache).as_array().map(|a| a.iter().any(truthy)).unwrap_or(false)),
        AllTrue => Value::Bool(arg(args, 0, ctx, regex_cache).as_array().map(|a| a.iter().all(truthy)).unwrap_or(false)),
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Int(i) => *i != 0,
        Value::Float(f) => *f != 0.0,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Map(_) | Value::Timestamp(_) => true,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => compare_values(a, b) == std::cmp::Ordering::Equal && a.type_tag() == b.type_tag(),
    }
}

fn cmp_bool(
    args: &[ScalarExpr],
    ctx: &EvalContext,
    regex_cache: &Arc<RegexCache>,
    pred: impl Fn(std::cmp::Ordering) -> bool,
) -> Value {
    let a = arg(args, 0, ctx, regex_cache);
    let b = arg(args, 1, ctx, regex_cache);
    Value::Bool(pred(compare_values(&a, &b)))
}

fn numeric1(args: &[ScalarExpr], ctx: &EvalContext, regex_cache: &Arc<RegexCache>, f: impl Fn(f64) -> f64) -> Value {
    match arg(args, 0, ctx, regex_cache).as_f64() {
        Some(n) => Value::Float(f(n)),
        None => Value::nan(),
    }
}

fn numeric2(args: &[ScalarExpr], ctx: &EvalContext, regex_cache: &Arc<RegexCache>, f: impl Fn(f64, f64) -> f64) -> Value {
    let a = arg(args, 0, ctx, regex_cache);
    let b = arg(args, 1, ctx, regex_cache);
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => Value::Float(f(a, b)),
        _ => Value::nan(),
    }
}

fn date_part(args: &[ScalarExpr], ctx: &EvalContext, regex_cache: &Arc<RegexCache>, f: impl Fn(chrono::DateTime<chrono::Utc>) -> i64) -> Value {
    match arg(args, 0, ctx, regex_cache).as_timestamp() {
        Some(ts) => Value::Int(f(ts)),
        None => Value::Null,
    }
}

fn index_into(items: &[Value], i: i64) -> Option<&Value> {
    let idx = if i < 0 { items.len() as i64 + i } else { i };
    if idx < 0 {
        return None;
    }
    items.get(idx as usize)
}

fn normalize_index(i: i64, len: i64) -> i64 {
    if i < 0 {
        (len + i).max(0)
    } else {
        i.min(len)
    }
}

fn as_set(v: &Value) -> std::collections::BTreeSet<rivulet_repr::OrdKey> {
    v.as_array()
        .map(|items| items.iter().cloned().map(rivulet_repr::OrdKey).collect())
        .unwrap_or_default()
}

fn set_to_value(items: impl Iterator<Item = rivulet_repr::OrdKey>) -> Value {
    Value::Array(items.map(|k| k.0).collect())
}
