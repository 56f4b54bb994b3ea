//! The schemaless value representation (spec.md §3, §9 "Schemaless values").
//!
//! A [`Value`] is a tagged variant standing in for the structurally typed
//! records the source system works with. Every operator in the engine
//! dispatches on this tag rather than on a static schema.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::Hash;

use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// An ordered map from field name to [`Value`], used both as the top-level
/// shape of a [`crate::Record`] and as the representation of nested objects.
pub type Map = BTreeMap<String, Value>;

/// A schemaless scalar, sequence, nested map, timestamp, or null.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Array(Vec<Value>),
    Map(Map),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(v) => Some(v.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// The not-a-number sentinel used in place of throwing on division or
    /// modulo by zero (spec.md §4.3 "Error discipline").
    pub fn nan() -> Value {
        Value::Float(f64::NAN)
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Float(f) if f.is_nan())
    }

    /// A short tag name used for type-mismatch diagnostics and for the
    /// mixed-type lexicographic sort fallback (spec.md §9, Open Question c).
    pub fn type_tag(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Timestamp(_) => "timestamp",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Renders the value the way the sort comparator's lexicographic
    /// fallback does for mixed-type keys (spec.md §4.5.5).
    pub fn stringify(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Timestamp(t) => t.to_rfc3339(),
            Value::Array(_) | Value::Map(_) => {
                serde_json::to_string(self).unwrap_or_default()
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.stringify())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_owned())
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

impl From<Map> for Value {
    fn from(m: Map) -> Self {
        Value::Map(m)
    }
}

/// A key wrapper that gives [`Value`] the total order dimensions and group
/// registers need, per the comparator rules in spec.md §4.5.5 / §9(c):
/// nulls (and, per Open Question (a), missing fields) sort below every
/// other value; same-tag values compare naturally; differently-tagged
/// values fall back to lexicographic order of their stringification.
#[derive(Clone, Debug, PartialEq)]
pub struct OrdKey(pub Value);

impl Eq for OrdKey {}

impl PartialOrd for OrdKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdKey {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_values(&self.0, &other.0)
    }
}

impl std::hash::Hash for OrdKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        hash_value(&self.0, state);
    }
}

fn hash_value<H: std::hash::Hasher>(value: &Value, state: &mut H) {
    std::mem::discriminant(value).hash(state);
    match value {
        Value::Null => {}
        Value::Bool(b) => b.hash(state),
        Value::Int(i) => i.hash(state),
        Value::Float(f) => OrderedFloat(*f).hash(state),
        Value::String(s) => s.hash(state),
        Value::Timestamp(t) => t.hash(state),
        Value::Array(items) => {
            for item in items {
                hash_value(item, state);
            }
        }
        Value::Map(map) => {
            for (k, v) in map {
                k.hash(state);
                hash_value(v, state);
            }
        }
    }
}

/// Total-order comparison used by the dimension index's sorted values and
/// by the sort operator's compound key comparator.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Int(x), Value::Int(y)) => x.cmp(y),
        (Value::Float(x), Value::Float(y)) => OrderedFloat(*x).cmp(&OrderedFloat(*y)),
        (Value::Int(x), Value::Float(y)) => OrderedFloat(*x as f64).cmp(&OrderedFloat(*y)),
        (Value::Float(x), Value::Int(y)) => OrderedFloat(*x).cmp(&OrderedFloat(*y as f64)),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Timestamp(x), Value::Timestamp(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => compare_slices(x, y),
        _ => a.stringify().cmp(&b.stringify()),
    }
}

fn compare_slices(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match compare_values(x, y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_sorts_below_everything() {
        assert_eq!(compare_values(&Value::Null, &Value::Int(-1)), Ordering::Less);
        assert_eq!(compare_values(&Value::Int(-1), &Value::Null), Ordering::Greater);
        assert_eq!(compare_values(&Value::Null, &Value::Null), Ordering::Equal);
    }

    #[test]
    fn numeric_cross_type_compares_by_magnitude() {
        assert_eq!(compare_values(&Value::Int(2), &Value::Float(2.5)), Ordering::Less);
    }

    #[test]
    fn mixed_type_falls_back_to_stringification() {
        // "10" < "9" lexicographically even though 10 > 9 numerically.
        assert_eq!(
            compare_values(&Value::Int(10), &Value::String("9".into())),
            Ordering::Less
        );
    }
}
