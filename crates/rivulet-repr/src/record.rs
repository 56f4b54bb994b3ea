//! Records: the schemaless documents the engine stores (spec.md §3 "Record").

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::{Map, Value};

/// An immutable schemaless document. Once stored, a `Record` is never
/// mutated in place (spec.md §3: "Immutable once stored").
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record(Map);

impl Record {
    pub fn new(fields: Map) -> Record {
        Record(fields)
    }

    pub fn empty() -> Record {
        Record(Map::new())
    }

    pub fn fields(&self) -> &Map {
        &self.0
    }

    pub fn into_fields(self) -> Map {
        self.0
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.0.insert(field.into(), value);
    }

    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Resolves a (possibly dotted) field path against this record, walking
    /// nested maps. Missing segments, or attempts to descend through a
    /// non-map value, yield `None` rather than erroring: per spec.md §9
    /// Open Question (a), a missing field is treated identically to a
    /// present `null` everywhere comparisons are performed.
    ///
    /// The first four segments are matched without allocating a split
    /// iterator (spec.md §4.3 "walks ≤ 4 segments inline and falls back to
    /// a loop past that"); deeper paths fall back to splitting the
    /// remainder.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let s1 = segments.next()?;
        let mut current = self.0.get(s1)?;

        macro_rules! step {
            () => {
                match segments.next() {
                    Some(seg) => match current.as_map() {
                        Some(map) => match map.get(seg) {
                            Some(v) => current = v,
                            None => return None,
                        },
                        None => return None,
                    },
                    None => return Some(current),
                }
            };
        }

        step!();
        step!();
        step!();

        // Beyond four segments, fall back to a plain loop over the rest.
        for seg in segments {
            match current.as_map() {
                Some(map) => match map.get(seg) {
                    Some(v) => current = v,
                    None => return None,
                },
                None => return None,
            }
        }
        Some(current)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Map(self.0.clone()))
    }
}

impl From<Map> for Record {
    fn from(m: Map) -> Self {
        Record(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nested(depth: usize) -> Record {
        let mut leaf = Map::new();
        leaf.insert("v".into(), Value::Int(42));
        let mut current = Value::Map(leaf);
        for i in (0..depth).rev() {
            let mut m = Map::new();
            m.insert(format!("l{i}"), current);
            current = Value::Map(m);
        }
        match current {
            Value::Map(m) => Record(m),
            _ => unreachable!(),
        }
    }

    #[test]
    fn shallow_path_within_inline_budget() {
        let r = nested(2);
        assert_eq!(r.get_path("l0.l1.v"), Some(&Value::Int(42)));
    }

    #[test]
    fn deep_path_past_inline_budget_uses_loop_fallback() {
        let r = nested(6);
        assert_eq!(r.get_path("l0.l1.l2.l3.l4.l5.v"), Some(&Value::Int(42)));
    }

    #[test]
    fn missing_segment_is_none() {
        let r = nested(1);
        assert_eq!(r.get_path("l0.missing"), None);
        assert_eq!(r.get_path("missing"), None);
    }

    #[test]
    fn descending_through_scalar_is_none() {
        let mut r = Record::empty();
        r.set("a", Value::Int(1));
        assert_eq!(r.get_path("a.b"), None);
    }
}
