//! Accumulators: the `sum`/`avg`/`min`/`max`/`count`/`first`/`last`/`push`/
//! `add-to-set` vocabulary of spec.md §6, and the reversible registers the
//! group operator (spec.md §4.5.4) uses to maintain them incrementally.
//!
//! Reversibility (P4: `apply(apply(state, +v), −v) = state`) is the
//! defining requirement: running min/max keep a multiset of live values
//! rather than a bare scalar, exactly as spec.md §9 "Accumulator
//! reversibility" calls for.

use std::collections::BTreeMap;

use rivulet_repr::{OrdKey, Sign, Value};

/// The named accumulator kinds from spec.md §6.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum AccumulatorKind {
    Sum,
    Avg,
    Min,
    Max,
    Count,
    First,
    Last,
    Push,
    AddToSet,
}

/// A reversible per-group accumulator register (spec.md §3 "Operator State").
pub trait Register: std::fmt::Debug {
    /// Folds one contribution in (`Sign::Positive`) or out
    /// (`Sign::Negative`) of the accumulator.
    fn apply(&mut self, value: &Value, sign: Sign);

    /// The accumulator's current output value.
    fn output(&self) -> Value;

    /// True once every contribution has been reversed (used by the group
    /// operator to decide whether a group has become empty).
    fn is_empty(&self) -> bool;
}

pub fn new_register(kind: AccumulatorKind) -> Box<dyn Register> {
    match kind {
        AccumulatorKind::Sum => Box::new(SumRegister::default()),
        AccumulatorKind::Avg => Box::new(AvgRegister::default()),
        AccumulatorKind::Min => Box::new(ExtremumRegister::new_min()),
        AccumulatorKind::Max => Box::new(ExtremumRegister::new_max()),
        AccumulatorKind::Count => Box::new(CountRegister::default()),
        AccumulatorKind::First => Box::new(SequencedRegister::new(SequencedMode::First)),
        AccumulatorKind::Last => Box::new(SequencedRegister::new(SequencedMode::Last)),
        AccumulatorKind::Push => Box::new(SequencedRegister::new(SequencedMode::List)),
        AccumulatorKind::AddToSet => Box::new(SetRegister::default()),
    }
}

/// Folds an accumulator over a fixed batch of values in one shot, used when
/// an accumulator appears as a plain expression (spec.md §4.3
/// "accumulator-as-expression") rather than as group-stage state.
pub fn fold(kind: AccumulatorKind, values: &[Value]) -> Value {
    let mut register = new_register(kind);
    for v in values {
        register.apply(v, Sign::Positive);
    }
    register.output()
}

#[derive(Debug, Default)]
struct SumRegister {
    total: f64,
    seen_non_numeric: i64,
}

impl Register for SumRegister {
    fn apply(&mut self, value: &Value, sign: Sign) {
        match value.as_f64() {
            Some(n) => self.total += n * sign.as_i8() as f64,
            None if value.is_null() => {}
            None => self.seen_non_numeric += sign.as_i8() as i64,
        }
    }

    fn output(&self) -> Value {
        Value::Float(self.total)
    }

    fn is_empty(&self) -> bool {
        self.total == 0.0 && self.seen_non_numeric == 0
    }
}

#[derive(Debug, Default)]
struct AvgRegister {
    total: f64,
    count: i64,
}

impl Register for AvgRegister {
    fn apply(&mut self, value: &Value, sign: Sign) {
        if let Some(n) = value.as_f64() {
            self.total += n * sign.as_i8() as f64;
            self.count += sign.as_i8() as i64;
        }
    }

    fn output(&self) -> Value {
        if self.count == 0 {
            Value::Null
        } else {
            Value::Float(self.total / self.count as f64)
        }
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }
}

#[derive(Debug, Default)]
struct CountRegister {
    count: i64,
}

impl Register for CountRegister {
    fn apply(&mut self, _value: &Value, sign: Sign) {
        self.count += sign.as_i8() as i64;
    }

    fn output(&self) -> Value {
        Value::Int(self.count)
    }

    fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// A multiset of live values, ordered by the shared total-order comparator,
/// backing `min`/`max`. Removing the current extremum reveals the correct
/// new one because every contributing value (not just the extremum) is
/// retained (spec.md §9 "Accumulator reversibility").
#[derive(Debug)]
struct ExtremumRegister {
    counts: BTreeMap<OrdKey, usize>,
    take_max: bool,
}

impl ExtremumRegister {
    fn new_min() -> Self {
        ExtremumRegister {
            counts: BTreeMap::new(),
            take_max: false,
        }
    }

    fn new_max() -> Self {
        ExtremumRegister {
            counts: BTreeMap::new(),
            take_max: true,
        }
    }
}

impl Register for ExtremumRegister {
    fn apply(&mut self, value: &Value, sign: Sign) {
        let key = OrdKey(value.clone());
        match sign {
            Sign::Positive => *self.counts.entry(key).or_insert(0) += 1,
            Sign::Negative => {
                if let Some(count) = self.counts.get_mut(&key) {
                    *count -= 1;
                    if *count == 0 {
                        self.counts.remove(&key);
                    }
                }
            }
        }
    }

    fn output(&self) -> Value {
        let found = if self.take_max {
            self.counts.keys().next_back()
        } else {
            self.counts.keys().next()
        };
        found.map(|k| k.0.clone()).unwrap_or(Value::Null)
    }

    fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[derive(Debug, Default)]
struct SetRegister {
    counts: BTreeMap<OrdKey, usize>,
}

impl Register for SetRegister {
    fn apply(&mut self, value: &Value, sign: Sign) {
        let key = OrdKey(value.clone());
        match sign {
            Sign::Positive => *self.counts.entry(key).or_insert(0) += 1,
            Sign::Negative => {
                if let Some(count) = self.counts.get_mut(&key) {
                    *count -= 1;
                    if *count == 0 {
                        self.counts.remove(&key);
                    }
                }
            }
        }
    }

    fn output(&self) -> Value {
        Value::Array(self.counts.keys().map(|k| k.0.clone()).collect())
    }

    fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequencedMode {
    First,
    Last,
    List,
}

/// Backs `first`, `last`, and `push`: an insertion-ordered multiset.
/// Removal drops the most recently inserted matching occurrence so that
/// `apply(apply(state, +v), -v)` exactly restores prior state even when the
/// same value has contributed more than once.
#[derive(Debug, Default)]
struct SequencedRegister {
    mode: Option<SequencedMode>,
    next_seq: u64,
    entries: Vec<(u64, Value)>,
}

impl SequencedRegister {
    fn new(mode: SequencedMode) -> Self {
        SequencedRegister {
            mode: Some(mode),
            next_seq: 0,
            entries: Vec::new(),
        }
    }
}

impl Register for SequencedRegister {
    fn apply(&mut self, value: &Value, sign: Sign) {
        match sign {
            Sign::Positive => {
                let seq = self.next_seq;
                self.next_seq += 1;
                self.entries.push((seq, value.clone()));
            }
            Sign::Negative => {
                if let Some(pos) = self
                    .entries
                    .iter()
                    .rposition(|(_, v)| v == value)
                {
                    self.entries.remove(pos);
                }
            }
        }
    }

    fn output(&self) -> Value {
        match self.mode {
            Some(SequencedMode::First) => self
                .entries
                .iter()
                .min_by_key(|(seq, _)| *seq)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null),
            Some(SequencedMode::Last) => self
                .entries
                .iter()
                .max_by_key(|(seq, _)| *seq)
                .map(|(_, v)| v.clone())
                .unwrap_or(Value::Null),
            Some(SequencedMode::List) | None => {
                let mut sorted = self.entries.clone();
                sorted.sort_by_key(|(seq, _)| *seq);
                Value::Array(sorted.into_iter().map(|(_, v)| v).collect())
            }
        }
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
