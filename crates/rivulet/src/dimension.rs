//! Per-field dimension indexes (spec.md §4.2), built lazily on first
//! compile demand and maintained on every `add`/`remove` so the planner's
//! probe hints and the sort operator can avoid a full scan.

use std::collections::{BTreeMap, HashMap};

use rivulet_repr::{OrdKey, Record, RowId, Value};

/// One field's value→rows and row→value indexes plus a sorted value list,
/// ordered by `rivulet_repr::compare_values` via `OrdKey`.
#[derive(Debug, Default)]
pub struct Dimension {
    field: String,
    value_of: HashMap<RowId, Value>,
    rows_by_value: BTreeMap<OrdKey, Vec<RowId>>,
}

impl Dimension {
    pub fn new(field: impl Into<String>) -> Dimension {
        Dimension {
            field: field.into(),
            value_of: HashMap::new(),
            rows_by_value: BTreeMap::new(),
        }
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// Records `row_id`'s current value, replacing any prior entry for the
    /// same row id (I2: `value_of[row] == store[row].get_path(field)`).
    pub fn set(&mut self, row_id: RowId, value: Value) {
        if let Some(old) = self.value_of.remove(&row_id) {
            self.drop_from_index(&old, &row_id);
        }
        self.rows_by_value
            .entry(OrdKey(value.clone()))
            .or_default()
            .push(row_id.clone());
        self.value_of.insert(row_id, value);
    }

    /// Drops `row_id` from every map. Removing the last row id for a value
    /// drops the value from the sorted list.
    pub fn remove(&mut self, row_id: &RowId) {
        if let Some(value) = self.value_of.remove(row_id) {
            self.drop_from_index(&value, row_id);
        }
    }

    fn drop_from_index(&mut self, value: &Value, row_id: &RowId) {
        let key = OrdKey(value.clone());
        if let Some(rows) = self.rows_by_value.get_mut(&key) {
            rows.retain(|r| r != row_id);
            if rows.is_empty() {
                self.rows_by_value.remove(&key);
            }
        }
    }

    pub fn value_of(&self, row_id: &RowId) -> Option<&Value> {
        self.value_of.get(row_id)
    }

    pub fn rows_with_value(&self, value: &Value) -> &[RowId] {
        self.rows_by_value
            .get(&OrdKey(value.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Row ids whose value compares less than `value` (used for `lt`/`lte`
    /// probe hints) or greater (`gt`/`gte`), walking the sorted value list.
    pub fn rows_less_than(&self, value: &Value, inclusive: bool) -> Vec<RowId> {
        let key = OrdKey(value.clone());
        self.rows_by_value
            .range(..)
            .take_while(|(k, _)| if inclusive { **k <= key } else { **k < key })
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect()
    }

    pub fn rows_greater_than(&self, value: &Value, inclusive: bool) -> Vec<RowId> {
        let key = OrdKey(value.clone());
        self.rows_by_value
            .range(..)
            .filter(|(k, _)| if inclusive { **k >= key } else { **k > key })
            .flat_map(|(_, rows)| rows.iter().cloned())
            .collect()
    }

    pub fn cardinality(&self) -> usize {
        self.rows_by_value.len()
    }

    pub fn min(&self) -> Option<&Value> {
        self.rows_by_value.keys().next().map(|k| &k.0)
    }

    pub fn max(&self) -> Option<&Value> {
        self.rows_by_value.keys().next_back().map(|k| &k.0)
    }

    pub fn sorted_values(&self) -> impl Iterator<Item = &Value> {
        self.rows_by_value.keys().map(|k| &k.0)
    }

    pub fn sorted_rows(&self) -> impl Iterator<Item = &RowId> {
        self.rows_by_value.values().flat_map(|rows| rows.iter())
    }
}

/// One dimension per field path referenced by any compiled pipeline,
/// created on first demand and shared across plans.
#[derive(Debug, Default)]
pub struct DimensionRegistry {
    dimensions: HashMap<String, Dimension>,
}

impl DimensionRegistry {
    pub fn new() -> DimensionRegistry {
        DimensionRegistry::default()
    }

    pub fn ensure(&mut self, field: &str) {
        self.dimensions
            .entry(field.to_string())
            .or_insert_with(|| Dimension::new(field));
    }

    pub fn get(&self, field: &str) -> Option<&Dimension> {
        self.dimensions.get(field)
    }

    pub fn get_mut(&mut self, field: &str) -> Option<&mut Dimension> {
        self.dimensions.get_mut(field)
    }

    pub fn len(&self) -> usize {
        self.dimensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dimensions.is_empty()
    }

    /// Updates every registered dimension whose field resolves on `record`.
    pub fn on_add(&mut self, row_id: RowId, record: &Record) {
        for dimension in self.dimensions.values_mut() {
            if let Some(value) = record.get_path(dimension.field()) {
                dimension.set(row_id.clone(), value.clone());
            }
        }
    }

    pub fn on_remove(&mut self, row_id: &RowId) {
        for dimension in self.dimensions.values_mut() {
            dimension.remove(row_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use rivulet_repr::Map;

    use super::*;

    fn record_with(field: &str, value: Value) -> Record {
        let mut fields = Map::new();
        fields.insert(field.to_string(), value);
        Record::new(fields)
    }

    #[test]
    fn set_and_remove_keep_maps_consistent() {
        let mut dim = Dimension::new("age");
        dim.set(RowId::physical(0), Value::Int(5));
        dim.set(RowId::physical(1), Value::Int(5));
        dim.set(RowId::physical(2), Value::Int(9));
        assert_eq!(dim.cardinality(), 2);
        assert_eq!(dim.rows_with_value(&Value::Int(5)).len(), 2);

        dim.remove(&RowId::physical(0));
        assert_eq!(dim.rows_with_value(&Value::Int(5)).len(), 1);
        dim.remove(&RowId::physical(1));
        assert_eq!(dim.cardinality(), 1);
        assert_eq!(dim.min(), Some(&Value::Int(9)));
    }

    #[test]
    fn registry_only_updates_matching_fields() {
        let mut registry = DimensionRegistry::new();
        registry.ensure("a");
        registry.on_add(RowId::physical(0), &record_with("b", Value::Int(1)));
        assert_eq!(registry.get("a").unwrap().cardinality(), 0);
        registry.on_add(RowId::physical(1), &record_with("a", Value::Int(1)));
        assert_eq!(registry.get("a").unwrap().cardinality(), 1);
    }

    #[test]
    fn range_queries_respect_inclusivity() {
        let mut dim = Dimension::new("n");
        for i in 0..5 {
            dim.set(RowId::physical(i as u64), Value::Int(i));
        }
        assert_eq!(dim.rows_greater_than(&Value::Int(3), false).len(), 1);
        assert_eq!(dim.rows_greater_than(&Value::Int(3), true).len(), 2);
        assert_eq!(dim.rows_less_than(&Value::Int(1), false).len(), 1);
        assert_eq!(dim.rows_less_than(&Value::Int(1), true).len(), 2);
    }
}
