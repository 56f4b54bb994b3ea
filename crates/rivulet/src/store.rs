//! The record store (spec.md §4.1): an append-mostly buffer of records
//! keyed by physical row id, plus a live-set bitmap. Removed rows are
//! tombstoned, not reclaimed, so that late-arriving deltas referencing a
//! since-removed row id can still resolve against the original record.

use rivulet_repr::{PhysicalId, Record};

/// Append-only record buffer with a parallel live-set bitmap.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Record>,
    live: Vec<bool>,
}

impl RecordStore {
    pub fn new() -> RecordStore {
        RecordStore::default()
    }

    /// Stores `record`, assigns it the next monotone physical id, and marks
    /// it live. The id is never reused, even after `remove`.
    pub fn add(&mut self, record: Record) -> PhysicalId {
        let id = self.records.len() as PhysicalId;
        self.records.push(record);
        self.live.push(true);
        id
    }

    /// Clears the live bit for `id`. Returns `false` if `id` was already
    /// tombstoned or never minted — never an error (spec.md §7 "Invalid row
    /// id").
    pub fn remove(&mut self, id: PhysicalId) -> bool {
        match self.live.get_mut(id as usize) {
            Some(bit) if *bit => {
                *bit = false;
                true
            }
            _ => false,
        }
    }

    pub fn is_live(&self, id: PhysicalId) -> bool {
        self.live.get(id as usize).copied().unwrap_or(false)
    }

    /// Reads the stored record regardless of live-set membership, per the
    /// tombstoning contract.
    pub fn get(&self, id: PhysicalId) -> Option<&Record> {
        self.records.get(id as usize)
    }

    pub fn iter_live(&self) -> impl Iterator<Item = PhysicalId> + '_ {
        self.live
            .iter()
            .enumerate()
            .filter(|(_, bit)| **bit)
            .map(|(id, _)| id as PhysicalId)
    }

    pub fn live_count(&self) -> usize {
        self.live.iter().filter(|bit| **bit).count()
    }

    pub fn total_count(&self) -> usize {
        self.records.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        self.live.clear();
    }
}

#[cfg(test)]
mod tests {
    use rivulet_repr::Record;

    use super::*;

    #[test]
    fn add_assigns_monotone_ids_and_marks_live() {
        let mut store = RecordStore::new();
        let a = store.add(Record::empty());
        let b = store.add(Record::empty());
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert!(store.is_live(a));
        assert!(store.is_live(b));
        assert_eq!(store.live_count(), 2);
    }

    #[test]
    fn remove_tombstones_without_reclaiming() {
        let mut store = RecordStore::new();
        let id = store.add(Record::empty());
        assert!(store.remove(id));
        assert!(!store.is_live(id));
        assert!(store.get(id).is_some());
        assert_eq!(store.live_count(), 0);
        assert_eq!(store.total_count(), 1);
    }

    #[test]
    fn remove_is_false_for_unknown_or_already_removed() {
        let mut store = RecordStore::new();
        assert!(!store.remove(0));
        let id = store.add(Record::empty());
        assert!(store.remove(id));
        assert!(!store.remove(id));
    }

    #[test]
    fn iter_live_skips_tombstones() {
        let mut store = RecordStore::new();
        let a = store.add(Record::empty());
        let b = store.add(Record::empty());
        store.remove(a);
        let live: Vec<_> = store.iter_live().collect();
        assert_eq!(live, vec![b]);
    }
}
