//! In-memory record table of a [`DatabaseMap`](crate::DatabaseMap).

use std::collections::{BTreeMap, HashMap};

struct Record<T> {
    /// Where the key sits in iteration order. Kept when the value is replaced.
    position: u64,
    /// Stamp of the latest write.
    generation: u64,
    value: T,
}

/// Records in first-insertion order, each stamped with the generation of its
/// latest write.
pub(crate) struct Records<T> {
    entries: HashMap<String, Record<T>>,
    order: BTreeMap<u64, String>,
    next: u64,
}

impl<T> Records<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key).map(|r| &r.value)
    }

    pub(crate) fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub(crate) fn generation(&self, key: &str) -> Option<u64> {
        self.entries.get(key).map(|r| r.generation)
    }

    /// Insert or replace. Returns the new generation of `key`.
    pub(crate) fn insert(&mut self, key: String, value: T) -> u64 {
        let generation = self.next;
        self.next += 1;
        match self.entries.get_mut(&key) {
            Some(record) => {
                record.generation = generation;
                record.value = value;
            }
            None => {
                self.order.insert(generation, key.clone());
                self.entries.insert(
                    key,
                    Record {
                        position: generation,
                        generation,
                        value,
                    },
                );
            }
        }
        generation
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<T> {
        let record = self.entries.remove(key)?;
        self.order.remove(&record.position);
        Some(record.value)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    /// Entries in insertion order.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.order
            .values()
            .filter_map(|key| self.entries.get(key).map(|r| (key, &r.value)))
    }

    /// Keys with their current generation, in insertion order.
    pub(crate) fn stamped_keys(&self) -> Vec<(String, u64)> {
        self.order
            .values()
            .filter_map(|key| self.entries.get(key).map(|r| (key.clone(), r.generation)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys<T>(records: &Records<T>) -> Vec<&str> {
        records.iter().map(|(k, _)| k.as_str()).collect()
    }

    #[test]
    fn iterates_in_first_insertion_order() {
        let mut records = Records::new();
        records.insert("b".into(), 1);
        records.insert("a".into(), 2);
        records.insert("c".into(), 3);
        records.insert("b".into(), 4);
        assert_eq!(keys(&records), vec!["b", "a", "c"]);
        assert_eq!(records.get("b"), Some(&4));
    }

    #[test]
    fn reinsert_after_remove_goes_last() {
        let mut records = Records::new();
        records.insert("a".into(), 1);
        records.insert("b".into(), 2);
        assert_eq!(records.remove("a"), Some(1));
        assert_eq!(records.remove("a"), None);
        records.insert("a".into(), 3);
        assert_eq!(keys(&records), vec!["b", "a"]);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn every_write_bumps_the_generation() {
        let mut records = Records::new();
        let first = records.insert("k".into(), 1);
        let second = records.insert("k".into(), 1);
        assert!(second > first);
        assert_eq!(records.generation("k"), Some(second));
        assert_eq!(records.stamped_keys(), vec![("k".to_string(), second)]);
    }

    #[test]
    fn clear_empties_both_indexes() {
        let mut records = Records::new();
        records.insert("a".into(), 1);
        records.clear();
        assert_eq!(records.len(), 0);
        assert!(!records.contains("a"));
        assert_eq!(records.iter().count(), 0);
    }
}
