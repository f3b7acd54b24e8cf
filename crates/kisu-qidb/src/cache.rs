//! Insertion-ordered quick-access cache.

use std::collections::{BTreeMap, HashMap};

use kisu_types::ItemList;

struct CacheEntry {
    seq: u64,
    value: ItemList,
}

/// Entries keyed by full key, remembered in insertion order.
///
/// Re-inserting a key moves it to the back. Size is only bounded when
/// [`evict_to`](QuickCache::evict_to) is called, which the flush loop does
/// once per tick.
#[derive(Default)]
pub struct QuickCache {
    entries: HashMap<String, CacheEntry>,
    order: BTreeMap<u64, String>,
    next_seq: u64,
}

impl QuickCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&ItemList> {
        self.entries.get(key).map(|e| &e.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert `value` as the newest entry, replacing any previous one.
    pub fn insert(&mut self, key: String, value: ItemList) {
        self.remove(&key);
        self.next_seq += 1;
        let seq = self.next_seq;
        self.order.insert(seq, key.clone());
        self.entries.insert(key, CacheEntry { seq, value });
    }

    pub fn remove(&mut self, key: &str) -> Option<ItemList> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry.value)
    }

    /// Drop the oldest entries until at most `limit` remain.
    ///
    /// Returns the evicted keys, oldest first.
    pub fn evict_to(&mut self, limit: usize) -> Vec<String> {
        let mut evicted = Vec::new();
        while self.entries.len() > limit {
            let Some((_, key)) = self.order.pop_first() else {
                break;
            };
            self.entries.remove(&key);
            evicted.push(key);
        }
        evicted
    }

    /// Keys from oldest to newest.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.values().map(String::as_str)
    }
}

impl std::fmt::Debug for QuickCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuickCache")
            .field("len", &self.entries.len())
            .finish()
    }
}
