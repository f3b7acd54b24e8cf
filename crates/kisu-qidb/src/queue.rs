//! Deduplicated FIFO of entries waiting to be written out.

use std::collections::VecDeque;

use kisu_types::ItemList;

/// An entry waiting in the save queue.
#[derive(Clone, Debug, PartialEq)]
pub struct QueuedEntry {
    pub key: String,
    pub value: ItemList,
    /// Scheduler tick at which the entry was queued.
    pub enqueued_at: u64,
}

/// FIFO across keys holding at most one entry per key.
#[derive(Debug, Default)]
pub struct SaveQueue {
    entries: VecDeque<QueuedEntry>,
}

impl SaveQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue `value` at the back, dropping any entry already queued for
    /// `key`. Returns `true` if an older entry was replaced.
    pub fn enqueue(&mut self, key: String, value: ItemList, tick: u64) -> bool {
        let replaced = self.remove(&key).is_some();
        self.entries.push_back(QueuedEntry {
            key,
            value,
            enqueued_at: tick,
        });
        replaced
    }

    pub fn pop_front(&mut self) -> Option<QueuedEntry> {
        self.entries.pop_front()
    }

    pub fn get(&self, key: &str) -> Option<&QueuedEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<QueuedEntry> {
        let index = self.entries.iter().position(|e| e.key == key)?;
        self.entries.remove(index)
    }

    /// Tick of the oldest queued entry.
    pub fn oldest_tick(&self) -> Option<u64> {
        self.entries.iter().map(|e| e.enqueued_at).min()
    }
}
