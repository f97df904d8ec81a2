//! Bounded record queue and preview cache
//!
//! Neither structure ever blocks a producer. The record queue sacrifices its
//! oldest items on overflow and counts them; the preview cache keeps one
//! sample per address and evicts the first-inserted address when full.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Append-only FIFO with a logical read cursor
///
/// Drained or dropped slots are emptied in place and stay in the backing
/// vector until the consumed prefix is both larger than `compact_threshold`
/// and more than half of the vector, which keeps compaction cost amortized.
/// Every slot from the read cursor on holds an item.
#[derive(Debug)]
pub struct RecordQueue<T> {
    items: Vec<Option<T>>,
    read_index: usize,
    dropped: u64,
    max_items: usize,
    compact_threshold: usize,
}

impl<T> RecordQueue<T> {
    pub fn new(max_items: usize, compact_threshold: usize) -> Self {
        Self {
            items: Vec::new(),
            read_index: 0,
            dropped: 0,
            max_items: max_items.max(1),
            compact_threshold,
        }
    }

    /// Logical length
    pub fn len(&self) -> usize {
        self.items.len() - self.read_index
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items dropped by overflow since the last clear
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Physical length of the backing vector, drained prefix included
    pub fn physical_len(&self) -> usize {
        self.items.len()
    }

    /// Append an item, dropping the oldest ones past capacity
    pub fn push(&mut self, item: T) {
        self.items.push(Some(item));
        let overflow = self.len().saturating_sub(self.max_items);
        if overflow > 0 {
            let start = self.read_index;
            self.items[start..start + overflow]
                .iter_mut()
                .for_each(|slot| *slot = None);
            self.read_index += overflow;
            self.dropped += overflow as u64;
        }
        self.compact();
    }

    /// Remove up to `limit` items, oldest first
    pub fn pop_front(&mut self, limit: usize) -> Vec<T> {
        let count = limit.min(self.len());
        if count == 0 {
            return Vec::new();
        }
        let start = self.read_index;
        let out: Vec<T> = self.items[start..start + count]
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        self.read_index += count;
        self.compact();
        out
    }

    pub fn clear(&mut self) {
        self.items = Vec::new();
        self.read_index = 0;
        self.dropped = 0;
    }

    fn compact(&mut self) {
        if self.read_index <= self.compact_threshold {
            return;
        }
        if self.read_index * 2 <= self.items.len() {
            return;
        }
        self.items.drain(..self.read_index);
        self.read_index = 0;
    }
}

/// Latest-sample-per-key cache with insertion-order eviction
///
/// Overwriting an existing key keeps its original eviction position.
#[derive(Debug)]
pub struct PreviewCache<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    max_entries: usize,
}

impl<K, V> PreviewCache<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            max_entries: max_entries.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Insert or overwrite; returns the evicted key, if any
    pub fn insert(&mut self, key: K, value: V) -> Option<K> {
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        if self.entries.len() <= self.max_entries {
            return None;
        }
        let oldest = self.order.pop_front()?;
        self.entries.remove(&oldest);
        Some(oldest)
    }

    /// Remove up to `limit` entries in insertion order
    pub fn take_front(&mut self, limit: usize) -> Vec<V> {
        let mut out = Vec::with_capacity(limit.min(self.entries.len()));
        while out.len() < limit {
            let Some(key) = self.order.pop_front() else {
                break;
            };
            if let Some(value) = self.entries.remove(&key) {
                out.push(value);
            }
        }
        out
    }

    /// Keys in eviction order
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.order.iter()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}
