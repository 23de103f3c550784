//! Bounded least-recently-used cache.
//!
//! Recency is tracked with a monotonic stamp per access and an `(key, stamp)`
//! log. Stale log entries are skipped lazily during eviction, so `get` and
//! `put` are amortized O(1) without a linked list.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

struct Entry<V> {
    value: V,
    last_used: u64,
}

pub struct LruCache<K, V> {
    capacity: usize,
    clock: u64,
    entries: HashMap<K, Entry<V>>,
    access_log: VecDeque<(K, u64)>,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Create a cache holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            clock: 0,
            entries: HashMap::with_capacity(capacity),
            access_log: VecDeque::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Membership check that does not count as a use.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Look up a value and mark it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        let stamp = self.tick();
        let entry = self.entries.get_mut(key)?;
        entry.last_used = stamp;
        self.access_log.push_back((key.clone(), stamp));
        self.compact_if_needed();
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Insert or replace a value, evicting the least recently used entry
    /// when over capacity.
    pub fn put(&mut self, key: K, value: V) {
        let stamp = self.tick();
        self.access_log.push_back((key.clone(), stamp));
        self.entries.insert(
            key,
            Entry {
                value,
                last_used: stamp,
            },
        );
        self.evict_if_needed();
        self.compact_if_needed();
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.access_log.clear();
    }

    fn tick(&mut self) -> u64 {
        self.clock = self.clock.wrapping_add(1);
        self.clock
    }

    fn evict_if_needed(&mut self) {
        while self.entries.len() > self.capacity {
            let Some((key, stamp)) = self.access_log.pop_front() else {
                break;
            };
            // Only the newest log entry for a key reflects its recency
            if self
                .entries
                .get(&key)
                .is_some_and(|entry| entry.last_used == stamp)
            {
                self.entries.remove(&key);
            }
        }
    }

    /// Drop superseded log entries once the log outgrows the cache.
    fn compact_if_needed(&mut self) {
        if self.access_log.len() <= self.capacity.saturating_mul(2).max(16) {
            return;
        }
        let entries = &self.entries;
        self.access_log.retain(|(key, stamp)| {
            entries
                .get(key)
                .is_some_and(|entry| entry.last_used == *stamp)
        });
    }
}
