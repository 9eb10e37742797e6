//! Byte-bounded in-memory LRU layer.

use std::collections::{BTreeMap, HashMap};

/// Least-recently-used cache bounded by the total size of stored bodies.
///
/// Recency is tracked with a monotonically increasing tick: `order` maps
/// tick -> key, so the first entry is always the eviction candidate.
#[derive(Debug)]
pub(crate) struct MemoryCache {
    capacity: usize,
    used: usize,
    tick: u64,
    entries: HashMap<String, MemoryEntry>,
    order: BTreeMap<u64, String>,
}

#[derive(Debug)]
struct MemoryEntry {
    body: Vec<u8>,
    tick: u64,
}

impl MemoryCache {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: 0,
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    /// Total bytes currently held.
    pub(crate) fn used(&self) -> usize {
        self.used
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up `key`, marking it most recently used.
    pub(crate) fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        self.order.remove(&entry.tick);
        entry.tick = tick;
        self.order.insert(tick, key.to_owned());
        Some(entry.body.clone())
    }

    /// Insert `body`, evicting least recently used entries until it fits.
    ///
    /// A body larger than the whole capacity is not retained.
    pub(crate) fn insert(&mut self, key: &str, body: &[u8]) {
        self.remove(key);
        if body.len() > self.capacity {
            return;
        }

        while self.used + body.len() > self.capacity {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some(evicted) = self.entries.remove(&oldest) {
                self.used -= evicted.body.len();
                tracing::debug!(
                    key = %oldest,
                    bytes = evicted.body.len(),
                    "Evicted from memory cache"
                );
            }
        }

        let tick = self.next_tick();
        self.used += body.len();
        self.order.insert(tick, key.to_owned());
        self.entries.insert(
            key.to_owned(),
            MemoryEntry {
                body: body.to_vec(),
                tick,
            },
        );
    }

    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.remove(key) {
            self.order.remove(&entry.tick);
            self.used -= entry.body.len();
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
