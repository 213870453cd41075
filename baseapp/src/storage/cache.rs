use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, Mutex};

use crate::storage::{in_range, KVPair, SharedStore, Store, StoreIter};

/// One cached slot: a value or a tombstone, and whether it is a pending
/// write or a memoized clean read.
#[derive(Clone, Debug)]
struct CacheEntry {
    value: Option<Vec<u8>>,
    dirty: bool,
}

/// A copy-on-write overlay over a parent store.
///
/// Writes and deletes are buffered in memory and invisible to the parent
/// until [`CacheStore::write`] copies them through in one step. Reads
/// consult the buffer first and memoize parent results on a miss. Cache
/// stores nest: the per-transaction layer wraps the per-mode layer, which
/// wraps the committed multi-store, and each layer is flushed or discarded
/// as a unit.
///
/// Single-writer: the store is not safe to mutate from multiple threads,
/// which matches the one-lifecycle-call-at-a-time execution model.
pub struct CacheStore {
    parent: SharedStore,
    cache: BTreeMap<Vec<u8>, CacheEntry>,
}

impl CacheStore {
    pub fn new(parent: SharedStore) -> Self {
        Self { parent, cache: BTreeMap::new() }
    }

    /// Wraps a concrete store in a shared handle and caches over it.
    pub fn over(parent: impl Store + 'static) -> Self {
        Self::new(Arc::new(Mutex::new(parent)))
    }

    /// Copies every dirty entry to the parent in sorted key order, then
    /// drops the whole buffer, memoized clean reads included. A no-op on an
    /// empty cache.
    pub fn write(&mut self) {
        if self.cache.is_empty() {
            return;
        }

        let mut parent = self.parent.lock().expect("cache parent mutex poisoned");
        for (key, entry) in &self.cache {
            if !entry.dirty {
                continue;
            }
            match &entry.value {
                Some(value) => parent.set(key, value.clone()),
                None => parent.delete(key),
            }
        }
        drop(parent);
        self.cache.clear();
    }

    /// Number of buffered entries, dirty and clean.
    pub fn buffered(&self) -> usize {
        self.cache.len()
    }

    fn parent_range(&self, start: &Bound<Vec<u8>>, end: &Bound<Vec<u8>>) -> Vec<KVPair> {
        self.parent
            .lock()
            .expect("cache parent mutex poisoned")
            .iterator(start.clone(), end.clone())
            .collect()
    }

    /// Merges the parent range with cached entries: the cache shadows the
    /// parent on key collisions and tombstoned keys are dropped.
    fn merged_range(&mut self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> Vec<KVPair> {
        let parent_items = self.parent_range(&start, &end);
        let mut merged = Vec::with_capacity(parent_items.len());

        let mut cached = self
            .cache
            .iter()
            .filter(|(k, _)| in_range(k, &start, &end))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .peekable();

        for (key, value) in parent_items {
            while let Some((ck, _)) = cached.peek() {
                if *ck < key {
                    let (ck, cv) = cached.next().expect("peeked entry vanished");
                    if let Some(cv) = cv {
                        merged.push((ck, cv));
                    }
                } else {
                    break;
                }
            }

            match cached.peek() {
                Some((ck, _)) if *ck == key => {
                    let (ck, cv) = cached.next().expect("peeked entry vanished");
                    if let Some(cv) = cv {
                        merged.push((ck, cv));
                    }
                }
                _ => merged.push((key, value)),
            }
        }

        for (ck, cv) in cached {
            if let Some(cv) = cv {
                merged.push((ck, cv));
            }
        }

        merged
    }
}

impl Store for CacheStore {
    fn get(&mut self, key: &[u8]) -> Option<Vec<u8>> {
        if let Some(entry) = self.cache.get(key) {
            return entry.value.clone();
        }

        let value = self.parent.lock().expect("cache parent mutex poisoned").get(key);
        self.cache.insert(key.to_vec(), CacheEntry { value: value.clone(), dirty: false });
        value
    }

    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.cache.insert(key.to_vec(), CacheEntry { value: Some(value), dirty: true });
    }

    fn delete(&mut self, key: &[u8]) {
        self.cache.insert(key.to_vec(), CacheEntry { value: None, dirty: true });
    }

    fn iterator(&mut self, start: Bound<Vec<u8>>, end: Bound<Vec<u8>>) -> StoreIter {
        StoreIter::new(self.merged_range(start, end))
    }
}
