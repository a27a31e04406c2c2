//! Thread-safe table of open handles.
//!
//! Drivers identify an open file by an opaque context value. The table maps
//! those ids to handle state, backed by `DashMap` for concurrent access.
//!
//! Lookups used on I/O paths should go through [`HandleTable::get_cloned`]
//! with `Arc` values, so no shard lock is held while a read blocks waiting
//! for a download.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};

/// Concurrent map from handle ids to handle values.
///
/// ```
/// use cloudmount_cache::HandleTable;
/// use std::sync::Arc;
///
/// let table: HandleTable<u64, Arc<String>> = HandleTable::new();
/// let id = table.insert_auto(Arc::new("/docs/a.txt".to_string()));
///
/// assert_eq!(table.get_cloned(&id).as_deref().map(String::as_str), Some("/docs/a.txt"));
/// assert!(table.remove(&id).is_some());
/// assert!(table.is_empty());
/// ```
#[derive(Debug)]
pub struct HandleTable<K, V>
where
    K: Eq + Hash,
{
    handles: DashMap<K, V>,
    /// Counter behind [`HandleTable::insert_auto`]; unused for other key types.
    next_id: AtomicU64,
}

impl<V> HandleTable<u64, V> {
    /// Attach `value` under the next free id and return that id.
    ///
    /// Ids start at 1. After the counter wraps, 0 and ids still held by
    /// open handles are skipped.
    pub fn insert_auto(&self, value: V) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(slot) = self.handles.entry(id) {
                slot.insert(value);
                return id;
            }
        }
    }
}

impl<K, V> HandleTable<K, V>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Clone the value out so the shard lock is released immediately.
    pub fn get_cloned(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.handles.get(key).map(|v| v.value().clone())
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.handles.remove(key).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Remove and return every value (used on unmount).
    pub fn drain(&self) -> Vec<V>
    where
        K: Clone,
    {
        let keys: Vec<K> = self.handles.iter().map(|e| e.key().clone()).collect();
        keys.iter().filter_map(|k| self.remove(k)).collect()
    }
}

impl<K, V> Default for HandleTable<K, V>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self::new()
    }
}
