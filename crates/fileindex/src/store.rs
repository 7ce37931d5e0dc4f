//! The snapshot cache.
//!
//! `CacheStore` owns one `Arc<Snapshot>` behind a `RwLock`. Readers clone the
//! `Arc` (or do a point lookup) under the read lock; `replace` builds nothing
//! under the write lock and only swaps the pointer. A reader therefore always
//! sees one complete cycle.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

use crate::error::{IndexError, Result};
use crate::types::Entry;

/// Map from cache key to entry. `BTreeMap` keeps enumeration order stable.
pub type EntryMap = BTreeMap<String, Arc<Entry>>;

/// An immutable, published index plus the cycle that published it.
#[derive(Debug, Default)]
pub struct Snapshot {
    cycle: u64,
    entries: EntryMap,
}

impl Snapshot {
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    /// Cycle in millisecond units, for freshness headers.
    pub fn cycle_millis(&self) -> u64 {
        self.cycle / 1_000_000
    }

    pub fn get(&self, key: &str) -> Option<&Arc<Entry>> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in cache-key order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Entry>> {
        self.entries.values()
    }

    pub fn entries(&self) -> &EntryMap {
        &self.entries
    }

    /// Builds an unpublished snapshot, for tests and tooling.
    pub fn from_entries(cycle: u64, entries: impl IntoIterator<Item = Entry>) -> Self {
        Self {
            cycle,
            entries: entries
                .into_iter()
                .map(|entry| (entry.key(), Arc::new(entry)))
                .collect(),
        }
    }
}

/// Holds the current snapshot. The only mutation path is [`CacheStore::replace`].
#[derive(Debug, Default)]
pub struct CacheStore {
    current: RwLock<Arc<Snapshot>>,
}

impl CacheStore {
    /// Creates an empty store at cycle 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Point lookup by cache key.
    pub fn get(&self, key: &str) -> Result<Arc<Entry>> {
        self.current
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| IndexError::NotFound(key.to_string()))
    }

    /// Returns the current snapshot. Holding the returned `Arc` pins that cycle.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.current.read().clone()
    }

    pub fn cycle(&self) -> u64 {
        self.current.read().cycle
    }

    pub fn cycle_millis(&self) -> u64 {
        self.current.read().cycle_millis()
    }

    pub fn len(&self) -> usize {
        self.current.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }

    /// Publishes `entries` as a new snapshot and returns its cycle.
    ///
    /// The cycle comes from the nanosecond clock and is bumped past the
    /// previous one when the clock has not advanced (or went backwards).
    pub fn replace(&self, entries: EntryMap) -> u64 {
        let mut current = self.current.write();
        let cycle = unix_now_nanos().max(current.cycle + 1);
        *current = Arc::new(Snapshot { cycle, entries });
        cycle
    }
}

/// Returns the current Unix timestamp in nanoseconds.
pub fn unix_now_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| u64::try_from(value.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::thread;

    fn entry(name: &str, modified_at: i64) -> Entry {
        Entry {
            name: name.to_string(),
            size: 0,
            absolute_dir: PathBuf::from("/srv"),
            relative_path: "/".to_string(),
            is_directory: false,
            modified_at,
            content_type: String::new(),
        }
    }

    fn map(entries: &[Entry]) -> EntryMap {
        entries
            .iter()
            .map(|entry| (entry.key(), Arc::new(entry.clone())))
            .collect()
    }

    #[test]
    fn new_store_is_empty() {
        let store = CacheStore::new();
        assert_eq!(store.cycle(), 0);
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert!(store.get("/missing").unwrap_err().is_not_found());
    }

    #[test]
    fn replace_publishes_whole_map() {
        let store = CacheStore::new();
        store.replace(map(&[entry("a.txt", 1), entry("b.txt", 2)]));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("/a.txt").unwrap().modified_at, 1);

        store.replace(map(&[entry("c.txt", 3)]));
        assert_eq!(store.len(), 1);
        assert!(store.get("/a.txt").is_err());
        assert_eq!(store.get("/c.txt").unwrap().name, "c.txt");
    }

    #[test]
    fn cycle_strictly_increases() {
        let store = CacheStore::new();
        let mut last = store.cycle();
        for _ in 0..100 {
            let next = store.replace(EntryMap::new());
            assert!(next > last);
            assert_eq!(store.cycle(), next);
            last = next;
        }
    }

    #[test]
    fn held_snapshot_is_unaffected_by_replace() {
        let store = CacheStore::new();
        store.replace(map(&[entry("old.txt", 1)]));
        let pinned = store.snapshot();

        store.replace(map(&[entry("new.txt", 2)]));
        assert!(pinned.get("/old.txt").is_some());
        assert!(pinned.get("/new.txt").is_none());
        assert!(store.snapshot().get("/new.txt").is_some());
        assert!(pinned.cycle() < store.cycle());
    }

    #[test]
    fn independent_stores_do_not_share_state() {
        let first = CacheStore::new();
        let second = CacheStore::new();
        first.replace(map(&[entry("a.txt", 1)]));
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 0);
    }

    #[test]
    fn readers_never_observe_mixed_cycles() {
        let store = Arc::new(CacheStore::new());
        let writer_store = store.clone();
        let writer = thread::spawn(move || {
            for round in 0..200i64 {
                let entries: Vec<Entry> = (0..20)
                    .map(|i| entry(&format!("f{i}.txt"), round))
                    .collect();
                writer_store.replace(map(&entries));
            }
        });

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                thread::spawn(move || {
                    let mut last_cycle = 0;
                    for _ in 0..500 {
                        let snapshot = store.snapshot();
                        assert!(snapshot.cycle() >= last_cycle);
                        last_cycle = snapshot.cycle();
                        let mut rounds = snapshot.iter().map(|entry| entry.modified_at);
                        if let Some(first) = rounds.next() {
                            assert!(rounds.all(|round| round == first));
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
    }
}
