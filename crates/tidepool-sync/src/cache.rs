//! Keyed snapshot cache with TTL reads.
//!
//! One store is shared by every collection key and record type. Entries are
//! whole-collection snapshots: a write always replaces the entire entry, and
//! a read never returns an entry older than the caller's TTL.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use tidepool_store::Record;

/// A cached snapshot and when it was written.
struct CacheEntry {
    /// `Arc<Vec<T>>` for the record type the key was written with.
    data: Arc<dyn Any + Send + Sync>,
    len: usize,
    timestamp: Instant,
}

/// Diagnostic view of one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntryStats {
    pub key: String,
    pub age: Duration,
    pub len: usize,
}

/// Diagnostic view of the whole store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub size: usize,
    pub entries: Vec<CacheEntryStats>,
}

/// Process-wide snapshot cache.
///
/// Construct one per session and pass it to consumers; call
/// [`CacheStore::invalidate_all`] on sign-out.
pub struct CacheStore {
    entries: DashMap<String, CacheEntry>,
}

impl CacheStore {
    /// Create a new empty cache.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: DashMap::new(),
        })
    }

    /// Read the snapshot for `key` if it is younger than `ttl`.
    ///
    /// Stale entries are left in place; the next write replaces them.
    pub fn read<T: Record>(&self, key: &str, ttl: Duration) -> Option<Arc<Vec<T>>> {
        let entry = self.entries.get(key)?;
        let age = entry.timestamp.elapsed();
        if age >= ttl {
            debug!(key = %key, ?age, ?ttl, "cache entry stale");
            return None;
        }
        let snapshot = downcast::<T>(key, &entry.data)?;
        trace!(key = %key, ?age, count = snapshot.len(), "cache hit");
        Some(snapshot)
    }

    /// The newest snapshot for `key`, whatever its age.
    pub fn latest<T: Record>(&self, key: &str) -> Option<Arc<Vec<T>>> {
        let entry = self.entries.get(key)?;
        downcast::<T>(key, &entry.data)
    }

    /// Replace the entry for `key` with a fresh snapshot.
    pub fn write<T: Record>(&self, key: &str, data: Vec<T>) -> Arc<Vec<T>> {
        let snapshot = Arc::new(data);
        self.write_shared(key, Arc::clone(&snapshot));
        snapshot
    }

    /// Replace the entry for `key` with an already shared snapshot.
    pub fn write_shared<T: Record>(&self, key: &str, snapshot: Arc<Vec<T>>) {
        let len = snapshot.len();
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data: snapshot,
                len,
                timestamp: Instant::now(),
            },
        );
        debug!(key = %key, count = len, "cache entry written");
    }

    /// Remove the entry for `key`.
    pub fn invalidate(&self, key: &str) {
        if self.entries.remove(key).is_some() {
            debug!(key = %key, "cache entry invalidated");
        }
    }

    /// Remove every entry.
    pub fn invalidate_all(&self) {
        let size = self.entries.len();
        self.entries.clear();
        debug!(size, "cache cleared");
    }

    /// Whether an entry exists for `key`, fresh or stale.
    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Snapshot of sizes and ages, sorted by key.
    pub fn stats(&self) -> CacheStats {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|entry| CacheEntryStats {
                key: entry.key().clone(),
                age: entry.value().timestamp.elapsed(),
                len: entry.value().len,
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        CacheStats {
            size: entries.len(),
            entries,
        }
    }
}

fn downcast<T: Record>(key: &str, data: &Arc<dyn Any + Send + Sync>) -> Option<Arc<Vec<T>>> {
    match Arc::clone(data).downcast::<Vec<T>>() {
        Ok(snapshot) => Some(snapshot),
        Err(_) => {
            warn!(
                key = %key,
                expected = std::any::type_name::<T>(),
                "cache entry holds a different record type"
            );
            None
        }
    }
}
