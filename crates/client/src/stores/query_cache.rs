//! In-memory query cache keyed by [`QueryKey`].
//!
//! Entries are JSON values fetched by the application. Invalidation does not
//! drop data: it marks every covered entry stale so readers can keep showing
//! the last value while they re-fetch.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use pulse_shared::QueryKey;
use tokio::sync::watch;

use super::CacheInvalidator;

/// A cached value together with its freshness.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuery {
    pub value: serde_json::Value,
    pub stale: bool,
}

/// Thread-safe, cloneable handle to a shared query cache.
#[derive(Clone)]
pub struct QueryCache {
    entries: Arc<RwLock<HashMap<QueryKey, CachedQuery>>>,
    /// Bumped on every invalidation that hit at least one entry.
    generation: Arc<watch::Sender<u64>>,
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryCache {
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(generation),
        }
    }

    /// The fresh value for `key`, or `None` if missing or stale.
    pub fn get(&self, key: &QueryKey) -> Option<serde_json::Value> {
        self.entry(key)
            .filter(|entry| !entry.stale)
            .map(|entry| entry.value)
    }

    /// The value for `key` regardless of freshness.
    pub fn entry(&self, key: &QueryKey) -> Option<CachedQuery> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Store a freshly fetched value.
    pub fn set(&self, key: QueryKey, value: serde_json::Value) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, CachedQuery { value, stale: false });
    }

    /// Missing entries count as stale: there is nothing fresh to show.
    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.entry(key).map_or(true, |entry| entry.stale)
    }

    /// Mark `key` and every key nested below it stale.
    ///
    /// Returns how many entries went from fresh to stale.
    pub fn mark_stale(&self, key: &QueryKey) -> usize {
        let mut touched = 0;
        {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            for (cached_key, entry) in entries.iter_mut() {
                if key.covers(cached_key) && !entry.stale {
                    entry.stale = true;
                    touched += 1;
                }
            }
        }

        if touched > 0 {
            self.generation.send_modify(|generation| *generation += 1);
        }
        touched
    }

    /// Keys currently marked stale, sorted.
    pub fn stale_keys(&self) -> Vec<QueryKey> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<_> = entries
            .iter()
            .filter(|(_, entry)| entry.stale)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn generation(&self) -> u64 {
        *self.generation.borrow()
    }

    /// Receiver notified whenever an invalidation marks something stale.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

impl CacheInvalidator for QueryCache {
    fn invalidate(&self, key: &QueryKey) {
        let touched = self.mark_stale(key);
        crate::log_debug!(key = key, touched = touched; "Invalidated cached queries");
    }
}
