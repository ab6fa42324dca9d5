//! Small expiring cache used for the per-tick score cache and the
//! in-process game-data cache.
//!
//! Entries carry their own expiry; [`TtlCache::get`] never returns a stale
//! value. Removal goes through [`TtlCache::invalidate_where`] (or its
//! single-key shorthand), which is the only invalidation path.

use crate::clock::Clock;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

struct Entry<V> {
    value: V,
    expires_at: DateTime<Utc>,
}

pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    ttl: chrono::Duration,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero()),
            clock,
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone())
    }

    pub fn insert(&mut self, key: K, value: V) {
        let now = self.clock.now();
        // Opportunistic sweep keeps the map from growing with dead keys.
        self.entries.retain(|_, e| e.expires_at > now);
        self.entries.insert(
            key,
            Entry {
                value,
                expires_at: now + self.ttl,
            },
        );
    }

    /// Remove every entry whose key matches `pred`.
    pub fn invalidate_where(&mut self, pred: impl Fn(&K) -> bool) {
        self.entries.retain(|k, _| !pred(k));
    }

    pub fn invalidate(&mut self, key: &K) {
        self.invalidate_where(|k| k == key);
    }

    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.values().filter(|e| e.expires_at > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
