//! Cache Store Module
//!
//! `TtlCache` maps opaque keys to values with a fixed capacity and time-to-live.
//! Expiry is checked on read; there is no background sweep.

use std::collections::HashMap;

use tracing::debug;

use crate::cache::{CacheConfig, CacheEntry, CacheKey, CacheStats};
use crate::models::Collection;

// == TTL Cache ==
/// Bounded cache with lazy expiry and insertion-order eviction.
///
/// Eviction drops the oldest inserted entries, not the least recently read:
/// reads never refresh an entry's position.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,
    config: CacheConfig,
    stats: CacheStats,
    next_sequence: u64,
}

impl<V: Clone> TtlCache<V> {
    // == Constructor ==
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            stats: CacheStats::new(),
            next_sequence: 0,
        }
    }

    // == Set ==
    /// Inserts or overwrites `key` with a fresh timestamp.
    ///
    /// When a new key would push the cache past `max_entries`, the oldest
    /// `ceil(max_entries * 0.1)` entries are evicted first. Never fails.
    pub fn set(&mut self, key: CacheKey, value: V) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_entries {
            self.evict_oldest(self.config.eviction_batch());
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let collection = key.collection();
        self.entries
            .insert(key, CacheEntry::new(value, collection, sequence));
        self.stats.set_total_entries(self.entries.len());
    }

    // == Get ==
    /// Returns the value if present and not expired.
    ///
    /// An expired entry is removed here and reported as absent.
    pub fn get(&mut self, key: &CacheKey) -> Option<V> {
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_expired(self.config.ttl_ms) => true,
            Some(entry) => {
                self.stats.record_hit();
                return Some(entry.value.clone());
            }
            None => false,
        };

        if expired {
            self.entries.remove(key);
            self.stats.record_expiration();
            self.stats.set_total_entries(self.entries.len());
            debug!("Cache entry expired: {}", key);
        }
        self.stats.record_miss();
        None
    }

    // == Invalidate ==
    /// Removes `key`, or every entry of `collection` when no key is given.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate(&mut self, collection: Collection, key: Option<&CacheKey>) -> usize {
        let removed = match key {
            Some(key) => usize::from(self.entries.remove(key).is_some()),
            None => {
                let before = self.entries.len();
                self.entries.retain(|_, entry| entry.collection != collection);
                before - self.entries.len()
            }
        };
        self.finish_removal(removed)
    }

    /// Removes the entries of `collection` whose value matches `predicate`.
    pub fn invalidate_if<F>(&mut self, collection: Collection, predicate: F) -> usize
    where
        F: Fn(&V) -> bool,
    {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.collection != collection || !predicate(&entry.value));
        let removed = before - self.entries.len();
        self.finish_removal(removed)
    }

    // == Clear ==
    pub fn clear(&mut self) {
        let removed = self.entries.len();
        self.entries.clear();
        self.finish_removal(removed);
    }

    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if `key` is stored, without checking expiry or touching stats.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    fn evict_oldest(&mut self, count: usize) {
        let mut ranked: Vec<(CacheKey, (u64, u64))> = self
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.age_rank()))
            .collect();
        ranked.sort_unstable_by_key(|(_, rank)| *rank);

        let evicted = ranked.len().min(count);
        for (key, _) in ranked.into_iter().take(count) {
            self.entries.remove(&key);
        }

        self.stats.record_evictions(evicted);
        debug!(
            "Cache full ({} max): evicted {} oldest entries",
            self.config.max_entries, evicted
        );
    }

    fn finish_removal(&mut self, removed: usize) -> usize {
        if removed > 0 {
            self.stats.record_invalidations(removed);
        }
        self.stats.set_total_entries(self.entries.len());
        removed
    }
}
