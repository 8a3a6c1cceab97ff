//! Cache Entry Module
//!
//! A cached value together with the collection it belongs to and when it was stored.

use chrono::Utc;

use crate::models::Collection;

// == Cache Entry ==
/// A single cache entry. Owned by the cache and never handed out.
#[derive(Debug, Clone)]
pub struct CacheEntry<V> {
    /// The stored value
    pub value: V,
    /// Insertion timestamp (Unix milliseconds)
    pub inserted_at: u64,
    /// Collection the key was derived from
    pub collection: Collection,
    /// Insertion counter, orders entries stored within the same millisecond
    pub sequence: u64,
}

impl<V> CacheEntry<V> {
    /// Creates an entry stamped with the current time.
    pub fn new(value: V, collection: Collection, sequence: u64) -> Self {
        Self {
            value,
            inserted_at: current_timestamp_ms(),
            collection,
            sequence,
        }
    }

    /// Milliseconds since insertion.
    pub fn age_ms(&self) -> u64 {
        current_timestamp_ms().saturating_sub(self.inserted_at)
    }

    // == Is Expired ==
    /// An entry is expired once its age is strictly greater than the TTL.
    pub fn is_expired(&self, ttl_ms: u64) -> bool {
        self.age_ms() > ttl_ms
    }

    /// Remaining lifetime in milliseconds, 0 once expired.
    pub fn ttl_remaining_ms(&self, ttl_ms: u64) -> u64 {
        ttl_ms.saturating_sub(self.age_ms())
    }

    /// Sort key for eviction: oldest insertion first.
    pub(crate) fn age_rank(&self) -> (u64, u64) {
        (self.inserted_at, self.sequence)
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn test_entry_creation() {
        let entry = CacheEntry::new("value", Collection::Projects, 7);

        assert_eq!(entry.value, "value");
        assert_eq!(entry.collection, Collection::Projects);
        assert_eq!(entry.sequence, 7);
        assert!(!entry.is_expired(1000));
    }

    #[test]
    fn test_entry_expiration() {
        let entry = CacheEntry::new("value", Collection::Projects, 0);

        sleep(Duration::from_millis(60));

        assert!(entry.is_expired(30));
        assert!(!entry.is_expired(60_000));
    }

    #[test]
    fn test_ttl_remaining() {
        let entry = CacheEntry::new("value", Collection::Comments, 0);

        let remaining = entry.ttl_remaining_ms(10_000);
        assert!(remaining <= 10_000);
        assert!(remaining >= 9_000);
    }

    #[test]
    fn test_expiration_boundary_condition() {
        let now = current_timestamp_ms();
        let entry = CacheEntry {
            value: (),
            inserted_at: now - 5_000,
            collection: Collection::Projects,
            sequence: 0,
        };

        assert!(!entry.is_expired(6_000));
        assert!(entry.is_expired(4_000));
        assert_eq!(entry.ttl_remaining_ms(4_000), 0);
    }
}
