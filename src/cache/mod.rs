//! Cache Module
//!
//! Bounded in-memory cache with lazy TTL expiry and insertion-order eviction.

mod entry;
mod key;
mod stats;
mod store;


use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry};
pub use key::CacheKey;
pub use stats::CacheStats;
pub use store::TtlCache;

// == Public Constants ==
/// Share of `max_entries` evicted when a new key would overflow the cache
pub const EVICTION_FRACTION: f64 = 0.1;

// == Cache Priority ==
/// Priority hint carried by the configuration.
///
/// Accepted and reported, never consulted when choosing what to evict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePriority {
    Low,
    #[default]
    Medium,
    High,
}

impl fmt::Display for CachePriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CachePriority::Low => "low",
            CachePriority::Medium => "medium",
            CachePriority::High => "high",
        };
        f.write_str(name)
    }
}

impl FromStr for CachePriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(CachePriority::Low),
            "medium" => Ok(CachePriority::Medium),
            "high" => Ok(CachePriority::High),
            other => Err(format!("unknown cache priority '{}'", other)),
        }
    }
}

// == Cache Config ==
/// Immutable settings of one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    /// Time-to-live in milliseconds, always > 0
    pub ttl_ms: u64,
    /// Capacity, always > 0
    pub max_entries: usize,
    pub priority: CachePriority,
}

impl CacheConfig {
    /// Creates a config, clamping zero TTL or capacity to 1.
    pub fn new(ttl_ms: u64, max_entries: usize, priority: CachePriority) -> Self {
        Self {
            ttl_ms: ttl_ms.max(1),
            max_entries: max_entries.max(1),
            priority,
        }
    }

    /// Number of entries dropped by one size-based eviction pass.
    pub fn eviction_batch(&self) -> usize {
        ((self.max_entries as f64 * EVICTION_FRACTION).ceil() as usize).max(1)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(5 * 60 * 1000, 100, CachePriority::Medium)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_batch_rounds_up() {
        assert_eq!(CacheConfig::new(1000, 10, CachePriority::Low).eviction_batch(), 1);
        assert_eq!(CacheConfig::new(1000, 11, CachePriority::Low).eviction_batch(), 2);
        assert_eq!(CacheConfig::new(1000, 100, CachePriority::Low).eviction_batch(), 10);
        assert_eq!(CacheConfig::new(1000, 1, CachePriority::Low).eviction_batch(), 1);
    }

    #[test]
    fn test_config_clamps_zero() {
        let config = CacheConfig::new(0, 0, CachePriority::High);
        assert_eq!(config.ttl_ms, 1);
        assert_eq!(config.max_entries, 1);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<CachePriority>(), Ok(CachePriority::High));
        assert!("urgent".parse::<CachePriority>().is_err());
    }
}
