//! Configuration Module
//!
//! Handles loading the server, cache and AI pipeline settings from environment variables.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::cache::{CacheConfig, CachePriority};
use crate::pipeline::{PipelineSettings, PollPolicy};

/// Server configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Cache time-to-live in milliseconds
    pub cache_ttl_ms: u64,
    /// Maximum number of entries the cache can hold
    pub cache_max_entries: usize,
    /// Cache priority hint
    pub cache_priority: CachePriority,
    /// HTTP server port
    pub server_port: u16,
    /// User id stamped on created and updated documents
    pub session_user: String,
    /// AI pipeline base URL
    pub pipeline_api_url: String,
    /// Bearer key for the AI pipeline
    pub pipeline_api_key: String,
    /// Account id the pipeline runs under
    pub pipeline_user_id: String,
    /// Saved pipeline to start
    pub pipeline_saved_item_id: String,
    /// Delay before the first status poll, in milliseconds
    pub poll_interval_ms: u64,
    /// Backoff ceiling, in milliseconds
    pub poll_max_interval_ms: u64,
    /// Maximum number of status polls per run
    pub poll_max_attempts: u32,
    /// Overall deadline per run, in seconds
    pub poll_max_duration_secs: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_TTL_MS` - Cache TTL in milliseconds (default: 300000)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 100)
    /// - `CACHE_PRIORITY` - `low`, `medium` or `high` (default: medium)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `SESSION_USER` - Creator/updater uid (default: anonymous)
    /// - `PIPELINE_API_URL`, `PIPELINE_API_KEY`, `PIPELINE_USER_ID`, `PIPELINE_SAVED_ITEM_ID`
    /// - `PIPELINE_POLL_INTERVAL_MS` (default: 1000), `PIPELINE_MAX_INTERVAL_MS` (default: 16000)
    /// - `PIPELINE_MAX_ATTEMPTS` (default: 60), `PIPELINE_MAX_DURATION_SECS` (default: 300)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_ttl_ms: env_or("CACHE_TTL_MS", defaults.cache_ttl_ms).max(1),
            cache_max_entries: env_or("CACHE_MAX_ENTRIES", defaults.cache_max_entries).max(1),
            cache_priority: env_or("CACHE_PRIORITY", defaults.cache_priority),
            server_port: env_or("SERVER_PORT", defaults.server_port),
            session_user: env::var("SESSION_USER").unwrap_or(defaults.session_user),
            pipeline_api_url: env::var("PIPELINE_API_URL").unwrap_or(defaults.pipeline_api_url),
            pipeline_api_key: env::var("PIPELINE_API_KEY").unwrap_or_default(),
            pipeline_user_id: env::var("PIPELINE_USER_ID").unwrap_or_default(),
            pipeline_saved_item_id: env::var("PIPELINE_SAVED_ITEM_ID").unwrap_or_default(),
            poll_interval_ms: env_or("PIPELINE_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            poll_max_interval_ms: env_or("PIPELINE_MAX_INTERVAL_MS", defaults.poll_max_interval_ms),
            poll_max_attempts: env_or("PIPELINE_MAX_ATTEMPTS", defaults.poll_max_attempts),
            poll_max_duration_secs: env_or(
                "PIPELINE_MAX_DURATION_SECS",
                defaults.poll_max_duration_secs,
            ),
        }
    }

    /// Cache settings for the data service.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(self.cache_ttl_ms, self.cache_max_entries, self.cache_priority)
    }

    /// Connection settings for the AI pipeline client.
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            base_url: self.pipeline_api_url.trim_end_matches('/').to_string(),
            api_key: self.pipeline_api_key.clone(),
            user_id: self.pipeline_user_id.clone(),
            saved_item_id: self.pipeline_saved_item_id.clone(),
        }
    }

    /// Polling bounds for analysis runs.
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy {
            initial_interval: Duration::from_millis(self.poll_interval_ms),
            max_interval: Duration::from_millis(self.poll_max_interval_ms),
            max_attempts: self.poll_max_attempts,
            max_duration: Duration::from_secs(self.poll_max_duration_secs),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 5 * 60 * 1000,
            cache_max_entries: 100,
            cache_priority: CachePriority::Medium,
            server_port: 3000,
            session_user: "anonymous".to_string(),
            pipeline_api_url: "https://api.gumloop.com/api/v1".to_string(),
            pipeline_api_key: String::new(),
            pipeline_user_id: String::new(),
            pipeline_saved_item_id: String::new(),
            poll_interval_ms: 1000,
            poll_max_interval_ms: 16_000,
            poll_max_attempts: 60,
            poll_max_duration_secs: 300,
        }
    }
}

/// Reads and parses an environment variable, falling back on absence or parse failure.
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
