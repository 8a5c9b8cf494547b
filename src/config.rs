//! Configuration Module
//!
//! Handles loading plugin-wide cache configuration from environment variables.
//! Every value here can be overridden per route through the route table.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::lock::LockBehavior;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Default TTL for cached responses
    pub default_ttl: Duration,
    /// Bodies at least this many bytes long are stored compressed
    pub compression_threshold: usize,
    /// Prefix of every generated cache key
    pub key_prefix: String,
    /// Whether outcome counters are recorded
    pub enable_stats: bool,
    /// How long a computation lock lives, and how long waiters poll
    pub lock_timeout: Duration,
    /// Policy applied when a key's computation is already in flight
    pub lock_behavior: LockBehavior,
    /// Maximum number of entries the in-memory store can hold
    pub max_entries: usize,
    /// Larger response bodies are passed through without being cached
    pub max_response_bytes: usize,
    /// HTTP server port
    pub server_port: u16,
    /// Background cleanup task interval in seconds
    pub cleanup_interval: u64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_DEFAULT_TTL` - Default TTL in seconds (default: 300)
    /// - `CACHE_COMPRESSION_THRESHOLD` - Compression threshold in bytes (default: 1024)
    /// - `CACHE_KEY_PREFIX` - Key prefix (default: "cache")
    /// - `CACHE_ENABLE_STATS` - Record outcome counters (default: true)
    /// - `CACHE_LOCK_TIMEOUT_MS` - Lock timeout in milliseconds (default: 5000)
    /// - `CACHE_LOCK_BEHAVIOR` - `wait`, `bypass` or `fail` (default: wait)
    /// - `CACHE_MAX_ENTRIES` - Maximum cache entries (default: 1000)
    /// - `CACHE_MAX_RESPONSE_BYTES` - Largest cacheable body (default: 10 MiB)
    /// - `SERVER_PORT` - HTTP server port (default: 3000)
    /// - `CACHE_CLEANUP_INTERVAL` - Cleanup frequency in seconds (default: 1)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            default_ttl: parse_var::<u64>("CACHE_DEFAULT_TTL")
                .map(Duration::from_secs)
                .unwrap_or(defaults.default_ttl),
            compression_threshold: parse_var("CACHE_COMPRESSION_THRESHOLD")
                .unwrap_or(defaults.compression_threshold),
            key_prefix: env::var("CACHE_KEY_PREFIX")
                .ok()
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.key_prefix),
            enable_stats: parse_var("CACHE_ENABLE_STATS").unwrap_or(defaults.enable_stats),
            lock_timeout: parse_var::<u64>("CACHE_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            lock_behavior: parse_var("CACHE_LOCK_BEHAVIOR").unwrap_or(defaults.lock_behavior),
            max_entries: parse_var("CACHE_MAX_ENTRIES")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_entries),
            max_response_bytes: parse_var("CACHE_MAX_RESPONSE_BYTES")
                .unwrap_or(defaults.max_response_bytes),
            server_port: parse_var("SERVER_PORT").unwrap_or(defaults.server_port),
            cleanup_interval: parse_var("CACHE_CLEANUP_INTERVAL")
                .unwrap_or(defaults.cleanup_interval),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(300),
            compression_threshold: 1024,
            key_prefix: "cache".to_string(),
            enable_stats: true,
            lock_timeout: Duration::from_millis(5000),
            lock_behavior: LockBehavior::Wait,
            max_entries: 1000,
            max_response_bytes: 10 * 1024 * 1024,
            server_port: 3000,
            cleanup_interval: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.default_ttl, Duration::from_secs(300));
        assert_eq!(config.compression_threshold, 1024);
        assert_eq!(config.key_prefix, "cache");
        assert!(config.enable_stats);
        assert_eq!(config.lock_timeout, Duration::from_millis(5000));
        assert_eq!(config.lock_behavior, LockBehavior::Wait);
        assert_eq!(config.max_entries, 1000);
        assert_eq!(config.max_response_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn test_config_from_env_overrides() {
        env::set_var("CACHE_LOCK_BEHAVIOR", "fail");
        env::set_var("CACHE_LOCK_TIMEOUT_MS", "2500");
        env::set_var("CACHE_KEY_PREFIX", "api");

        let config = Config::from_env();
        assert_eq!(config.lock_behavior, LockBehavior::Fail);
        assert_eq!(config.lock_timeout, Duration::from_millis(2500));
        assert_eq!(config.key_prefix, "api");

        env::remove_var("CACHE_LOCK_BEHAVIOR");
        env::remove_var("CACHE_LOCK_TIMEOUT_MS");
        env::remove_var("CACHE_KEY_PREFIX");
    }
}
