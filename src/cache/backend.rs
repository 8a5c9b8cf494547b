//! Cache Backend Trait
//!
//! The storage primitives the cache service consumes. The in-memory
//! [`MemoryBackend`](crate::cache::MemoryBackend) ships with the crate; a
//! distributed store implements the same trait and must make
//! [`CacheBackend::acquire_lock`] atomic on its side.

use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{CacheEntry, CacheStats};
use crate::error::Result;

/// Identifies one acquisition of a key lock. Only the holder of the
/// current token can release the lock.
pub type LockToken = u64;

/// Trait for cache store implementations
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Returns the live entry for `key`, or `None` when absent or expired
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Stores `entry` under `key`, replacing any previous entry
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()>;

    /// Removes `key`, returning whether it was present
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Atomically takes the computation lock for `key`.
    ///
    /// Returns a token only to the caller that obtained it. A lock older than
    /// `timeout` is abandoned and may be taken over under a new token.
    async fn acquire_lock(&self, key: &str, timeout: Duration) -> Result<Option<LockToken>>;

    /// Frees the computation lock for `key` if `token` still owns it
    async fn release_lock(&self, key: &str, token: LockToken) -> Result<()>;

    /// Removes every entry tagged with `tag`, returning how many were removed
    async fn invalidate_tag(&self, tag: &str) -> Result<usize>;

    /// Removes all entries
    async fn clear(&self) -> Result<()>;

    /// Drops expired entries and abandoned locks, returning the entry count removed
    async fn purge_expired(&self) -> Result<usize>;

    /// Storage statistics
    async fn stats(&self) -> Result<CacheStats>;

    /// Zeroes storage counters
    async fn reset_stats(&self) -> Result<()>;
}
