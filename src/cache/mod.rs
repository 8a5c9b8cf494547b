//! Cache Module
//!
//! Storage layer: the bounded recency cache, stored entries, the backend
//! trait and its in-memory implementation.

use std::time::Duration;

mod backend;
mod entry;
mod lru;
mod stats;
mod store;


// Re-export public types
pub use backend::{CacheBackend, LockToken};
pub use entry::{CacheEntry, CachedResponse};
pub use lru::BoundedCache;
pub use stats::CacheStats;
pub use store::{CacheStore, LockRecord, MemoryBackend};

// == Public Constants ==
/// Longest TTL an entry may be stored with; longer TTLs are clamped
pub const MAX_TTL: Duration = Duration::from_secs(86_400);

/// Interval between lookups while waiting on an in-flight computation
pub const POLL_INTERVAL: Duration = Duration::from_millis(50);
