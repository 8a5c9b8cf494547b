//! Herd Cache - response caching middleware with stampede protection
//!
//! Caches handler responses per route with TTL expiration, LRU eviction,
//! tag invalidation and a per-key computation lock so that concurrent
//! misses run the handler once.

pub mod api;
pub mod cache;
pub mod compression;
pub mod config;
pub mod error;
pub mod key;
pub mod lock;
pub mod middleware;
pub mod models;
pub mod service;
pub mod tasks;
pub mod validator;

pub use api::{create_router, AppState};
pub use cache::{BoundedCache, CacheBackend, CachedResponse, MemoryBackend};
pub use config::Config;
pub use error::{CacheError, Result};
pub use key::{FieldSelection, KeyBuilder, KeyOptions, KeyRequest};
pub use lock::LockBehavior;
pub use middleware::{cache_layer, CacheMiddlewareState, RouteCacheOptions, RouteCacheTable};
pub use service::{CacheService, CacheStatus, SetOptions, X_CACHE};
pub use tasks::spawn_cleanup_task;
pub use validator::ValidatorCache;
