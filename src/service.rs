//! Cache Service
//!
//! The protocol surface the middleware consumes: lookup, lock-on-miss,
//! contention policy, store and release. Backend faults never escape as
//! request failures; they degrade to an uncached computation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::{
    CacheBackend, CacheEntry, CacheStats, CachedResponse, LockToken, MemoryBackend, MAX_TTL,
    POLL_INTERVAL,
};
use crate::compression;
use crate::config::Config;
use crate::error::Result;
use crate::key::KeyBuilder;
use crate::lock::{LockBehavior, LockGuard};

/// Response header carrying the cache outcome.
pub const X_CACHE: &str = "x-cache";

// == Cache Status ==
/// Outcome reported in the `x-cache` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
    Wait,
    Bypass,
}

impl CacheStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::Miss => "MISS",
            Self::Wait => "WAIT",
            Self::Bypass => "BYPASS",
        }
    }
}

// == Set Options ==
/// Storage options for one entry.
#[derive(Debug, Clone, Default)]
pub struct SetOptions {
    /// Compress the body when it reaches the compression threshold
    pub compress: bool,
    pub tags: Vec<String>,
}

// == Resolution ==
/// What the caller must do for a key after lookup and lock attempt.
#[derive(Debug)]
pub enum Resolution {
    /// A live stored value
    Hit(CachedResponse),
    /// The value computed by the lock holder, obtained while waiting
    Waited(CachedResponse),
    /// Run the handler
    Compute(Computation),
    /// `fail` policy: the key is being computed elsewhere
    Rejected { retry_after_secs: u64 },
}

/// A handler run the caller must perform.
#[derive(Debug)]
pub struct Computation {
    /// Held lock, released by the caller after storing
    pub guard: Option<LockGuard>,
    /// Header value for the response
    pub status: CacheStatus,
    /// Whether a 2xx result should be stored
    pub store: bool,
}

impl Computation {
    fn locked(guard: LockGuard) -> Self {
        Self {
            guard: Some(guard),
            status: CacheStatus::Miss,
            store: true,
        }
    }

    fn unguarded(status: CacheStatus, store: bool) -> Self {
        Self {
            guard: None,
            status,
            store,
        }
    }

    /// Releases the lock if one is held.
    pub async fn release(self) {
        if let Some(guard) = self.guard {
            guard.release().await;
        }
    }
}

// == Outcome Counters ==
#[derive(Debug, Default)]
struct OutcomeCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    waits: AtomicU64,
    bypasses: AtomicU64,
    rejections: AtomicU64,
    backend_errors: AtomicU64,
}

/// Snapshot of the service's outcome counters and storage statistics.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServiceStats {
    pub hits: u64,
    pub misses: u64,
    pub waits: u64,
    pub bypasses: u64,
    pub rejections: u64,
    pub backend_errors: u64,
    /// Storage statistics, absent when the backend could not report them
    pub storage: Option<CacheStats>,
}

// == Cache Service ==
/// Built once at startup and shared by every cached route.
pub struct CacheService {
    backend: Arc<dyn CacheBackend>,
    config: Config,
    key_builder: KeyBuilder,
    counters: OutcomeCounters,
}

impl CacheService {
    // == Constructor ==
    pub fn new(backend: Arc<dyn CacheBackend>, config: Config) -> Self {
        let key_builder = KeyBuilder::new(config.key_prefix.clone());
        Self {
            backend,
            config,
            key_builder,
            counters: OutcomeCounters::default(),
        }
    }

    /// Service over a fresh [`MemoryBackend`] sized by `config.max_entries`.
    pub fn in_memory(config: Config) -> Result<Self> {
        let backend = MemoryBackend::new(config.max_entries)?;
        Ok(Self::new(Arc::new(backend), config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn key_builder(&self) -> &KeyBuilder {
        &self.key_builder
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    // == Get ==
    /// Returns the live value for `key`, decompressed.
    pub async fn get(&self, key: &str) -> Result<Option<CachedResponse>> {
        let Some(entry) = self.backend.get(key).await? else {
            return Ok(None);
        };
        let mut value = entry.value;
        if entry.compressed {
            value.body = compression::decompress(&value.body)?;
        }
        Ok(Some(value))
    }

    // == Acquire Lock ==
    /// Takes the computation lock; `None` when another request holds it.
    pub async fn acquire_lock(&self, key: &str, timeout: Duration) -> Result<Option<LockGuard>> {
        let token = self.backend.acquire_lock(key, timeout).await?;
        Ok(token.map(|token| LockGuard::new(key.to_string(), token, self.backend.clone())))
    }

    /// Frees `key` for the holder of `token`; a stale token is a no-op.
    pub async fn release_lock(&self, key: &str, token: LockToken) -> Result<()> {
        self.backend.release_lock(key, token).await
    }

    // == Wait For Cache ==
    /// Polls every 50 ms until a value appears or `timeout` elapses.
    pub async fn wait_for_cache(&self, key: &str, timeout: Duration) -> Option<CachedResponse> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.get(key).await {
                Ok(Some(value)) => return Some(value),
                Ok(None) => {}
                Err(e) => debug!(key, error = %e, "Lookup failed while waiting"),
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    // == Set ==
    /// Stores `value` for `min(ttl, 24h)`, compressing large bodies when asked.
    pub async fn set(
        &self,
        key: &str,
        mut value: CachedResponse,
        ttl: Duration,
        options: SetOptions,
    ) -> Result<()> {
        let ttl = ttl.min(MAX_TTL);
        let compressed = options.compress
            && compression::should_compress(value.body.len(), self.config.compression_threshold);
        if compressed {
            value.body = compression::compress(&value.body)?;
        }

        let entry = CacheEntry::new(value, ttl)
            .with_tags(options.tags)
            .with_compressed(compressed);
        self.backend.set(key, entry).await
    }

    // == Resolve ==
    /// Looks `key` up and, on a miss, applies the lock and contention policy.
    ///
    /// Lookup and lock failures degrade to an unguarded BYPASS computation.
    pub async fn resolve(
        &self,
        key: &str,
        behavior: LockBehavior,
        lock_timeout: Duration,
    ) -> Resolution {
        match self.get(key).await {
            Ok(Some(value)) => {
                self.count(&self.counters.hits);
                return Resolution::Hit(value);
            }
            Ok(None) => {}
            Err(e) => return self.degrade(key, "lookup", &e),
        }

        let guard = match self.acquire_lock(key, lock_timeout).await {
            Ok(guard) => guard,
            Err(e) => return self.degrade(key, "lock", &e),
        };

        if let Some(guard) = guard {
            self.count(&self.counters.misses);
            return Resolution::Compute(Computation::locked(guard));
        }

        match behavior {
            LockBehavior::Wait => match self.wait_for_cache(key, lock_timeout).await {
                Some(value) => {
                    self.count(&self.counters.waits);
                    Resolution::Waited(value)
                }
                None => {
                    debug!(key, "Timed out waiting for in-flight computation");
                    self.count(&self.counters.misses);
                    Resolution::Compute(Computation::unguarded(CacheStatus::Miss, true))
                }
            },
            LockBehavior::Bypass => {
                self.count(&self.counters.bypasses);
                Resolution::Compute(Computation::unguarded(CacheStatus::Bypass, false))
            }
            LockBehavior::Fail => {
                self.count(&self.counters.rejections);
                let secs = lock_timeout.as_millis().div_ceil(1000);
                Resolution::Rejected {
                    retry_after_secs: u64::try_from(secs).unwrap_or(u64::MAX),
                }
            }
        }
    }

    fn degrade(&self, key: &str, operation: &str, error: &crate::error::CacheError) -> Resolution {
        warn!(key, operation, error = %error, "Cache backend failed, bypassing cache");
        self.record_backend_error();
        self.count(&self.counters.bypasses);
        Resolution::Compute(Computation::unguarded(CacheStatus::Bypass, false))
    }

    /// Counts a request the caller served without the cache.
    pub fn record_bypass(&self) {
        self.count(&self.counters.bypasses);
    }

    /// Counts a backend failure observed by a caller.
    pub fn record_backend_error(&self) {
        self.count(&self.counters.backend_errors);
    }

    fn count(&self, counter: &AtomicU64) {
        if self.config.enable_stats {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }

    // == Invalidation ==
    pub async fn invalidate_tag(&self, tag: &str) -> Result<usize> {
        self.backend.invalidate_tag(tag).await
    }

    pub async fn delete(&self, key: &str) -> Result<bool> {
        self.backend.delete(key).await
    }

    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await
    }

    pub async fn purge_expired(&self) -> Result<usize> {
        self.backend.purge_expired().await
    }

    // == Stats ==
    pub async fn stats(&self) -> ServiceStats {
        let storage = match self.backend.stats().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!(error = %e, "Failed to read storage statistics");
                None
            }
        };
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ServiceStats {
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            waits: load(&self.counters.waits),
            bypasses: load(&self.counters.bypasses),
            rejections: load(&self.counters.rejections),
            backend_errors: load(&self.counters.backend_errors),
            storage,
        }
    }

    pub async fn reset_stats(&self) -> Result<()> {
        for counter in [
            &self.counters.hits,
            &self.counters.misses,
            &self.counters.waits,
            &self.counters.bypasses,
            &self.counters.rejections,
            &self.counters.backend_errors,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.backend.reset_stats().await
    }
}
