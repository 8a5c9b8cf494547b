//! Cache Store Module
//!
//! In-process cache engine: a bounded LRU of entries with TTL expiry, a tag
//! index for invalidation, and per-key computation locks with auto-expiry.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::cache::{BoundedCache, CacheBackend, CacheEntry, CacheStats, LockToken};
use crate::error::Result;

// == Lock Record ==
/// A held computation lock.
#[derive(Debug, Clone, Copy)]
pub struct LockRecord {
    pub token: LockToken,
    pub acquired_at: Instant,
    pub timeout: Duration,
}

impl LockRecord {
    /// A lock that outlived its timeout is treated as free.
    pub fn is_abandoned(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.acquired_at) >= self.timeout
    }
}

// == Cache Store ==
/// Main cache storage with LRU eviction, TTL support and key locks.
#[derive(Debug)]
pub struct CacheStore {
    /// Bounded key-value storage
    entries: BoundedCache<String, CacheEntry>,
    /// tag -> keys carrying it
    tags: HashMap<String, HashSet<String>>,
    /// key -> held lock
    locks: HashMap<String, LockRecord>,
    /// Last issued lock token
    lock_generation: LockToken,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore holding at most `max_entries` entries.
    pub fn new(max_entries: usize) -> Result<Self> {
        Ok(Self {
            entries: BoundedCache::new(max_entries)?,
            tags: HashMap::new(),
            locks: HashMap::new(),
            lock_generation: 0,
        })
    }

    // == Set ==
    /// Stores an entry, overwriting any previous one.
    ///
    /// If the cache is at capacity, the least recently used entry is evicted.
    pub fn set(&mut self, key: String, entry: CacheEntry) {
        if let Some(previous) = self.entries.peek(key.as_str()) {
            let previous_tags = previous.tags.clone();
            self.untag(&key, &previous_tags);
        }

        for tag in &entry.tags {
            self.tags
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }

        if let Some((evicted_key, evicted)) = self.entries.set(key, entry) {
            debug!(key = %evicted_key, "Evicted least recently used entry");
            self.untag(&evicted_key, &evicted.tags);
        }
    }

    // == Get ==
    /// Retrieves a live entry by key.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<CacheEntry> {
        let expired = self.entries.peek(key).is_some_and(CacheEntry::is_expired);
        if expired {
            self.delete(key);
        }
        self.entries.get(key).cloned()
    }

    // == Delete ==
    /// Removes an entry by key.
    pub fn delete(&mut self, key: &str) -> bool {
        match self.entries.remove(key) {
            Some(entry) => {
                self.untag(key, &entry.tags);
                true
            }
            None => false,
        }
    }

    // == Locks ==
    /// Takes the lock for `key` unless a live lock already exists.
    ///
    /// Returns the token that identifies this acquisition.
    pub fn acquire_lock(&mut self, key: &str, timeout: Duration) -> Option<LockToken> {
        let now = Instant::now();
        if let Some(record) = self.locks.get(key) {
            if !record.is_abandoned(now) {
                return None;
            }
            debug!(key, "Taking over abandoned lock");
        }
        self.lock_generation += 1;
        let token = self.lock_generation;
        self.locks.insert(
            key.to_string(),
            LockRecord {
                token,
                acquired_at: now,
                timeout,
            },
        );
        Some(token)
    }

    /// Frees the lock for `key` when `token` is the current holder.
    ///
    /// A stale token (the lock expired and was taken over) leaves the new
    /// holder's lock in place.
    pub fn release_lock(&mut self, key: &str, token: LockToken) -> bool {
        match self.locks.get(key) {
            Some(record) if record.token == token => {
                self.locks.remove(key);
                true
            }
            Some(_) => {
                debug!(key, token, "Ignoring release from a previous lock holder");
                false
            }
            None => false,
        }
    }

    /// Whether a live lock is held for `key`.
    pub fn is_locked(&self, key: &str) -> bool {
        self.locks
            .get(key)
            .is_some_and(|record| !record.is_abandoned(Instant::now()))
    }

    /// Lock records held, including abandoned ones not yet swept.
    pub fn lock_count(&self) -> usize {
        self.locks.len()
    }

    // == Invalidate Tag ==
    /// Removes every entry carrying `tag`.
    pub fn invalidate_tag(&mut self, tag: &str) -> usize {
        let Some(keys) = self.tags.remove(tag) else {
            return 0;
        };
        keys.iter().filter(|key| self.delete(key)).count()
    }

    // == Clear ==
    pub fn clear(&mut self) {
        self.entries.clear();
        self.tags.clear();
    }

    // == Cleanup Expired ==
    /// Removes all expired entries and abandoned locks.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let expired_keys: Vec<String> = self
            .entries
            .entries()
            .filter(|(_, entry)| entry.is_expired())
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();
        for key in expired_keys {
            self.delete(&key);
        }

        let now = Instant::now();
        self.locks.retain(|_, record| !record.is_abandoned(now));

        count
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.entries.stats()
    }

    pub fn reset_stats(&mut self) {
        self.entries.reset_stats();
    }

    fn untag(&mut self, key: &str, tags: &[String]) {
        for tag in tags {
            if let Some(keys) = self.tags.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(tag);
                }
            }
        }
    }
}

// == Memory Backend ==
/// [`CacheBackend`] over a [`CacheStore`] shared behind an async RwLock.
///
/// Every operation runs inside a single write guard, so lock acquisition is
/// an atomic test-and-set within the process.
#[derive(Debug, Clone)]
pub struct MemoryBackend {
    store: Arc<RwLock<CacheStore>>,
}

impl MemoryBackend {
    pub fn new(max_entries: usize) -> Result<Self> {
        Ok(Self::from_store(CacheStore::new(max_entries)?))
    }

    pub fn from_store(store: CacheStore) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
        }
    }

    /// Shared handle to the underlying store.
    pub fn store(&self) -> Arc<RwLock<CacheStore>> {
        self.store.clone()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        // Write lock: a read updates recency and counters
        Ok(self.store.write().await.get(key))
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<()> {
        self.store.write().await.set(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.store.write().await.delete(key))
    }

    async fn acquire_lock(&self, key: &str, timeout: Duration) -> Result<Option<LockToken>> {
        Ok(self.store.write().await.acquire_lock(key, timeout))
    }

    async fn release_lock(&self, key: &str, token: LockToken) -> Result<()> {
        self.store.write().await.release_lock(key, token);
        Ok(())
    }

    async fn invalidate_tag(&self, tag: &str) -> Result<usize> {
        Ok(self.store.write().await.invalidate_tag(tag))
    }

    async fn clear(&self) -> Result<()> {
        self.store.write().await.clear();
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize> {
        Ok(self.store.write().await.cleanup_expired())
    }

    async fn stats(&self) -> Result<CacheStats> {
        Ok(self.store.read().await.stats())
    }

    async fn reset_stats(&self) -> Result<()> {
        self.store.write().await.reset_stats();
        Ok(())
    }
}
