//! Cache Statistics Module
//!
//! Tracks bounded cache performance metrics including hits, misses, and evictions.

use serde::Serialize;

// == Cache Stats ==
/// Snapshot of a bounded cache's occupancy and access counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Current number of entries in the cache
    pub size: usize,
    /// Configured capacity
    pub max_size: usize,
    /// Number of successful lookups
    pub hits: u64,
    /// Number of lookups for absent keys
    pub misses: u64,
    /// Number of entries evicted due to LRU policy
    pub evictions: u64,
    /// hits / (hits + misses), 0.0 when nothing was looked up
    pub hit_rate: f64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Calculates the cache hit rate.
    ///
    /// Returns hits / (hits + misses), or 0.0 if no requests have been made.
    pub fn compute_hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Record Hit ==
    /// Increments the hit counter.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    // == Record Miss ==
    /// Increments the miss counter.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    // == Record Eviction ==
    /// Increments the eviction counter.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    // == Snapshot ==
    /// Returns a copy with occupancy filled in and the hit rate computed.
    pub fn snapshot(&self, size: usize, max_size: usize) -> Self {
        Self {
            size,
            max_size,
            hit_rate: self.compute_hit_rate(),
            ..self.clone()
        }
    }

    // == Reset ==
    /// Zeroes the access and eviction counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = CacheStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.evictions, 0);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn test_hit_rate_no_requests() {
        let stats = CacheStats::new();
        assert_eq!(stats.compute_hit_rate(), 0.0);
        assert_eq!(stats.snapshot(0, 10).hit_rate, 0.0);
    }

    #[test]
    fn test_hit_rate_mixed() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_hit();
        stats.record_hit();
        stats.record_miss();
        assert_eq!(stats.compute_hit_rate(), 0.75);
    }

    #[test]
    fn test_snapshot_fills_occupancy() {
        let mut stats = CacheStats::new();
        stats.record_eviction();
        stats.record_miss();

        let snapshot = stats.snapshot(4, 8);
        assert_eq!(snapshot.size, 4);
        assert_eq!(snapshot.max_size, 8);
        assert_eq!(snapshot.evictions, 1);
        assert_eq!(snapshot.hit_rate, 0.0);
    }

    #[test]
    fn test_reset() {
        let mut stats = CacheStats::new();
        stats.record_hit();
        stats.record_eviction();
        stats.reset();
        assert_eq!(stats, CacheStats::default());
    }
}
