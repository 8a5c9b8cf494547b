//! Bounded Recency Cache
//!
//! Fixed-capacity key/value store that evicts the least recently used entry.
//! Used both for stored responses and for compiled validators.

use std::borrow::Borrow;
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use crate::cache::CacheStats;
use crate::error::{CacheError, Result};

#[derive(Debug)]
struct Node<V> {
    value: V,
    /// Recency tick of the last touch
    tick: u64,
}

// == Bounded Cache ==
/// Capacity-bounded map with LRU eviction and hit/miss/eviction counters.
///
/// Recency is a monotonically increasing tick per touch:
/// - Lowest tick = least recently used
/// - Highest tick = most recently used
///
/// The structure itself is not synchronized; owners wrap it in a lock.
#[derive(Debug)]
pub struct BoundedCache<K, V> {
    map: HashMap<K, Node<V>>,
    order: BTreeMap<u64, K>,
    tick: u64,
    max_size: usize,
    stats: CacheStats,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    /// Creates an empty cache holding at most `max_size` entries.
    pub fn new(max_size: usize) -> Result<Self> {
        if max_size == 0 {
            return Err(CacheError::InvalidCapacity(max_size));
        }
        Ok(Self {
            map: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
            max_size,
            stats: CacheStats::new(),
        })
    }

    // == Get ==
    /// Returns the value for `key`, marking it most recently used.
    ///
    /// Counts a hit when present and a miss when absent.
    pub fn get<Q>(&mut self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if !self.map.contains_key(key) {
            self.stats.record_miss();
            return None;
        }
        self.stats.record_hit();
        self.touch(key);
        self.map.get(key).map(|node| &node.value)
    }

    // == Peek ==
    /// Returns the value without touching recency or counters.
    pub fn peek<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.get(key).map(|node| &node.value)
    }

    // == Has ==
    pub fn has<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.map.contains_key(key)
    }

    // == Set ==
    /// Inserts or replaces `key`, marking it most recently used.
    ///
    /// Inserting a new key into a full cache evicts the least recently used
    /// entry first and returns it.
    pub fn set(&mut self, key: K, value: V) -> Option<(K, V)> {
        self.tick += 1;
        let tick = self.tick;

        if let Some(node) = self.map.get_mut(&key) {
            self.order.remove(&node.tick);
            node.tick = tick;
            node.value = value;
            self.order.insert(tick, key);
            return None;
        }

        let evicted = if self.map.len() >= self.max_size {
            self.evict_oldest()
        } else {
            None
        };

        self.order.insert(tick, key.clone());
        self.map.insert(key, Node { value, tick });
        evicted
    }

    // == Remove ==
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let node = self.map.remove(key)?;
        self.order.remove(&node.tick);
        Some(node.value)
    }

    // == Clear ==
    /// Drops every entry. Counters are left untouched.
    pub fn clear(&mut self) {
        self.map.clear();
        self.order.clear();
    }

    // == Length ==
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    // == Entries ==
    /// Iterates entries from least to most recently used.
    pub fn entries(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.order
            .values()
            .filter_map(|key| self.map.get(key).map(|node| (key, &node.value)))
    }

    // == Capacity ==
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Changes the capacity, evicting least recently used entries until the
    /// cache fits. Returns the evicted entries.
    pub fn set_max_size(&mut self, max_size: usize) -> Result<Vec<(K, V)>> {
        if max_size == 0 {
            return Err(CacheError::InvalidCapacity(max_size));
        }
        self.max_size = max_size;

        let mut evicted = Vec::new();
        while self.map.len() > self.max_size {
            match self.evict_oldest() {
                Some(entry) => evicted.push(entry),
                None => break,
            }
        }
        Ok(evicted)
    }

    // == Stats ==
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.map.len(), self.max_size)
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    fn touch<Q>(&mut self, key: &Q)
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        if let Some(node) = self.map.get_mut(key) {
            if let Some(owned) = self.order.remove(&node.tick) {
                self.tick += 1;
                node.tick = self.tick;
                self.order.insert(self.tick, owned);
            }
        }
    }

    fn evict_oldest(&mut self) -> Option<(K, V)> {
        let (_, key) = self.order.pop_first()?;
        let node = self.map.remove(&key)?;
        self.stats.record_eviction();
        Some((key, node.value))
    }
}
