//! Compiled Validator Cache
//!
//! Compiling a validation schema is expensive, so compiled artifacts are kept
//! in a [`BoundedCache`]. Each distinct schema is interned to an id the first
//! time it is seen; the id is the cache key. An id lives as long as its
//! artifact: eviction, `clear` and compile failures drop it from the interning
//! table, so the table is bounded by the cache capacity.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::cache::{BoundedCache, CacheStats};
use crate::error::Result;
use crate::key::canonicalize;

/// Stable identity of a distinct schema.
pub type SchemaId = u64;

// == Validator Cache ==
/// Bounded cache of compiled artifacts `A`, keyed by interned schema id.
#[derive(Debug)]
pub struct ValidatorCache<A> {
    ids: HashMap<String, SchemaId>,
    schemas: HashMap<SchemaId, String>,
    next_id: SchemaId,
    compiled: BoundedCache<SchemaId, Arc<A>>,
}

impl<A> ValidatorCache<A> {
    pub fn new(max_size: usize) -> Result<Self> {
        Ok(Self {
            ids: HashMap::new(),
            schemas: HashMap::new(),
            next_id: 0,
            compiled: BoundedCache::new(max_size)?,
        })
    }

    /// Returns the id for `schema`, assigning the next one on first sight.
    ///
    /// Schemas that differ only in object key order share an id. Ids are
    /// never reused.
    fn intern(&mut self, schema: &Value) -> SchemaId {
        let canonical = canonicalize(schema.clone()).to_string();
        if let Some(id) = self.ids.get(&canonical) {
            return *id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.schemas.insert(id, canonical.clone());
        self.ids.insert(canonical, id);
        id
    }

    fn forget(&mut self, id: SchemaId) {
        if let Some(canonical) = self.schemas.remove(&id) {
            self.ids.remove(&canonical);
        }
    }

    /// Id of the cached artifact for `schema`, if one is cached.
    pub fn id_of(&self, schema: &Value) -> Option<SchemaId> {
        let canonical = canonicalize(schema.clone()).to_string();
        self.ids.get(&canonical).copied()
    }

    /// Returns the compiled artifact for `schema`, compiling it on a miss.
    ///
    /// Compile errors are returned and nothing is cached for the schema.
    pub fn get_or_compile<F>(&mut self, schema: &Value, compile: F) -> Result<Arc<A>>
    where
        F: FnOnce(&Value) -> Result<A>,
    {
        let id = self.intern(schema);
        if let Some(artifact) = self.compiled.get(&id) {
            return Ok(artifact.clone());
        }

        debug!(schema_id = id, "Compiling validator");
        let artifact = match compile(schema) {
            Ok(artifact) => Arc::new(artifact),
            Err(e) => {
                self.forget(id);
                return Err(e);
            }
        };
        if let Some((evicted, _)) = self.compiled.set(id, artifact.clone()) {
            self.forget(evicted);
        }
        Ok(artifact)
    }

    /// Number of interned schemas; never exceeds the cache capacity.
    pub fn interned(&self) -> usize {
        self.ids.len()
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Drops compiled artifacts and their ids.
    pub fn clear(&mut self) {
        self.compiled.clear();
        self.ids.clear();
        self.schemas.clear();
    }

    pub fn set_max_size(&mut self, max_size: usize) -> Result<()> {
        for (evicted, _) in self.compiled.set_max_size(max_size)? {
            self.forget(evicted);
        }
        Ok(())
    }

    pub fn stats(&self) -> CacheStats {
        self.compiled.stats()
    }

    pub fn reset_stats(&mut self) {
        self.compiled.reset_stats();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use serde_json::json;

    /// Toy artifact: the list of required field names.
    fn compile_required(schema: &Value) -> Result<Vec<String>> {
        schema["required"]
            .as_array()
            .ok_or_else(|| CacheError::Compile("missing `required`".into()))
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| f.as_str().map(str::to_string))
                    .collect()
            })
    }

    #[test]
    fn test_compiles_once_per_schema() {
        let mut cache = ValidatorCache::new(8).unwrap();
        let schema = json!({"type": "object", "required": ["name"]});
        let mut compiles = 0;

        for _ in 0..3 {
            let artifact = cache
                .get_or_compile(&schema, |s| {
                    compiles += 1;
                    compile_required(s)
                })
                .unwrap();
            assert_eq!(*artifact, vec!["name".to_string()]);
        }

        assert_eq!(compiles, 1);
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (2, 1));
    }

    #[test]
    fn test_key_order_shares_identity() {
        let mut cache = ValidatorCache::<Vec<String>>::new(8).unwrap();
        let a = json!({"type": "object", "required": ["id"]});
        let b = json!({"required": ["id"], "type": "object"});
        let c = json!({"type": "object", "required": ["other"]});

        assert_eq!(cache.intern(&a), cache.intern(&b));
        assert_ne!(cache.intern(&a), cache.intern(&c));
    }

    #[test]
    fn test_compile_error_not_cached() {
        let mut cache = ValidatorCache::new(8).unwrap();
        let schema = json!({"type": "object"});

        let result = cache.get_or_compile(&schema, compile_required);
        assert!(matches!(result, Err(CacheError::Compile(_))));
        assert!(cache.is_empty());
        assert_eq!(cache.interned(), 0);
    }

    #[test]
    fn test_eviction_recompiles() {
        let mut cache = ValidatorCache::new(1).unwrap();
        let first = json!({"required": ["a"]});
        let second = json!({"required": ["b"]});

        let original = cache.get_or_compile(&first, compile_required).unwrap();
        cache.get_or_compile(&second, compile_required).unwrap();
        let recompiled = cache.get_or_compile(&first, compile_required).unwrap();

        assert!(!Arc::ptr_eq(&original, &recompiled));
        assert_eq!(cache.stats().evictions, 2);
        assert_eq!(cache.id_of(&first), Some(2));
        assert_eq!(cache.id_of(&second), None);
    }

    #[test]
    fn test_interning_table_bounded_by_capacity() {
        let mut cache = ValidatorCache::new(4).unwrap();

        for i in 0..50 {
            let schema = json!({ "required": [format!("field_{i}")] });
            cache.get_or_compile(&schema, compile_required).unwrap();
        }
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.interned(), 4);

        cache.set_max_size(2).unwrap();
        assert_eq!(cache.interned(), 2);

        cache.clear();
        assert_eq!(cache.interned(), 0);
    }
}
