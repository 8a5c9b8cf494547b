//! Route Cache Table
//!
//! Declarative per-route cache configuration, registered next to the routes
//! and consumed by the cache middleware.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::http::Method;

use crate::key::{FieldSelection, KeyOptions, KeyOverride, KeyRequest};
use crate::lock::LockBehavior;

// == Route Cache Options ==
/// Cache settings for one route. Unset values fall back to [`Config`](crate::Config).
#[derive(Debug, Clone)]
pub struct RouteCacheOptions {
    pub ttl: Option<Duration>,
    pub key: KeyOptions,
    pub tags: Vec<String>,
    pub compress: bool,
    pub lock_behavior: Option<LockBehavior>,
    pub lock_timeout: Option<Duration>,
}

impl Default for RouteCacheOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            key: KeyOptions::default(),
            tags: Vec::new(),
            compress: true,
            lock_behavior: None,
            lock_timeout: None,
        }
    }
}

impl RouteCacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn lock_behavior(mut self, behavior: LockBehavior) -> Self {
        self.lock_behavior = Some(behavior);
        self
    }

    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    pub fn params(mut self, selection: FieldSelection) -> Self {
        self.key.params = selection;
        self
    }

    pub fn query(mut self, selection: FieldSelection) -> Self {
        self.key.query = selection;
        self
    }

    pub fn body(mut self, selection: FieldSelection) -> Self {
        self.key.body = selection;
        self
    }

    pub fn headers(mut self, selection: FieldSelection) -> Self {
        self.key.headers = selection;
        self
    }

    /// Uses a fixed key for every request to the route.
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.key.key_override = Some(KeyOverride::Literal(key.into()));
        self
    }

    /// Derives the whole key from the request.
    pub fn key_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&KeyRequest) -> String + Send + Sync + 'static,
    {
        self.key.key_override = Some(KeyOverride::derived(f));
        self
    }
}

// == Route Cache Table ==
/// Maps `(method, route template)` to the route's cache options.
#[derive(Debug, Clone, Default)]
pub struct RouteCacheTable {
    routes: HashMap<(Method, String), Arc<RouteCacheOptions>>,
}

impl RouteCacheTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers caching for `method` requests matched by `route`.
    pub fn route(mut self, method: Method, route: impl Into<String>, options: RouteCacheOptions) -> Self {
        self.routes.insert((method, route.into()), Arc::new(options));
        self
    }

    /// Registers caching for `GET` requests matched by `route`.
    pub fn get(self, route: impl Into<String>, options: RouteCacheOptions) -> Self {
        self.route(Method::GET, route, options)
    }

    pub fn lookup(&self, method: &Method, route: &str) -> Option<Arc<RouteCacheOptions>> {
        self.routes.get(&(method.clone(), route.to_string())).cloned()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fall_back_to_config() {
        let options = RouteCacheOptions::default();
        assert!(options.ttl.is_none());
        assert!(options.lock_behavior.is_none());
        assert!(options.compress);
        assert_eq!(options.key.params, FieldSelection::All);
    }

    #[test]
    fn test_lookup_by_method_and_template() {
        let table = RouteCacheTable::new()
            .get("/users/:id", RouteCacheOptions::new().ttl(Duration::from_secs(60)))
            .route(Method::POST, "/search", RouteCacheOptions::new().body(FieldSelection::All));

        assert_eq!(table.len(), 2);
        let users = table.lookup(&Method::GET, "/users/:id").unwrap();
        assert_eq!(users.ttl, Some(Duration::from_secs(60)));
        assert!(table.lookup(&Method::POST, "/users/:id").is_none());
        assert!(table.lookup(&Method::POST, "/search").unwrap().key.needs_body());
    }

    #[test]
    fn test_builder_overrides() {
        let options = RouteCacheOptions::new()
            .tags(["users", "profile"])
            .lock_behavior(LockBehavior::Fail)
            .lock_timeout(Duration::from_millis(250))
            .key("home");

        assert_eq!(options.tags, vec!["users", "profile"]);
        assert_eq!(options.lock_behavior, Some(LockBehavior::Fail));
        assert!(matches!(
            options.key.key_override,
            Some(KeyOverride::Literal(ref k)) if k == "home"
        ));
    }
}
