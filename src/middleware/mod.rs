//! Middleware Module
//!
//! The axum integration point: a declarative route table and the cache
//! middleware applied through [`cache_layer`].

pub mod cache;
pub mod routes;

pub use cache::{cache_layer, cache_middleware, CacheMiddlewareState};
pub use routes::{RouteCacheOptions, RouteCacheTable};
