//! Response DTOs for the cache admin API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::cache::CacheStats;
use crate::service::ServiceStats;

/// Response body for the stats endpoint (GET /cache/stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Requests served from the cache
    pub hits: u64,
    /// Requests that ran the handler as the lock holder or after a wait timeout
    pub misses: u64,
    /// Requests served a value computed by another request
    pub waits: u64,
    /// Requests that ran the handler without caching
    pub bypasses: u64,
    /// Requests rejected with 503 under the `fail` policy
    pub rejections: u64,
    /// Backend failures recovered from
    pub backend_errors: u64,
    /// (hits + waits) / all resolved requests
    pub hit_rate: f64,
    /// Storage statistics, when the backend reports them
    pub storage: Option<CacheStats>,
}

impl From<ServiceStats> for StatsResponse {
    fn from(stats: ServiceStats) -> Self {
        let served = stats.hits + stats.waits;
        let total = served + stats.misses + stats.bypasses + stats.rejections;
        let hit_rate = if total > 0 {
            served as f64 / total as f64
        } else {
            0.0
        };
        Self {
            hits: stats.hits,
            misses: stats.misses,
            waits: stats.waits,
            bypasses: stats.bypasses,
            rejections: stats.rejections,
            backend_errors: stats.backend_errors,
            hit_rate,
            storage: stats.storage,
        }
    }
}

/// Response body for tag invalidation (DELETE /cache/tags/:tag)
#[derive(Debug, Clone, Serialize)]
pub struct InvalidateResponse {
    /// The invalidated tag
    pub tag: String,
    /// Number of entries removed
    pub invalidated: usize,
}

impl InvalidateResponse {
    pub fn new(tag: impl Into<String>, invalidated: usize) -> Self {
        Self {
            tag: tag.into(),
            invalidated,
        }
    }
}

/// Response body for admin actions without a payload (DELETE /cache, DELETE /cache/stats)
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
