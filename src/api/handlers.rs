//! API Handlers
//!
//! HTTP handlers for the cache admin endpoints.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::models::{HealthResponse, InvalidateResponse, MessageResponse, StatsResponse};
use crate::service::CacheService;

/// Application state shared across all admin handlers.
///
/// Holds the one cache service instance built at startup.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CacheService>,
}

impl AppState {
    /// Creates a new AppState around an existing service.
    pub fn new(service: Arc<CacheService>) -> Self {
        Self { service }
    }

    /// Creates a new AppState with an in-memory service built from the Config.
    pub fn from_config(config: &Config) -> Result<Self> {
        let service = CacheService::in_memory(config.clone())?;
        Ok(Self::new(Arc::new(service)))
    }
}

/// Handler for GET /cache/stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.service.stats().await.into())
}

/// Handler for DELETE /cache/stats
pub async fn reset_stats_handler(State(state): State<AppState>) -> Result<Json<MessageResponse>> {
    state.service.reset_stats().await?;
    Ok(Json(MessageResponse::new("Statistics reset")))
}

/// Handler for DELETE /cache/tags/:tag
///
/// Removes every cached response stored with the tag.
pub async fn invalidate_tag_handler(
    State(state): State<AppState>,
    Path(tag): Path<String>,
) -> Result<Json<InvalidateResponse>> {
    let invalidated = state.service.invalidate_tag(&tag).await?;
    info!(tag = %tag, invalidated, "Invalidated cache tag");
    Ok(Json(InvalidateResponse::new(tag, invalidated)))
}

/// Handler for DELETE /cache
pub async fn clear_handler(State(state): State<AppState>) -> Result<Json<MessageResponse>> {
    state.service.clear().await?;
    info!("Cache cleared");
    Ok(Json(MessageResponse::new("Cache cleared")))
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachedResponse;
    use crate::service::SetOptions;
    use std::time::Duration;

    fn state() -> AppState {
        AppState::from_config(&Config::default()).unwrap()
    }

    #[tokio::test]
    async fn test_invalidate_tag_handler() {
        let state = state();
        let options = SetOptions {
            compress: false,
            tags: vec!["users".to_string()],
        };
        state
            .service
            .set("a", CachedResponse::json("1"), Duration::from_secs(60), options)
            .await
            .unwrap();

        let response = invalidate_tag_handler(State(state.clone()), Path("users".to_string()))
            .await
            .unwrap();

        assert_eq!(response.invalidated, 1);
        assert!(state.service.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear_handler() {
        let state = state();
        state
            .service
            .set("a", CachedResponse::json("1"), Duration::from_secs(60), SetOptions::default())
            .await
            .unwrap();

        clear_handler(State(state.clone())).await.unwrap();

        assert!(state.service.get("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stats_handler() {
        let response = stats_handler(State(state())).await;
        assert_eq!(response.hits, 0);
        assert_eq!(response.misses, 0);
        assert_eq!(response.storage.as_ref().unwrap().max_size, 1000);
    }

    #[tokio::test]
    async fn test_health_handler() {
        let response = health_handler().await;
        assert_eq!(response.status, "healthy");
    }
}
