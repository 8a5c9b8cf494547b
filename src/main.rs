//! Herd Cache demo server
//!
//! Serves a few cached demo routes next to the cache admin API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Path, routing::get, Json, Router};
use serde_json::{json, Value};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herd_cache::{
    cache_layer, create_router, spawn_cleanup_task, AppState, CacheMiddlewareState, CacheService,
    Config, FieldSelection, RouteCacheOptions, RouteCacheTable,
};

/// Main entry point for the cache server.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build the cache service once
/// 4. Start background expiry sweep
/// 5. Register demo routes behind the cache middleware, merge the admin API
/// 6. Serve until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "herd_cache=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Herd Cache server");

    let config = Config::from_env();
    info!(
        "Configuration loaded: max_entries={}, default_ttl={}s, lock_behavior={}, port={}, cleanup_interval={}s",
        config.max_entries,
        config.default_ttl.as_secs(),
        config.lock_behavior,
        config.server_port,
        config.cleanup_interval
    );

    let service = Arc::new(CacheService::in_memory(config.clone())?);
    info!("Cache service initialized");

    let cleanup_handle = spawn_cleanup_task(service.clone(), config.cleanup_interval);
    info!("Background expiry sweep started");

    let routes = RouteCacheTable::new()
        .get(
            "/profile",
            RouteCacheOptions::new()
                .ttl(Duration::from_secs(60))
                .headers(FieldSelection::only(["authorization"])),
        )
        .get(
            "/users/:id",
            RouteCacheOptions::new()
                .ttl(Duration::from_secs(300))
                .tags(["users"]),
        );

    let demo = Router::new()
        .route("/profile", get(profile_handler))
        .route("/users/:id", get(user_handler));
    let demo = cache_layer(demo, CacheMiddlewareState::new(service.clone(), routes));

    let app = create_router(AppState::new(service)).merge(demo);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn profile_handler() -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    Json(json!({ "data": "profile" }))
}

async fn user_handler(Path(id): Path<String>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(200)).await;
    Json(json!({ "id": id }))
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// On shutdown signal, aborts the expiry sweep and allows graceful shutdown.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cleanup_handle.abort();
    warn!("Expiry sweep aborted");
}
