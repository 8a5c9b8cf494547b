//! Expiry Sweep Task
//!
//! Background task that periodically purges expired entries and abandoned
//! computation locks from the cache backend.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::service::CacheService;

/// Spawns a background task that periodically purges expired cache entries.
///
/// Each run calls [`CacheService::purge_expired`], which also drops locks
/// whose holder never released them. Backend failures are logged and the
/// loop keeps going.
///
/// # Returns
/// A JoinHandle for the spawned task, aborted during graceful shutdown.
///
/// # Example
/// ```ignore
/// let service = Arc::new(CacheService::in_memory(Config::default())?);
/// let cleanup_handle = spawn_cleanup_task(service.clone(), 1);
/// // Later, during shutdown:
/// cleanup_handle.abort();
/// ```
pub fn spawn_cleanup_task(service: Arc<CacheService>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            match service.purge_expired().await {
                Ok(0) => debug!("Expiry sweep: nothing to remove"),
                Ok(removed) => info!("Expiry sweep: removed {} expired entries", removed),
                Err(e) => warn!(error = %e, "Expiry sweep failed"),
            }
        }
    })
}
