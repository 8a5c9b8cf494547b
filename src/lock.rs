//! Lock Coordinator
//!
//! Contention policies and the guard that guarantees a computation lock is
//! released whatever happens to the request that took it.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::{CacheBackend, LockToken};

// == Lock Behavior ==
/// What a request does when the key's computation is already in flight.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBehavior {
    /// Poll for the in-flight result up to the lock timeout, then compute
    #[default]
    Wait,
    /// Compute immediately without the lock
    Bypass,
    /// Reject with 503 and a retry hint
    Fail,
}

impl LockBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Wait => "wait",
            Self::Bypass => "bypass",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for LockBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LockBehavior {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wait" => Ok(Self::Wait),
            "bypass" => Ok(Self::Bypass),
            "fail" => Ok(Self::Fail),
            other => Err(format!("unknown lock behavior: {other}")),
        }
    }
}

// == Lock Guard ==
/// Ownership of a key's computation lock.
///
/// Call [`LockGuard::release`] on every normal path. A guard dropped while
/// still held (handler panic, cancelled request) schedules the release on the
/// current runtime; the backend's lock timeout is the last resort.
pub struct LockGuard {
    key: String,
    token: LockToken,
    backend: Arc<dyn CacheBackend>,
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(key: String, token: LockToken, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            key,
            token,
            backend,
            released: false,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> LockToken {
        self.token
    }

    /// Frees the lock. Backend failures are logged; the lock then expires on
    /// its own.
    pub async fn release(mut self) {
        self.released = true;
        if let Err(e) = self.backend.release_lock(&self.key, self.token).await {
            warn!(key = %self.key, error = %e, "Failed to release cache lock");
        }
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("key", &self.key)
            .field("token", &self.token)
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let key = std::mem::take(&mut self.key);
        let token = self.token;
        let backend = self.backend.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(key = %key, "Releasing cache lock from drop");
                handle.spawn(async move {
                    if let Err(e) = backend.release_lock(&key, token).await {
                        warn!(key = %key, error = %e, "Failed to release cache lock");
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "No runtime to release cache lock; relying on lock timeout");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryBackend;
    use std::time::Duration;

    #[test]
    fn test_lock_behavior_parse() {
        assert_eq!("wait".parse::<LockBehavior>(), Ok(LockBehavior::Wait));
        assert_eq!(" BYPASS ".parse::<LockBehavior>(), Ok(LockBehavior::Bypass));
        assert_eq!("fail".parse::<LockBehavior>(), Ok(LockBehavior::Fail));
        assert!("sometimes".parse::<LockBehavior>().is_err());
        assert_eq!(LockBehavior::default(), LockBehavior::Wait);
    }

    #[tokio::test]
    async fn test_release_frees_lock() {
        let backend = Arc::new(MemoryBackend::new(10).unwrap());
        let timeout = Duration::from_secs(5);
        let token = backend.acquire_lock("k", timeout).await.unwrap().unwrap();

        let guard = LockGuard::new("k".to_string(), token, backend.clone());
        assert_eq!(guard.key(), "k");
        guard.release().await;

        assert!(backend.acquire_lock("k", timeout).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_drop_releases_lock() {
        let backend = Arc::new(MemoryBackend::new(10).unwrap());
        let timeout = Duration::from_secs(5);
        let token = backend.acquire_lock("k", timeout).await.unwrap().unwrap();

        drop(LockGuard::new("k".to_string(), token, backend.clone()));
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        assert!(!backend.store().read().await.is_locked("k"));
    }
}
