//! Cache Entry Module
//!
//! Defines stored responses and the entry metadata wrapped around them.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

// == Cached Response ==
/// A captured 2xx handler response, replayed verbatim on a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// HTTP status code
    pub status: u16,
    /// `content-type` of the original response, if any
    pub content_type: Option<String>,
    /// Response body
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    /// Convenience constructor for a `200 OK` JSON payload.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::new(200, Some("application/json".to_string()), body)
    }
}

// == Cache Entry ==
/// A stored response with its expiry deadline and invalidation metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value; `value.body` is gzip data when `compressed` is set
    pub value: CachedResponse,
    /// Deadline after which the entry is no longer served
    pub expires_at: Instant,
    /// Tags the entry can be invalidated by
    pub tags: Vec<String>,
    /// Whether the body is stored compressed
    pub compressed: bool,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates an entry expiring `ttl` from now.
    pub fn new(value: CachedResponse, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
            tags: Vec::new(),
            compressed: false,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    // == Is Expired ==
    /// An entry is expired once the current time reaches its deadline.
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    // == Time To Live ==
    /// Remaining lifetime, zero once expired.
    pub fn ttl_remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entry_expiration() {
        let entry = CacheEntry::new(CachedResponse::json("{}"), Duration::from_secs(1));
        assert!(!entry.is_expired());

        tokio::time::advance(Duration::from_millis(1100)).await;

        assert!(entry.is_expired());
        assert_eq!(entry.ttl_remaining(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_remaining() {
        let entry = CacheEntry::new(CachedResponse::json("{}"), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(4)).await;

        assert_eq!(entry.ttl_remaining(), Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_boundary_condition() {
        let entry = CacheEntry::new(CachedResponse::json("{}"), Duration::ZERO);
        assert!(entry.is_expired(), "Entry should be expired at boundary");
    }

    #[test]
    fn test_builders() {
        let entry = CacheEntry::new(CachedResponse::json("{}"), Duration::from_secs(1))
            .with_tags(vec!["users".to_string()])
            .with_compressed(true);

        assert_eq!(entry.tags, vec!["users"]);
        assert!(entry.compressed);
        assert_eq!(entry.value.status, 200);
    }
}
