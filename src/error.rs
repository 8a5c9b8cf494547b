//! Error types for the response cache
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the response cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Bounded cache created or resized with a zero capacity
    #[error("Invalid capacity: {0} (must be greater than zero)")]
    InvalidCapacity(usize),

    /// Backing store failed a get/set/lock operation
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// Response payload could not be captured or encoded
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Payload compression or decompression failed
    #[error("Compression error: {0}")]
    Compression(#[from] std::io::Error),

    /// Another request holds the computation lock under the `fail` policy
    #[error("Cache computation in progress")]
    LockContended {
        /// Suggested retry delay in whole seconds
        retry_after_secs: u64,
    },

    /// Validator compilation failed
    #[error("Compile error: {0}")]
    Compile(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        if let CacheError::LockContended { retry_after_secs } = self {
            let body = Json(json!({
                "error": "Service Unavailable",
                "message": "Cache computation in progress"
            }));
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                [(header::RETRY_AFTER, retry_after_secs.to_string())],
                body,
            )
                .into_response();
        }

        let status = match &self {
            CacheError::InvalidCapacity(_) | CacheError::Compile(_) => StatusCode::BAD_REQUEST,
            CacheError::Backend(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the response cache.
pub type Result<T> = std::result::Result<T, CacheError>;
