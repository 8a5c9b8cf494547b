//! Cache Middleware
//!
//! Runs on every route registered in the [`RouteCacheTable`]: builds the key,
//! serves hits, guards misses with the key lock and stores 2xx results.

use std::sync::Arc;

use axum::{
    body::{self, Body, Bytes},
    extract::{FromRequestParts, Query, RawPathParams, Request, State},
    http::{header::CONTENT_TYPE, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    Router,
};
use bytes::BytesMut;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use super::routes::{RouteCacheOptions, RouteCacheTable};
use crate::cache::CachedResponse;
use crate::error::CacheError;
use crate::key::{FieldSelection, KeyOptions, KeyRequest};
use crate::service::{CacheService, CacheStatus, Resolution, SetOptions, X_CACHE};

/// Largest request body buffered to derive a key.
pub const MAX_KEY_BODY_BYTES: usize = 1024 * 1024;

/// State shared by every invocation of the cache middleware.
#[derive(Clone)]
pub struct CacheMiddlewareState {
    pub service: Arc<CacheService>,
    pub routes: Arc<RouteCacheTable>,
}

impl CacheMiddlewareState {
    pub fn new(service: Arc<CacheService>, routes: RouteCacheTable) -> Self {
        Self {
            service,
            routes: Arc::new(routes),
        }
    }
}

/// Applies the cache middleware to every route already added to `router`.
///
/// Uses `route_layer`, so the matched route template is known to the
/// middleware. Call it after the routes are registered.
pub fn cache_layer<S>(router: Router<S>, state: CacheMiddlewareState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.route_layer(middleware::from_fn_with_state(state, cache_middleware))
}

/// The cache middleware function.
pub async fn cache_middleware(
    State(state): State<CacheMiddlewareState>,
    request: Request,
    next: Next,
) -> Response {
    let route = request
        .extensions()
        .get::<axum::extract::MatchedPath>()
        .map(|path| path.as_str().to_string());
    let Some(options) = route
        .as_deref()
        .and_then(|route| state.routes.lookup(request.method(), route))
    else {
        return next.run(request).await;
    };
    let route = route.unwrap_or_default();

    let (request, key_request) = match capture_key_request(request, &route, &options.key).await {
        Ok(captured) => captured,
        Err(response) => return response,
    };

    let service = &state.service;
    let config = service.config();
    if !options.key.can_key(&key_request) {
        debug!(route = %route, "Request body cannot be keyed, bypassing cache");
        service.record_bypass();
        return mark(next.run(request).await, CacheStatus::Bypass);
    }
    let key = service.key_builder().build(&key_request, &options.key);
    let behavior = options.lock_behavior.unwrap_or(config.lock_behavior);
    let lock_timeout = options.lock_timeout.unwrap_or(config.lock_timeout);

    match service.resolve(&key, behavior, lock_timeout).await {
        Resolution::Hit(value) => {
            debug!(key = %key, "Serving cached response");
            replay(value, CacheStatus::Hit)
        }
        Resolution::Waited(value) => {
            debug!(key = %key, "Serving response computed by another request");
            replay(value, CacheStatus::Wait)
        }
        Resolution::Rejected { retry_after_secs } => {
            debug!(key = %key, "Rejecting request while computation is in flight");
            CacheError::LockContended { retry_after_secs }.into_response()
        }
        Resolution::Compute(computation) => {
            let mut status = computation.status;
            let response = next.run(request).await;

            let response = if computation.store && response.status().is_success() {
                let (response, stored) = store_response(service, &key, response, &options).await;
                if !stored {
                    status = CacheStatus::Bypass;
                }
                response
            } else {
                response
            };
            computation.release().await;

            mark(response, status)
        }
    }
}

/// Splits out everything the key may need, buffering the body only when
/// the key reads body fields.
async fn capture_key_request(
    request: Request,
    route: &str,
    options: &KeyOptions,
) -> Result<(Request, KeyRequest), Response> {
    let (mut parts, body) = request.into_parts();

    let mut key_request = KeyRequest::new(parts.method.as_str(), route);

    if options.params != FieldSelection::Exclude {
        if let Ok(params) = RawPathParams::from_request_parts(&mut parts, &()).await {
            key_request.params = params
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect();
        }
    }

    if options.query != FieldSelection::Exclude {
        if let Ok(Query(pairs)) = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri) {
            key_request.query = pairs;
        }
    }

    if options.headers != FieldSelection::Exclude {
        key_request.headers = parts
            .headers
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_string(), value.to_string()))
            })
            .collect();
    }

    if !options.needs_body() {
        return Ok((Request::from_parts(parts, body), key_request));
    }

    let bytes = body::to_bytes(body, MAX_KEY_BODY_BYTES).await.map_err(|e| {
        debug!(error = %e, "Failed to buffer request body for cache key");
        StatusCode::PAYLOAD_TOO_LARGE.into_response()
    })?;
    key_request.body = serde_json::from_slice(&bytes).ok();
    if key_request.body.is_none() && !bytes.is_empty() {
        key_request.raw_body = Some(bytes.clone());
    }

    Ok((Request::from_parts(parts, Body::from(bytes)), key_request))
}

/// Buffers a 2xx response, stores it and hands back an identical response.
///
/// Returns whether the response was stored. Bodies over
/// `max_response_bytes` are streamed through unstored.
async fn store_response(
    service: &CacheService,
    key: &str,
    response: Response,
    options: &RouteCacheOptions,
) -> (Response, bool) {
    let (parts, body) = response.into_parts();
    let limit = service.config().max_response_bytes;
    let bytes = match buffer_limited(body, limit).await {
        Ok(BufferedBody::Complete(bytes)) => bytes,
        Ok(BufferedBody::TooLarge(body)) => {
            debug!(key, limit, "Response too large to cache");
            return (Response::from_parts(parts, body), false);
        }
        Err(e) => {
            warn!(key, error = %e, "Failed to capture response body");
            return (CacheError::Serialization(e.to_string()).into_response(), false);
        }
    };

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let value = CachedResponse::new(parts.status.as_u16(), content_type, bytes.clone());
    let ttl = options.ttl.unwrap_or(service.config().default_ttl);
    let set_options = SetOptions {
        compress: options.compress,
        tags: options.tags.clone(),
    };

    let stored = match service.set(key, value, ttl, set_options).await {
        Ok(()) => true,
        Err(e) => {
            warn!(key, error = %e, "Failed to store response");
            service.record_backend_error();
            false
        }
    };

    (Response::from_parts(parts, Body::from(bytes)), stored)
}

enum BufferedBody {
    Complete(Bytes),
    /// The limit was exceeded; the body is rebuilt from the chunks read so
    /// far followed by the rest of the stream.
    TooLarge(Body),
}

async fn buffer_limited(body: Body, limit: usize) -> Result<BufferedBody, axum::Error> {
    let mut data = body.into_data_stream();
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut total = 0usize;

    while let Some(chunk) = data.next().await {
        let chunk = chunk?;
        total = total.saturating_add(chunk.len());
        chunks.push(chunk);
        if total > limit {
            let head = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
            return Ok(BufferedBody::TooLarge(Body::from_stream(head.chain(data))));
        }
    }

    let mut buf = BytesMut::with_capacity(total);
    for chunk in chunks {
        buf.extend_from_slice(&chunk);
    }
    Ok(BufferedBody::Complete(buf.freeze()))
}

fn replay(value: CachedResponse, status: CacheStatus) -> Response {
    let code = StatusCode::from_u16(value.status).unwrap_or(StatusCode::OK);
    let mut response = (code, Body::from(value.body)).into_response();
    if let Some(content_type) = value
        .content_type
        .and_then(|content_type| HeaderValue::from_str(&content_type).ok())
    {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    mark(response, status)
}

fn mark(mut response: Response, status: CacheStatus) -> Response {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(status.as_str()));
    response
}
