use crate::error::ApiError;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::warn;

/// Header carrying the API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Auth configuration for the gateway.
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    /// API keys that are accepted. Empty = no auth required.
    pub api_keys: Vec<String>,
}

impl AuthConfig {
    /// Accept the given keys.
    pub fn new(api_keys: Vec<String>) -> Self {
        Self { api_keys }
    }

    /// Returns true if authentication is enabled (at least one key configured).
    pub fn is_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    /// Whether `candidate` is one of the configured keys.
    pub fn accepts(&self, candidate: &str) -> bool {
        self.api_keys.iter().any(|key| keys_match(key, candidate))
    }
}

/// Constant-time comparison of two keys.
pub fn keys_match(expected: &str, candidate: &str) -> bool {
    let a = expected.as_bytes();
    let b = candidate.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Auth middleware: validates the `x-api-key` header.
///
/// If no API keys are configured, all requests are allowed.
pub async fn api_key_middleware(
    State(auth): State<Arc<AuthConfig>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !auth.is_enabled() {
        return next.run(request).await;
    }

    let key = headers.get(API_KEY_HEADER).and_then(|v| v.to_str().ok());
    match key {
        Some(k) if auth.accepts(k) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "Rejected request: invalid API key");
            ApiError::unauthorized("Invalid API key").into_response()
        }
        None => {
            warn!(path = %request.uri().path(), "Rejected request: missing API key");
            ApiError::unauthorized("API key required").into_response()
        }
    }
}
