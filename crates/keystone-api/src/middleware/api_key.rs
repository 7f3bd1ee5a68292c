//! Static API key gate for everything under `/api`
//!
//! A coarse pre-authentication check: callers must present the configured
//! key in `x-api-key`. It runs before, and independently of, bearer auth.

use crate::response::ErrorBody;
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::warn;

pub const API_KEY_HEADER: &str = "x-api-key";

/// The configured key
#[derive(Clone)]
pub struct ApiKey(Arc<str>);

impl ApiKey {
    pub fn new(key: impl AsRef<str>) -> Self {
        Self(Arc::from(key.as_ref()))
    }

    /// Exact, constant-time comparison
    pub fn matches(&self, candidate: &str) -> bool {
        constant_time_eq(self.0.as_bytes(), candidate.as_bytes())
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Compare without short-circuiting on the first differing byte
fn constant_time_eq(expected: &[u8], candidate: &[u8]) -> bool {
    if expected.len() != candidate.len() {
        return false;
    }
    expected
        .iter()
        .zip(candidate)
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// API key middleware; use with `from_fn_with_state`
pub async fn require_api_key(
    State(key): State<ApiKey>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    match presented {
        Some(candidate) if key.matches(candidate) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "api key mismatch");
            reject()
        }
        None => {
            warn!(path = %request.uri().path(), "api key missing");
            reject()
        }
    }
}

fn reject() -> Response {
    ErrorBody::new("UNAUTHORIZED", "Unauthorized").into_response_with(StatusCode::UNAUTHORIZED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route("/ping", get(|| async { "pong" }))
            .layer(middleware::from_fn_with_state(
                ApiKey::new("s3cret-key"),
                require_api_key,
            ))
    }

    async fn status_with(key: Option<&str>) -> StatusCode {
        let mut request = HttpRequest::builder().uri("/ping");
        if let Some(key) = key {
            request = request.header(API_KEY_HEADER, key);
        }
        app()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
            .status()
    }

    #[tokio::test]
    async fn test_matching_key_passes() {
        assert_eq!(status_with(Some("s3cret-key")).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_missing_or_wrong_key_rejected() {
        assert_eq!(status_with(None).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_with(Some("wrong")).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_with(Some("S3CRET-KEY")).await, StatusCode::UNAUTHORIZED);
        assert_eq!(status_with(Some("s3cret-key ")).await, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_debug_hides_key() {
        assert_eq!(format!("{:?}", ApiKey::new("s3cret-key")), "ApiKey(***)");
    }
}
