//! Rate limiting middleware.

use std::net::SocketAddr;

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use common::{AppError, AppResult, RateLimitConfig};

use crate::state::AppState;

/// Counter backend for request rate limiting.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one request for `identifier`. Returns (current_count, allowed).
    async fn check(
        &self,
        identifier: &str,
        max_requests: u64,
        window_seconds: u64,
    ) -> AppResult<(u64, bool)>;

    /// Check the backend is reachable.
    async fn ping(&self) -> AppResult<()>;
}

/// Rate limit middleware for general endpoints.
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let limit = state.config.rate_limit;
    rate_limit_internal(state, connect_info, request, next, limit).await
}

/// Rate limit middleware for login and registration (stricter).
pub async fn rate_limit_auth_middleware(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let limit = state.config.auth_rate_limit;
    rate_limit_internal(state, connect_info, request, next, limit).await
}

async fn rate_limit_internal(
    state: AppState,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request<Body>,
    next: Next,
    limit: RateLimitConfig,
) -> Response {
    let ip = client_ip(&request, connect_info, state.config.trust_forwarded_headers);
    let identifier = format!("{}:{}", request.uri().path(), ip);

    let count = match state
        .rate_limiter
        .check(&identifier, limit.max_requests, limit.window_seconds)
        .await
    {
        Ok((count, true)) => count,
        Ok((_, false)) => return rate_limit_exceeded_response(limit),
        // Fail closed: a limiter we cannot reach does not let traffic through
        Err(e) => {
            warn!("Rate limiter unavailable: {}", e);
            return AppError::unavailable("rate limiter").into_response();
        }
    };

    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit.max_requests));
    headers.insert(
        "X-RateLimit-Remaining",
        HeaderValue::from(limit.max_requests.saturating_sub(count)),
    );

    response
}

fn client_ip(
    request: &Request<Body>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    trust_forwarded_headers: bool,
) -> String {
    if trust_forwarded_headers {
        if let Some(ip) = forwarded_ip(request) {
            return ip;
        }
    }

    connect_info
        .map(|ci| ci.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn forwarded_ip(request: &Request<Body>) -> Option<String> {
    if let Some(forwarded) = request
        .headers()
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
    {
        if let Some(ip) = forwarded.split(',').next() {
            return Some(ip.trim().to_string());
        }
    }

    request
        .headers()
        .get("X-Real-IP")
        .and_then(|h| h.to_str().ok())
        .map(|ip| ip.trim().to_string())
}

fn rate_limit_exceeded_response(limit: RateLimitConfig) -> Response {
    let mut response = AppError::TooManyRequests.into_response();

    let headers = response.headers_mut();
    headers.insert("Retry-After", HeaderValue::from(limit.window_seconds));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    headers.insert("X-RateLimit-Limit", HeaderValue::from(limit.max_requests));

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request_from(forwarded_for: &str) -> Request<Body> {
        Request::builder()
            .uri("/login")
            .header("X-Forwarded-For", forwarded_for)
            .header("X-Real-IP", "192.0.2.9")
            .body(Body::empty())
            .unwrap()
    }

    fn peer() -> Option<ConnectInfo<SocketAddr>> {
        Some(ConnectInfo(SocketAddr::from(([198, 51, 100, 1], 5000))))
    }

    #[test]
    fn test_forwarded_headers_ignored_by_default() {
        let first = client_ip(&request_from("203.0.113.7"), peer(), false);
        let second = client_ip(&request_from("203.0.113.8"), peer(), false);

        assert_eq!(first, "198.51.100.1");
        assert_eq!(first, second);
    }

    #[test]
    fn test_forwarded_headers_used_behind_trusted_proxy() {
        let ip = client_ip(&request_from("203.0.113.7, 10.0.0.1"), peer(), true);
        assert_eq!(ip, "203.0.113.7");

        let request = Request::builder()
            .uri("/login")
            .header("X-Real-IP", "192.0.2.9")
            .body(Body::empty())
            .unwrap();
        assert_eq!(client_ip(&request, peer(), true), "192.0.2.9");
    }

    #[test]
    fn test_unknown_peer_without_connect_info() {
        assert_eq!(client_ip(&request_from("203.0.113.7"), None, false), "unknown");
    }
}
