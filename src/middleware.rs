use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::handlers::AppState;
use crate::rate_limiter::Decision;

pub const REQUEST_ID: &str = "x-request-id";
const RATE_LIMIT_LIMIT: &str = "x-ratelimit-limit";
const RATE_LIMIT_REMAINING: &str = "x-ratelimit-remaining";

/// Logging middleware for request/response tracking
pub async fn logging_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let client_ip = state.client_keys.client_key(request.headers(), peer_addr(&request));

    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(REQUEST_ID, value);
    }

    info!(
        target: "shopgate::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        client_ip = %client_ip,
        "Incoming request"
    );

    let mut response = next.run(request).await;

    let status = response.status();
    info!(
        target: "shopgate::middleware",
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status,
        "Request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response
}

/// Sliding window gate in front of every API request
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.is_api_path(request.uri().path()) {
        return next.run(request).await;
    }

    let client_id = state.client_keys.client_key(request.headers(), peer_addr(&request));
    let decision = state.limiter.check(&client_id);
    state.metrics.record_request(decision.is_allowed()).await;

    match decision {
        Decision::Reject { retry_after } => {
            warn!(
                target: "shopgate::middleware",
                client_id = %client_id,
                path = %request.uri().path(),
                retry_after,
                "Rate limit exceeded"
            );
            ServiceError::RateLimitExceeded { retry_after }.into_response()
        }
        Decision::Allow { remaining } => {
            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(
                RATE_LIMIT_LIMIT,
                HeaderValue::from(state.limiter.max_requests()),
            );
            headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(remaining));
            response
        }
    }
}

/// Rejects API writes whose body is neither JSON nor multipart
pub async fn content_type_guard(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let is_write = matches!(*request.method(), Method::POST | Method::PUT | Method::PATCH);

    if is_write
        && state.config.is_api_path(request.uri().path())
        && !accepted_content_type(request.headers())
    {
        return ServiceError::UnsupportedContentType.into_response();
    }

    next.run(request).await
}

/// Adds security headers to API responses
pub async fn security_headers(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let is_api = state.config.is_api_path(request.uri().path());
    let is_https = request
        .headers()
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(|proto| proto.eq_ignore_ascii_case("https"))
        .unwrap_or(false);

    let mut response = next.run(request).await;
    if !is_api {
        return response;
    }

    let headers = response.headers_mut();
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static("default-src 'none'"),
    );
    headers.insert(header::SERVER, HeaderValue::from_static("Shop API"));
    if is_https {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static("max-age=31536000; includeSubDomains"),
        );
    }
    response
}

/// Rewrites the plain 413 produced by the body limit layer into the JSON envelope
pub async fn payload_too_large_envelope(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);

    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_json {
        return ServiceError::PayloadTooLarge.into_response();
    }
    response
}

fn peer_addr(request: &Request) -> Option<SocketAddr> {
    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr)
}

fn accepted_content_type(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("application/json") || ct.contains("multipart/form-data")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepted_content_types() {
        let mut headers = HeaderMap::new();
        assert!(!accepted_content_type(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        assert!(accepted_content_type(&headers));

        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("multipart/form-data; boundary=x"),
        );
        assert!(accepted_content_type(&headers));

        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        assert!(!accepted_content_type(&headers));
    }

    #[tokio::test]
    async fn test_plain_413_is_rewritten() {
        let plain = (StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded").into_response();
        let response = payload_too_large_envelope(plain).await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");

        let ok = payload_too_large_envelope(StatusCode::OK.into_response()).await;
        assert_eq!(ok.status(), StatusCode::OK);
    }

    #[test]
    fn test_peer_addr_from_connect_info() {
        let mut request = Request::new(axum::body::Body::empty());
        assert_eq!(peer_addr(&request), None);

        let addr = SocketAddr::from(([192, 0, 2, 1], 5000));
        request.extensions_mut().insert(ConnectInfo(addr));
        assert_eq!(peer_addr(&request), Some(addr));
    }
}
