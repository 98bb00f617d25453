//! Response-header middleware
//!
//! Three layers applied to every routed endpoint (`/ping` is exempt):
//!
//! - CORS with an origin allow-list; mismatches are rejected with 403 and
//!   `OPTIONS` preflights are answered directly with 204
//! - no-cache headers so intermediaries never cache session responses
//! - an RFC 3339 `X-Timestamp` stamped after the handler runs

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS,
    ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN, CACHE_CONTROL, EXPIRES, ORIGIN,
    PRAGMA,
};
use axum::http::{HeaderMap, HeaderName, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};
use chrono::{SecondsFormat, Utc};
use serde_json::json;

/// Response header carrying the time the response was produced.
pub const TIMESTAMP_HEADER: HeaderName = HeaderName::from_static("x-timestamp");

const ALLOW_METHODS: &str = "GET, POST, DELETE, PATCH, OPTIONS";
const ALLOW_HEADERS: &str = "Origin, Content-Type, X-CSRF-Token, X-Requested-With, Accept, \
     Accept-Version, Content-Length, Content-MD5, Date, X-Api-Version, X-Client-Id, Authorization";

/// Origin policy parsed once from the `ALLOW_ORIGIN` setting.
#[derive(Debug, Clone)]
pub struct HttpHeaders {
    allow: AllowedOrigins,
}

#[derive(Debug, Clone)]
enum AllowedOrigins {
    Any,
    List(Vec<String>),
}

impl HttpHeaders {
    pub fn new(allow_origin: &str) -> Self {
        let allow = if allow_origin == "*" {
            AllowedOrigins::Any
        } else {
            AllowedOrigins::List(allow_origin.split(',').map(str::to_string).collect())
        };
        Self { allow }
    }

    /// Verbatim match against the allow-list. An absent `Origin` header is
    /// compared as the empty string, so restrictive lists reject it.
    fn origin_allowed(&self, origin: &str) -> bool {
        match &self.allow {
            AllowedOrigins::Any => true,
            AllowedOrigins::List(allowed) => allowed.iter().any(|entry| entry == origin),
        }
    }
}

/// CORS layer: reject disallowed origins, answer preflights, and reflect the
/// origin into the response headers otherwise.
pub async fn cors(
    State(policy): State<Arc<HttpHeaders>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(ORIGIN)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if !policy.origin_allowed(&origin) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "Origin not allowed" })),
        )
            .into_response();
    }

    if request.method() == Method::OPTIONS {
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut(), &origin);
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut(), &origin);
    response
}

fn apply_cors_headers(headers: &mut HeaderMap, origin: &str) {
    if !origin.is_empty() {
        if let Ok(value) = HeaderValue::from_str(origin) {
            headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, value);
        }
    }
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
}

/// Mark every response uncacheable.
pub async fn no_cache(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("private, no-cache, no-store, must-revalidate"),
    );
    headers.insert(EXPIRES, HeaderValue::from_static("-1"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    response
}

/// Stamp the response with the time it was produced.
pub async fn timestamp(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let now = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    if let Ok(value) = HeaderValue::from_str(&now) {
        response.headers_mut().insert(TIMESTAMP_HEADER, value);
    }
    response
}
