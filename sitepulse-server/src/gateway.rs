//! Security gateway for the ingestion scope.
//!
//! Request pipeline, short-circuiting on the first failure:
//! rate limit → CORS preflight → security headers → CSRF verification.
//! Routes outside the ingestion scope never pass through this layer.

use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use sitepulse_core::limiter::RateDecision;
use sitepulse_core::origin::origin_allowed;
use sitepulse_sdk::objects::{CSRF_COOKIE, CSRF_HEADER};

/// Fixed protective header set attached to every response that clears
/// the rate limiter.
const SECURITY_HEADERS: [(&str, &str); 8] = [
    ("content-security-policy", "default-src 'self'"),
    ("x-frame-options", "DENY"),
    ("x-content-type-options", "nosniff"),
    ("referrer-policy", "strict-origin-when-cross-origin"),
    ("permissions-policy", "camera=(), microphone=(), geolocation=()"),
    ("x-xss-protection", "1; mode=block"),
    (
        "strict-transport-security",
        "max-age=63072000; includeSubDomains; preload",
    ),
    ("access-control-allow-credentials", "true"),
];

pub async fn security_gateway(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let client = client_ip(req.headers());

    if let RateDecision::Limited { retry_after } = state.limiter.check(&client).await {
        tracing::debug!(client = %client, "rate limit exceeded");
        let secs = retry_after.as_secs().max(1);
        let mut resp = (StatusCode::TOO_MANY_REQUESTS, "too many requests").into_response();
        if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
            resp.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return resp;
    }

    if req.method() == Method::OPTIONS {
        let origin = req
            .headers()
            .get(header::ORIGIN)
            .and_then(|value| value.to_str().ok());
        let trusted = state.trusted_origins.read().await;
        return preflight_response(origin, &trusted);
    }

    if is_mutating(req.method()) {
        if let Err(reason) = verify_csrf(&state, req.headers()) {
            tracing::debug!(client = %client, reason, "csrf verification failed");
            return attach_security_headers(
                (StatusCode::FORBIDDEN, "csrf verification failed").into_response(),
            );
        }
    }

    attach_security_headers(next.run(req).await)
}

/// Resolve the client identifier: first `x-forwarded-for` entry, then
/// `x-real-ip`, then a loopback placeholder.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty());

    forwarded
        .or_else(|| {
            headers
                .get("x-real-ip")
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        })
        .unwrap_or_else(|| "127.0.0.1".to_owned())
}

/// 204 preflight response carrying CORS and security headers. The
/// request origin is echoed only when trusted; otherwise the default
/// trusted origin is used.
pub fn preflight_response(origin: Option<&str>, trusted: &[String]) -> Response {
    let echoed = match origin {
        Some(origin) if origin_allowed(origin, trusted) => origin.to_owned(),
        _ => trusted.first().cloned().unwrap_or_default(),
    };

    let mut resp = StatusCode::NO_CONTENT.into_response();
    let headers = resp.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&echoed) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
    }
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("content-type, x-csrf-token"),
    );
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("86400"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("origin"));
    apply_security_headers(headers);
    resp
}

fn verify_csrf(state: &AppState, headers: &HeaderMap) -> Result<(), &'static str> {
    let token = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or("missing csrf header")?;
    let cookie_header = headers
        .get(header::COOKIE)
        .and_then(|value| value.to_str().ok())
        .ok_or("missing cookie header")?;
    let cookie = cookie_value(cookie_header, CSRF_COOKIE).ok_or("missing csrf cookie")?;
    state
        .csrf
        .verify(token, &cookie)
        .map_err(|_| "token mismatch")
}

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::DELETE | Method::PATCH
    )
}

fn attach_security_headers(mut resp: Response) -> Response {
    apply_security_headers(resp.headers_mut());
    resp
}

fn apply_security_headers(headers: &mut HeaderMap) {
    for (name, value) in SECURITY_HEADERS {
        headers.insert(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        );
    }
}

/// Extract one cookie's value from a `Cookie` header string
/// (`name=value; other=value`).
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|pair| {
        pair.split_once('=')
            .and_then(|(key, value)| (key == name).then(|| value.to_owned()))
    })
}
