//! Token-issuing endpoint.

use crate::state::AppState;
use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use sitepulse_sdk::objects::CSRF_COOKIE;

/// `GET /csrf` – set a fresh CSRF cookie.
///
/// The cookie is deliberately not HttpOnly: the client reads it and
/// copies its value into the `x-csrf-token` header (double-submit).
/// Callers do not need a body, so this returns 204.
pub async fn issue_token(State(state): State<AppState>) -> Response {
    let pair = state.csrf.issue();
    let cookie = format!("{CSRF_COOKIE}={}; Path=/; SameSite=Lax; Secure", pair.token);
    match HeaderValue::from_str(&cookie) {
        Ok(value) => {
            let mut resp = StatusCode::NO_CONTENT.into_response();
            resp.headers_mut().insert(header::SET_COOKIE, value);
            resp
        }
        Err(error) => {
            tracing::error!(error = %error, "failed to encode csrf cookie");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
        }
    }
}
