//! HTTP API surface.
//!
//! # Endpoints
//!
//! - `GET     /api/v1/csrf`   – issue the CSRF cookie
//! - `POST    /api/v1/ingest` – ingest one telemetry event (gateway-guarded)
//! - `OPTIONS /api/v1/ingest` – CORS preflight

use crate::gateway;
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

pub mod csrf;
pub mod ingest;

/// Build the versioned API router.
///
/// The security gateway wraps only the ingestion scope; the token
/// endpoint stays outside it.
pub fn router(state: AppState) -> Router<AppState> {
    let guarded = Router::new()
        .route(
            "/ingest",
            post(ingest::ingest_event).options(ingest::preflight),
        )
        .route_layer(middleware::from_fn_with_state(
            state,
            gateway::security_gateway,
        ));

    Router::new()
        .route("/csrf", get(csrf::issue_token))
        .merge(guarded)
}
