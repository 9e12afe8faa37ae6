//! Ingestion handler.
//!
//! Interprets a validated request body as one of the telemetry kinds and
//! delegates storage to the persistence collaborator. Checks run
//! cheapest first: body shape, then origin, then payload schema.

use crate::gateway::{client_ip, preflight_response};
use crate::state::AppState;
use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sitepulse_core::entities::{ClientMeta, EventKind, EventRecord};
use sitepulse_core::origin::origin_allowed;
use sitepulse_core::store::StoreError;
use sitepulse_core::validate::ValidationFailure;
use sitepulse_sdk::objects::TelemetryEvent;

/// `POST /ingest` – classify, enrich and persist one telemetry event.
pub async fn ingest_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, IngestError> {
    let event: TelemetryEvent =
        serde_json::from_slice(&body).map_err(IngestError::MalformedBody)?;

    // Defense in depth: the gateway already filters origins via CORS,
    // but browser POSTs carry an Origin header we can re-check.
    if let Some(origin) = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok())
    {
        let trusted = state.trusted_origins.read().await;
        if !origin_allowed(origin, &trusted) {
            return Err(IngestError::OriginRejected);
        }
    }

    let kind = EventKind::from(&event);
    state
        .validator
        .validate(kind, event.payload())
        .map_err(IngestError::Validation)?;

    let client = client_meta(&headers);
    let record = EventRecord::new(kind, event.into_payload(), client);
    tracing::debug!(kind = %kind, client = %record.client.ip, "ingesting telemetry event");

    let ack = match kind {
        EventKind::Performance => {
            state.store.insert_performance(record).await?;
            json!({ "success": true })
        }
        EventKind::Pageview => {
            state.store.insert_pageview(record).await?;
            json!({ "success": true })
        }
        EventKind::Utm => {
            let id = state.store.insert_utm(record).await?;
            json!({ "id": id })
        }
        EventKind::Campaign => {
            state.store.insert_campaign(record).await?;
            json!({ "success": true })
        }
    };

    Ok(Json(ack).into_response())
}

/// `OPTIONS /ingest` – CORS preflight for callers that reach the handler
/// without the gateway layer.
pub async fn preflight(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    let trusted = state.trusted_origins.read().await;
    preflight_response(origin, &trusted)
}

/// Derive client metadata from the request headers.
fn client_meta(headers: &HeaderMap) -> ClientMeta {
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok());
    let country = geo_header(headers, &["cf-ipcountry", "x-vercel-ip-country"]);
    let region = geo_header(headers, &["x-vercel-ip-country-region"]);
    ClientMeta::from_request(client_ip(headers), user_agent, country, region)
}

fn geo_header(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        headers
            .get(*name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
    })
}

// ---------------------------------------------------------------------------
// Error handling
// ---------------------------------------------------------------------------

/// Errors that can occur in the ingestion handler.
#[derive(Debug)]
pub enum IngestError {
    /// The body is not valid JSON for the event wire shape.
    MalformedBody(serde_json::Error),
    /// The request origin is not in the trusted set.
    OriginRejected,
    /// The payload failed the schema collaborator's checks.
    Validation(ValidationFailure),
    /// The persistence collaborator failed.
    Store(StoreError),
}

impl From<StoreError> for IngestError {
    fn from(error: StoreError) -> Self {
        Self::Store(error)
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        match self {
            IngestError::MalformedBody(error) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "invalid request body",
                    "details": { "message": error.to_string() }
                })),
            )
                .into_response(),
            IngestError::OriginRejected => (
                StatusCode::FORBIDDEN,
                Json(json!({ "error": "origin not allowed" })),
            )
                .into_response(),
            IngestError::Validation(failure) => (
                StatusCode::BAD_REQUEST,
                Json(json!({
                    "error": "payload failed validation",
                    "details": failure.details
                })),
            )
                .into_response(),
            IngestError::Store(error) => {
                tracing::error!(error = %error, "persistence collaborator failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error").into_response()
            }
        }
    }
}
