//! Wire contract shared by the SDK and the ingestion server.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Header the client echoes the CSRF token in.
pub const CSRF_HEADER: &str = "x-csrf-token";
/// Cookie the server stores the CSRF token in. Script-readable so the
/// client can copy its value into [`CSRF_HEADER`].
pub const CSRF_COOKIE: &str = "csrf-token";

/// Path of the ingestion endpoint.
pub const INGEST_PATH: &str = "/api/v1/ingest";
/// Path of the token-issuing endpoint.
pub const CSRF_PATH: &str = "/api/v1/csrf";

/// Opaque event payload: string keys mapping to JSON primitives.
pub type EventPayload = serde_json::Map<String, serde_json::Value>;

/// A client-generated telemetry event.
///
/// Serializes as `{ "type": "<kind>", "payload": { … } }`. Payloads are
/// opaque to the queue and the gateway; only the ingestion handler
/// interprets them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "lowercase")]
pub enum TelemetryEvent {
    Performance(EventPayload),
    Pageview(EventPayload),
    Utm(EventPayload),
    Campaign(EventPayload),
}

impl TelemetryEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryEvent::Performance(_) => "performance",
            TelemetryEvent::Pageview(_) => "pageview",
            TelemetryEvent::Utm(_) => "utm",
            TelemetryEvent::Campaign(_) => "campaign",
        }
    }

    pub fn payload(&self) -> &EventPayload {
        match self {
            TelemetryEvent::Performance(payload)
            | TelemetryEvent::Pageview(payload)
            | TelemetryEvent::Utm(payload)
            | TelemetryEvent::Campaign(payload) => payload,
        }
    }

    pub fn into_payload(self) -> EventPayload {
        match self {
            TelemetryEvent::Performance(payload)
            | TelemetryEvent::Pageview(payload)
            | TelemetryEvent::Utm(payload)
            | TelemetryEvent::Campaign(payload) => payload,
        }
    }
}

/// Success acknowledgment from the ingestion endpoint.
///
/// `{"success":true}` for most kinds; UTM attributions return `{"id":…}`
/// so the client can correlate later events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestAck {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
}

/// Error body returned by the gateway and the handler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}
