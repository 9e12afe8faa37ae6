//! Enriched telemetry records handed to the persistence collaborator.

use crate::entities::ClientMeta;
use serde::{Deserialize, Serialize};
use sitepulse_sdk::objects::{EventPayload, TelemetryEvent};
use time::OffsetDateTime;
use uuid::Uuid;

/// The four telemetry kinds the pipeline ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Performance,
    Pageview,
    Utm,
    Campaign,
}

impl EventKind {
    /// Wire name, matching the `type` discriminant of the ingest body.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Performance => "performance",
            EventKind::Pageview => "pageview",
            EventKind::Utm => "utm",
            EventKind::Campaign => "campaign",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&TelemetryEvent> for EventKind {
    fn from(event: &TelemetryEvent) -> Self {
        match event {
            TelemetryEvent::Performance(_) => EventKind::Performance,
            TelemetryEvent::Pageview(_) => EventKind::Pageview,
            TelemetryEvent::Utm(_) => EventKind::Utm,
            TelemetryEvent::Campaign(_) => EventKind::Campaign,
        }
    }
}

/// A telemetry event enriched with server-derived metadata, ready for
/// storage.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub kind: EventKind,
    /// Opaque payload; only downstream consumers interpret it.
    pub payload: EventPayload,
    pub client: ClientMeta,
    #[serde(with = "time::serde::rfc3339")]
    pub received_at: OffsetDateTime,
}

impl EventRecord {
    /// Build a record with a fresh time-ordered id and the current
    /// timestamp.
    pub fn new(kind: EventKind, payload: EventPayload, client: ClientMeta) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            payload,
            client,
            received_at: OffsetDateTime::now_utc(),
        }
    }
}
