//! Domain records for ingested telemetry.

pub mod client_meta;
pub mod event_record;

pub use client_meta::{ClientMeta, DeviceClass};
pub use event_record::{EventKind, EventRecord};
