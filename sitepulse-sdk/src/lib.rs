//! Client SDK for the Sitepulse telemetry pipeline.
//!
//! [`objects`] carries the wire contract shared with the server. The
//! `client` feature adds the delivery machinery: a reqwest-backed
//! [`client::IngestClient`], the single-flight [`token::TokenManager`]
//! and the ordered, bounded [`queue::DeliveryQueue`].

pub mod objects;

#[cfg(feature = "client")]
pub mod client;
#[cfg(feature = "client")]
pub mod queue;
#[cfg(feature = "client")]
pub mod token;
