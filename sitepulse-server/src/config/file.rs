//! TOML file configuration structures.
//!
//! These structs directly map to the `sitepulse-config.toml` file format.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Root configuration structure as read from the TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    pub server: ServerSection,
    pub security: SecuritySection,
    #[serde(default)]
    pub rate_limit: RateLimitSection,
    /// Optional JSON Schema files for payload validation, keyed by the
    /// event kind wire name.
    #[serde(default)]
    pub schemas: BTreeMap<String, PathBuf>,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// The address and port to listen on (e.g., "0.0.0.0:8080").
    #[serde(default = "default_listen_addr")]
    pub listen: SocketAddr,
}

fn default_listen_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().expect("valid default address")
}

/// Security configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySection {
    /// Origins allowed to call the ingestion API: exact origins or
    /// `https://*.domain` wildcards. The first entry doubles as the
    /// default origin echoed to untrusted preflights and must be exact.
    pub trusted_origins: Vec<String>,
    /// HMAC key for the CSRF double-submit token. Generated at startup
    /// when absent; set it when running more than one instance.
    #[serde(default)]
    pub csrf_key: Option<String>,
}

/// Rate limit configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_points")]
    pub points: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            points: default_points(),
            window_ms: default_window_ms(),
        }
    }
}

fn default_points() -> u32 {
    10
}

fn default_window_ms() -> u64 {
    1000
}
