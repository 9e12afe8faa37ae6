//! Application state shared across all request handlers.

use sitepulse_core::csrf::CsrfService;
use sitepulse_core::limiter::RateLimiter;
use sitepulse_core::store::EventStore;
use sitepulse_core::validate::SchemaValidator;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Trusted origins (reloadable via SIGHUP).
    pub trusted_origins: Arc<RwLock<Vec<String>>>,
    /// Per-client rate limiter, fixed at startup.
    pub limiter: Arc<RateLimiter>,
    /// CSRF double-submit service, fixed at startup.
    pub csrf: Arc<CsrfService>,
    /// Persistence collaborator.
    pub store: Arc<dyn EventStore>,
    /// Payload schema collaborator.
    pub validator: Arc<dyn SchemaValidator>,
}

impl AppState {
    pub fn new(
        trusted_origins: Vec<String>,
        limiter: RateLimiter,
        csrf: CsrfService,
        store: Arc<dyn EventStore>,
        validator: Arc<dyn SchemaValidator>,
    ) -> Self {
        Self {
            trusted_origins: Arc::new(RwLock::new(trusted_origins)),
            limiter: Arc::new(limiter),
            csrf: Arc::new(csrf),
            store,
            validator,
        }
    }

    /// Replace the trusted-origin list (SIGHUP reload).
    pub async fn update_trusted_origins(&self, origins: Vec<String>) {
        *self.trusted_origins.write().await = origins;
    }
}
