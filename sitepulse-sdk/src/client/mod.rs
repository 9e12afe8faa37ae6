//! HTTP client plumbing for the Sitepulse APIs.
//!
//! Gated behind the `client` cargo feature so consumers that only need
//! the shared wire types do not pull in `reqwest`.

mod ingest;

pub use ingest::IngestClient;

use crate::objects::TelemetryEvent;
use crate::token::{TokenError, TokenManager};
use async_trait::async_trait;
use reqwest::StatusCode;
use url::Url;

/// Errors produced by the SDK HTTP clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level failure (DNS, TLS, connection reset, …).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The server returned an unexpected non-2xx status code.
    #[error("api error: status {status}, body: {body}")]
    Api { status: StatusCode, body: String },

    /// Response body could not be deserialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The base URL could not be joined with the endpoint path.
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
}

/// Classified outcome of one delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// 2xx: the event was persisted.
    Accepted,
    /// 429: wait for the server-provided hint before retrying.
    RateLimited { retry_after: Option<u64> },
    /// 403: the CSRF token went stale.
    Forbidden,
    /// Any other 4xx: the request itself is wrong, never retried.
    Rejected,
    /// 5xx: transient server fault.
    ServerError,
}

/// Transport seam for delivering one event.
///
/// `Err` is a transport failure; HTTP responses are classified into
/// [`DeliveryStatus`].
#[async_trait]
pub trait EventTransport: Send + Sync + 'static {
    async fn deliver(
        &self,
        target: &Url,
        event: &TelemetryEvent,
        token: &str,
    ) -> Result<DeliveryStatus, ClientError>;
}

/// Errors surfaced by [`send_with_token`].
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Transport(#[from] ClientError),
    #[error("request rejected twice despite a fresh csrf token")]
    TokenRejected,
    #[error("rate limited, retry after {retry_after:?} seconds")]
    RateLimited { retry_after: Option<u64> },
    #[error("request rejected by the server")]
    Rejected,
    #[error("server error")]
    Server,
}

/// One-shot delivery for producers that bypass the queue.
///
/// On 403 the shared token is invalidated and re-acquired exactly once
/// before a single retry; a second 403 is terminal.
pub async fn send_with_token(
    transport: &dyn EventTransport,
    tokens: &TokenManager,
    target: &Url,
    event: &TelemetryEvent,
) -> Result<(), SendError> {
    let token = tokens.ensure_token().await?;
    match transport.deliver(target, event, &token).await? {
        DeliveryStatus::Accepted => return Ok(()),
        DeliveryStatus::Forbidden => {}
        other => return Err(terminal(other)),
    }

    tokens.invalidate().await;
    let token = tokens.ensure_token().await?;
    match transport.deliver(target, event, &token).await? {
        DeliveryStatus::Accepted => Ok(()),
        DeliveryStatus::Forbidden => Err(SendError::TokenRejected),
        other => Err(terminal(other)),
    }
}

fn terminal(status: DeliveryStatus) -> SendError {
    match status {
        DeliveryStatus::RateLimited { retry_after } => SendError::RateLimited { retry_after },
        DeliveryStatus::ServerError => SendError::Server,
        _ => SendError::Rejected,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::objects::EventPayload;
    use crate::token::TokenFetcher;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct StaticFetcher {
        calls: AtomicU32,
    }

    #[async_trait]
    impl TokenFetcher for StaticFetcher {
        async fn fetch(&self) -> Result<Option<String>, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("tok-{n}")))
        }
    }

    /// Replays a fixed list of outcomes, then accepts everything.
    struct ScriptedTransport {
        calls: AtomicU32,
        script: Vec<DeliveryStatus>,
    }

    impl ScriptedTransport {
        fn new(script: Vec<DeliveryStatus>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                script,
            }
        }
    }

    #[async_trait]
    impl EventTransport for ScriptedTransport {
        async fn deliver(
            &self,
            _target: &Url,
            _event: &TelemetryEvent,
            _token: &str,
        ) -> Result<DeliveryStatus, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            Ok(self
                .script
                .get(n)
                .copied()
                .unwrap_or(DeliveryStatus::Accepted))
        }
    }

    fn setup(script: Vec<DeliveryStatus>) -> (ScriptedTransport, Arc<StaticFetcher>, TokenManager)
    {
        let fetcher = Arc::new(StaticFetcher {
            calls: AtomicU32::new(0),
        });
        let tokens = TokenManager::new(fetcher.clone());
        (ScriptedTransport::new(script), fetcher, tokens)
    }

    fn target() -> Url {
        Url::parse("https://telemetry.example.com/api/v1/ingest").unwrap()
    }

    #[tokio::test]
    async fn forbidden_triggers_one_reacquisition_and_retry() {
        let (transport, fetcher, tokens) = setup(vec![DeliveryStatus::Forbidden]);
        let event = TelemetryEvent::Pageview(EventPayload::new());

        send_with_token(&transport, &tokens, &target(), &event)
            .await
            .unwrap();

        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn second_forbidden_is_terminal() {
        let (transport, _fetcher, tokens) =
            setup(vec![DeliveryStatus::Forbidden, DeliveryStatus::Forbidden]);
        let event = TelemetryEvent::Pageview(EventPayload::new());

        let err = send_with_token(&transport, &tokens, &target(), &event)
            .await
            .unwrap_err();

        assert!(matches!(err, SendError::TokenRejected));
        // Exactly one retry: two deliveries, no third.
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rate_limit_hint_is_passed_through() {
        let (transport, _fetcher, tokens) = setup(vec![DeliveryStatus::RateLimited {
            retry_after: Some(7),
        }]);
        let event = TelemetryEvent::Utm(EventPayload::new());

        let err = send_with_token(&transport, &tokens, &target(), &event)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            SendError::RateLimited {
                retry_after: Some(7)
            }
        ));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }
}
