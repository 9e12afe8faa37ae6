//! Typed HTTP client for the Sitepulse ingestion API.

use super::{ClientError, DeliveryStatus, EventTransport, SendError, send_with_token};
use crate::objects::{CSRF_COOKIE, CSRF_HEADER, CSRF_PATH, INGEST_PATH, TelemetryEvent};
use crate::token::{TokenFetcher, TokenManager};
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use url::Url;

/// HTTP client for the ingestion API.
///
/// Owns the cookie jar the CSRF cookie lives in, so token acquisition
/// and event delivery share one cookie state; the double-submit check
/// requires the cookie and the header to travel together.
#[derive(Clone)]
pub struct IngestClient {
    http: Client,
    jar: Arc<Jar>,
    base_url: Url,
}

impl IngestClient {
    /// Create a new `IngestClient` rooted at the server base URL.
    pub fn new(base_url: Url) -> Result<Self, ClientError> {
        Self::from_builder(base_url, Client::builder())
    }

    /// Build from a custom `reqwest::ClientBuilder` (timeouts, proxy, …).
    /// The builder's cookie store is replaced with the client's own jar.
    pub fn from_builder(
        base_url: Url,
        builder: reqwest::ClientBuilder,
    ) -> Result<Self, ClientError> {
        let jar = Arc::new(Jar::default());
        let http = builder.cookie_provider(jar.clone()).build()?;
        Ok(Self {
            http,
            jar,
            base_url,
        })
    }

    /// Absolute URL of the ingestion endpoint.
    pub fn ingest_url(&self) -> Result<Url, ClientError> {
        Ok(self.base_url.join(INGEST_PATH)?)
    }

    /// One-shot delivery with the single 403-invalidate-retry dance, for
    /// producers that bypass the queue.
    pub async fn send_event(
        &self,
        tokens: &TokenManager,
        event: &TelemetryEvent,
    ) -> Result<(), SendError> {
        let target = self.ingest_url().map_err(SendError::Transport)?;
        send_with_token(self, tokens, &target, event).await
    }

    /// Read the CSRF cookie for the server origin out of the jar.
    fn cookie_token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.base_url)?;
        let raw = header.to_str().ok()?;
        cookie_value(raw, CSRF_COOKIE)
    }
}

#[async_trait]
impl TokenFetcher for IngestClient {
    async fn fetch(&self) -> Result<Option<String>, ClientError> {
        let url = self.base_url.join(CSRF_PATH)?;
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api { status, body });
        }
        Ok(self.cookie_token())
    }
}

#[async_trait]
impl EventTransport for IngestClient {
    async fn deliver(
        &self,
        target: &Url,
        event: &TelemetryEvent,
        token: &str,
    ) -> Result<DeliveryStatus, ClientError> {
        let resp = self
            .http
            .post(target.clone())
            .header(CSRF_HEADER, token)
            .json(event)
            .send()
            .await?;

        let status = resp.status();
        Ok(if status.is_success() {
            DeliveryStatus::Accepted
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok());
            DeliveryStatus::RateLimited { retry_after }
        } else if status == StatusCode::FORBIDDEN {
            DeliveryStatus::Forbidden
        } else if status.is_server_error() {
            DeliveryStatus::ServerError
        } else {
            DeliveryStatus::Rejected
        })
    }
}

/// Extract one cookie's value from a `Cookie`-header-shaped string
/// (`name=value; other=value`).
fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|pair| {
        pair.split_once('=')
            .and_then(|(key, value)| (key == name).then(|| value.to_owned()))
    })
}
