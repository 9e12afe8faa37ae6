//! CSRF token lifecycle.
//!
//! Concurrent senders share one token, and acquisition is single-flight:
//! however many callers need a token at once, only one network call is
//! made and every caller awaits its result.

use crate::client::ClientError;
use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Acquisition attempts before giving up.
pub const INIT_MAX_ATTEMPTS: u32 = 3;
/// Delay between acquisition attempts.
pub const INIT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Fetch seam for the token-issuing endpoint.
#[async_trait]
pub trait TokenFetcher: Send + Sync + 'static {
    /// Hit the token-issuing endpoint once and read the CSRF cookie.
    /// `Ok(None)` means the request went through but the cookie is not
    /// observable yet.
    async fn fetch(&self) -> Result<Option<String>, ClientError>;
}

/// Errors surfaced by [`TokenManager::ensure_token`].
///
/// The attempt ceiling is a hard stop; callers must surface the failure
/// rather than retry indefinitely.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("csrf token initialization exhausted after {0} attempts")]
    Exhausted(u32),
}

type AcquireFuture = Shared<BoxFuture<'static, Result<String, TokenError>>>;

#[derive(Default)]
struct TokenState {
    token: Option<String>,
    in_flight: Option<AcquireFuture>,
}

/// Process-wide CSRF token state. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct TokenManager {
    fetcher: Arc<dyn TokenFetcher>,
    state: Arc<Mutex<TokenState>>,
}

impl TokenManager {
    pub fn new(fetcher: Arc<dyn TokenFetcher>) -> Self {
        Self {
            fetcher,
            state: Arc::new(Mutex::new(TokenState::default())),
        }
    }

    /// Return the cached token, or acquire one.
    ///
    /// Callers arriving while an acquisition is in flight attach to it
    /// instead of issuing a duplicate network call.
    pub async fn ensure_token(&self) -> Result<String, TokenError> {
        let acquisition = {
            let mut state = self.state.lock().await;
            if let Some(token) = &state.token {
                return Ok(token.clone());
            }
            match &state.in_flight {
                Some(acquisition) => acquisition.clone(),
                None => {
                    let acquisition = acquire(self.fetcher.clone(), self.state.clone())
                        .boxed()
                        .shared();
                    state.in_flight = Some(acquisition.clone());
                    acquisition
                }
            }
        };
        acquisition.await
    }

    /// Drop the cached token after a 403 so the next sender re-acquires.
    pub async fn invalidate(&self) {
        self.state.lock().await.token = None;
    }

    /// Whether a token is currently cached.
    pub async fn is_initialized(&self) -> bool {
        self.state.lock().await.token.is_some()
    }
}

/// Run the acquisition attempts and publish the outcome. The in-flight
/// handle is cleared only after success or terminal failure.
async fn acquire(
    fetcher: Arc<dyn TokenFetcher>,
    state: Arc<Mutex<TokenState>>,
) -> Result<String, TokenError> {
    let result = attempt_loop(fetcher.as_ref()).await;
    let mut state = state.lock().await;
    state.in_flight = None;
    if let Ok(token) = &result {
        state.token = Some(token.clone());
    }
    result
}

async fn attempt_loop(fetcher: &dyn TokenFetcher) -> Result<String, TokenError> {
    for attempt in 1..=INIT_MAX_ATTEMPTS {
        match fetcher.fetch().await {
            Ok(Some(token)) => {
                tracing::debug!(attempt, "csrf token acquired");
                return Ok(token);
            }
            Ok(None) => {
                tracing::debug!(attempt, "csrf cookie not observable yet");
            }
            Err(error) => {
                tracing::warn!(error = %error, attempt, "csrf token fetch failed");
            }
        }
        if attempt < INIT_MAX_ATTEMPTS {
            tokio::time::sleep(INIT_RETRY_DELAY).await;
        }
    }
    Err(TokenError::Exhausted(INIT_MAX_ATTEMPTS))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Counts calls; yields `tokens[n]` behaviour per call index.
    struct ScriptedFetcher {
        calls: AtomicU32,
        delay: Duration,
        script: Box<dyn Fn(u32) -> Option<String> + Send + Sync>,
    }

    impl ScriptedFetcher {
        fn new(
            delay: Duration,
            script: impl Fn(u32) -> Option<String> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
                delay,
                script: Box::new(script),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenFetcher for ScriptedFetcher {
        async fn fetch(&self) -> Result<Option<String>, ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok((self.script)(call))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_acquisition() {
        let fetcher =
            ScriptedFetcher::new(Duration::from_millis(50), |_| Some("tok-1".to_owned()));
        let manager = TokenManager::new(fetcher.clone());

        let results = join_all((0..8).map(|_| manager.ensure_token())).await;
        for result in results {
            assert_eq!(result.unwrap(), "tok-1");
        }
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn initialized_manager_skips_the_network() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, |n| Some(format!("tok-{n}")));
        let manager = TokenManager::new(fetcher.clone());

        assert_eq!(manager.ensure_token().await.unwrap(), "tok-0");
        assert_eq!(manager.ensure_token().await.unwrap(), "tok-0");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_reacquisition() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, |n| Some(format!("tok-{n}")));
        let manager = TokenManager::new(fetcher.clone());

        assert_eq!(manager.ensure_token().await.unwrap(), "tok-0");
        manager.invalidate().await;
        assert!(!manager.is_initialized().await);
        assert_eq!(manager.ensure_token().await.unwrap(), "tok-1");
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unobservable_cookie_exhausts_after_three_attempts() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, |_| None);
        let manager = TokenManager::new(fetcher.clone());

        let started = tokio::time::Instant::now();
        let result = manager.ensure_token().await;
        assert_eq!(result, Err(TokenError::Exhausted(INIT_MAX_ATTEMPTS)));
        assert_eq!(fetcher.calls(), 3);
        // Two inter-attempt delays of one second each.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_failure_clears_the_in_flight_slot() {
        let fetcher = ScriptedFetcher::new(Duration::ZERO, |n| {
            (n >= 3).then(|| "tok-late".to_owned())
        });
        let manager = TokenManager::new(fetcher.clone());

        assert!(manager.ensure_token().await.is_err());
        assert_eq!(manager.ensure_token().await.unwrap(), "tok-late");
        assert_eq!(fetcher.calls(), 4);
    }
}
