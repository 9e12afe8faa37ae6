//! Ordered, bounded delivery queue for telemetry events.
//!
//! Producers enqueue and move on; a single drain worker delivers events
//! in enqueue order with bounded retry. Delivery failure past the retry
//! ceiling drops the event silently: telemetry loss is acceptable,
//! blocking a producer is not.

use crate::client::{DeliveryStatus, EventTransport};
use crate::objects::TelemetryEvent;
use crate::token::TokenManager;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use url::Url;

/// Pending deliveries kept before the oldest is evicted.
pub const QUEUE_CAPACITY: usize = 1000;
/// Re-delivery attempts per event before it is dropped.
pub const MAX_RETRIES: u32 = 3;
/// Backoff unit for 403/5xx/transport failures (`base * retry_count`).
pub const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Pause between drain iterations while the queue stays non-empty.
pub const DRAIN_INTERVAL: Duration = Duration::from_millis(100);

/// Queue tuning knobs, defaulting to the production constants.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub capacity: usize,
    pub max_retries: u32,
    pub base_delay: Duration,
    pub drain_interval: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: QUEUE_CAPACITY,
            max_retries: MAX_RETRIES,
            base_delay: BASE_RETRY_DELAY,
            drain_interval: DRAIN_INTERVAL,
        }
    }
}

/// One pending delivery.
#[derive(Debug, Clone)]
struct QueuedDelivery {
    target: Url,
    event: TelemetryEvent,
    retry_count: u32,
}

/// Handle to the delivery queue. Clones share the same queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    config: QueueConfig,
    pending: Mutex<VecDeque<QueuedDelivery>>,
    busy: AtomicBool,
    transport: Arc<dyn EventTransport>,
    tokens: TokenManager,
}

impl DeliveryQueue {
    pub fn new(transport: Arc<dyn EventTransport>, tokens: TokenManager) -> Self {
        Self::with_config(transport, tokens, QueueConfig::default())
    }

    pub fn with_config(
        transport: Arc<dyn EventTransport>,
        tokens: TokenManager,
        config: QueueConfig,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                config,
                pending: Mutex::new(VecDeque::new()),
                busy: AtomicBool::new(false),
                transport,
                tokens,
            }),
        }
    }

    /// Append an event and nudge the drain worker.
    ///
    /// Never fails and never waits on delivery. At capacity the oldest
    /// pending event is evicted in favor of the new one (recency over
    /// completeness under overload).
    pub async fn enqueue(&self, target: Url, event: TelemetryEvent) {
        self.inner
            .push(QueuedDelivery {
                target,
                event,
                retry_count: 0,
            })
            .await;
        QueueInner::trigger(&self.inner);
    }

    /// Number of deliveries waiting in the queue.
    pub async fn len(&self) -> usize {
        self.inner.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Wait until the queue is empty and the drain worker idle.
    pub async fn flush(&self) {
        loop {
            if self.inner.pending.lock().await.is_empty()
                && !self.inner.busy.load(Ordering::Acquire)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl QueueInner {
    async fn push(&self, item: QueuedDelivery) {
        let mut pending = self.pending.lock().await;
        if pending.len() >= self.config.capacity {
            if let Some(evicted) = pending.pop_front() {
                tracing::warn!(
                    kind = evicted.event.kind(),
                    "delivery queue full, evicting oldest event"
                );
            }
        }
        pending.push_back(item);
    }

    /// Start a drain worker unless one is already running. Re-entrant
    /// triggers are no-ops; the running worker re-checks the queue
    /// before going idle.
    fn trigger(self: &Arc<Self>) {
        if self.busy.swap(true, Ordering::AcqRel) {
            return;
        }
        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.drain().await });
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let next = self.pending.lock().await.pop_front();
            let Some(item) = next else {
                self.busy.store(false, Ordering::Release);
                // An enqueue may have raced the flag clear; re-check.
                if self.pending.lock().await.is_empty()
                    || self.busy.swap(true, Ordering::AcqRel)
                {
                    return;
                }
                continue;
            };

            self.deliver_one(item).await;

            if !self.pending.lock().await.is_empty() {
                tokio::time::sleep(self.config.drain_interval).await;
            }
        }
    }

    async fn deliver_one(&self, item: QueuedDelivery) {
        let token = match self.tokens.ensure_token().await {
            Ok(token) => token,
            Err(error) => {
                tracing::warn!(error = %error, "csrf token unavailable, backing off delivery");
                self.backoff_requeue(item).await;
                return;
            }
        };

        match self
            .transport
            .deliver(&item.target, &item.event, &token)
            .await
        {
            Ok(DeliveryStatus::Accepted) => {
                tracing::debug!(kind = item.event.kind(), "telemetry event delivered");
            }
            Ok(DeliveryStatus::RateLimited { retry_after }) => {
                let wait = Duration::from_secs(retry_after.unwrap_or(1));
                tracing::debug!(wait_secs = wait.as_secs(), "rate limited, honoring server hint");
                tokio::time::sleep(wait).await;
                self.requeue_or_drop(item).await;
            }
            Ok(DeliveryStatus::Forbidden) => {
                self.tokens.invalidate().await;
                self.backoff_requeue(item).await;
            }
            Ok(DeliveryStatus::ServerError) => {
                self.backoff_requeue(item).await;
            }
            Ok(DeliveryStatus::Rejected) => {
                tracing::warn!(
                    kind = item.event.kind(),
                    "event rejected by server, dropping"
                );
            }
            Err(error) => {
                tracing::debug!(error = %error, "transport failure, backing off delivery");
                self.backoff_requeue(item).await;
            }
        }
    }

    /// Requeue at the tail after `base * new_retry_count`, or drop once
    /// the ceiling is reached.
    async fn backoff_requeue(&self, item: QueuedDelivery) {
        if item.retry_count >= self.config.max_retries {
            self.drop_exhausted(&item);
            return;
        }
        let delay = self.config.base_delay * (item.retry_count + 1);
        tokio::time::sleep(delay).await;
        self.requeue(item).await;
    }

    /// Requeue at the tail, or drop once the ceiling is reached.
    async fn requeue_or_drop(&self, item: QueuedDelivery) {
        if item.retry_count >= self.config.max_retries {
            self.drop_exhausted(&item);
            return;
        }
        self.requeue(item).await;
    }

    async fn requeue(&self, mut item: QueuedDelivery) {
        item.retry_count += 1;
        self.push(item).await;
    }

    fn drop_exhausted(&self, item: &QueuedDelivery) {
        tracing::warn!(
            kind = item.event.kind(),
            retries = item.retry_count,
            "retry ceiling reached, dropping event"
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::token::TokenFetcher;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::Notify;
    use tokio::time::Instant;

    struct StaticFetcher {
        calls: AtomicU32,
    }

    impl StaticFetcher {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl TokenFetcher for StaticFetcher {
        async fn fetch(&self) -> Result<Option<String>, ClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(format!("tok-{n}")))
        }
    }

    fn tokens() -> TokenManager {
        TokenManager::new(StaticFetcher::new())
    }

    fn event(marker: u64) -> TelemetryEvent {
        let mut payload = crate::objects::EventPayload::new();
        payload.insert("n".into(), json!(marker));
        TelemetryEvent::Pageview(payload)
    }

    fn marker(event: &TelemetryEvent) -> u64 {
        event.payload()["n"].as_u64().unwrap()
    }

    fn target() -> Url {
        Url::parse("https://telemetry.example.com/api/v1/ingest").unwrap()
    }

    /// Records delivered markers; per-call outcome decided by a closure.
    struct RecordingTransport {
        delivered: Mutex<Vec<u64>>,
        calls: AtomicU32,
        call_times: Mutex<Vec<Instant>>,
        outcome: Box<dyn Fn(u32, u64) -> Result<DeliveryStatus, ()> + Send + Sync>,
    }

    impl RecordingTransport {
        fn accepting() -> Arc<Self> {
            Self::with_outcome(|_, _| Ok(DeliveryStatus::Accepted))
        }

        fn with_outcome(
            outcome: impl Fn(u32, u64) -> Result<DeliveryStatus, ()> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                calls: AtomicU32::new(0),
                call_times: Mutex::new(Vec::new()),
                outcome: Box::new(outcome),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl EventTransport for RecordingTransport {
        async fn deliver(
            &self,
            _target: &Url,
            event: &TelemetryEvent,
            _token: &str,
        ) -> Result<DeliveryStatus, ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.call_times.lock().await.push(Instant::now());
            let m = marker(event);
            match (self.outcome)(call, m) {
                Ok(status) => {
                    if status == DeliveryStatus::Accepted {
                        self.delivered.lock().await.push(m);
                    }
                    Ok(status)
                }
                Err(()) => Err(ClientError::Api {
                    status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                    body: "connection reset".into(),
                }),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_delivered_in_fifo_order() {
        let transport = RecordingTransport::accepting();
        let queue = DeliveryQueue::new(transport.clone(), tokens());

        for n in 0..5 {
            queue.enqueue(target(), event(n)).await;
        }
        queue.flush().await;

        assert_eq!(*transport.delivered.lock().await, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn offline_event_is_dropped_after_the_retry_ceiling() {
        let transport = RecordingTransport::with_outcome(|_, _| Err(()));
        let queue = DeliveryQueue::new(transport.clone(), tokens());

        queue.enqueue(target(), event(1)).await;
        queue.flush().await;

        // Initial attempt plus three retries, then the drop.
        assert_eq!(transport.calls(), 4);
        assert!(queue.is_empty().await);

        // Backoff grows with the retry count: 1s, 2s, 3s between sends.
        let times = transport.call_times.lock().await;
        assert!(times[1] - times[0] >= Duration::from_secs(1));
        assert!(times[2] - times[1] >= Duration::from_secs(2));
        assert!(times[3] - times[2] >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn retried_event_requeues_behind_newer_arrivals() {
        // Marker 0 fails once with a server error, then succeeds.
        let transport = RecordingTransport::with_outcome(|call, m| {
            if m == 0 && call == 0 {
                Ok(DeliveryStatus::ServerError)
            } else {
                Ok(DeliveryStatus::Accepted)
            }
        });
        let queue = DeliveryQueue::new(transport.clone(), tokens());

        queue.enqueue(target(), event(0)).await;
        queue.enqueue(target(), event(1)).await;
        queue.flush().await;

        assert_eq!(*transport.delivered.lock().await, vec![1, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_hint_delays_the_requeue() {
        let transport = RecordingTransport::with_outcome(|call, _| {
            if call == 0 {
                Ok(DeliveryStatus::RateLimited {
                    retry_after: Some(5),
                })
            } else {
                Ok(DeliveryStatus::Accepted)
            }
        });
        let queue = DeliveryQueue::new(transport.clone(), tokens());

        queue.enqueue(target(), event(1)).await;
        queue.flush().await;

        let times = transport.call_times.lock().await;
        assert_eq!(times.len(), 2);
        assert!(times[1] - times[0] >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn forbidden_invalidates_the_shared_token() {
        let fetcher = StaticFetcher::new();
        let tokens = TokenManager::new(fetcher.clone());
        let transport = RecordingTransport::with_outcome(|call, _| {
            if call == 0 {
                Ok(DeliveryStatus::Forbidden)
            } else {
                Ok(DeliveryStatus::Accepted)
            }
        });
        let queue = DeliveryQueue::new(transport.clone(), tokens);

        queue.enqueue(target(), event(1)).await;
        queue.flush().await;

        assert_eq!(transport.calls(), 2);
        // One acquisition up front, one after the 403 invalidated it.
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_event_is_dropped_without_retry() {
        let transport = RecordingTransport::with_outcome(|_, _| Ok(DeliveryStatus::Rejected));
        let queue = DeliveryQueue::new(transport.clone(), tokens());

        queue.enqueue(target(), event(1)).await;
        queue.flush().await;

        assert_eq!(transport.calls(), 1);
        assert!(queue.is_empty().await);
    }

    /// Blocks the first delivery until released, accepting afterwards.
    struct GatedTransport {
        delivered: Mutex<Vec<u64>>,
        release: Notify,
        started: Notify,
        gated: AtomicBool,
    }

    impl GatedTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                delivered: Mutex::new(Vec::new()),
                release: Notify::new(),
                started: Notify::new(),
                gated: AtomicBool::new(true),
            })
        }
    }

    #[async_trait]
    impl EventTransport for GatedTransport {
        async fn deliver(
            &self,
            _target: &Url,
            event: &TelemetryEvent,
            _token: &str,
        ) -> Result<DeliveryStatus, ClientError> {
            if self.gated.swap(false, Ordering::AcqRel) {
                self.started.notify_one();
                self.release.notified().await;
            }
            self.delivered.lock().await.push(marker(event));
            Ok(DeliveryStatus::Accepted)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn overflow_evicts_exactly_the_oldest_pending_event() {
        let transport = GatedTransport::new();
        let queue = DeliveryQueue::with_config(
            transport.clone(),
            tokens(),
            QueueConfig {
                capacity: 3,
                ..QueueConfig::default()
            },
        );

        // The worker pops marker 0 and parks inside the transport.
        queue.enqueue(target(), event(0)).await;
        transport.started.notified().await;

        for n in 1..=4 {
            queue.enqueue(target(), event(n)).await;
        }
        // Capacity 3: enqueueing 4 pending items evicted marker 1.
        assert_eq!(queue.len().await, 3);

        transport.release.notify_one();
        queue.flush().await;

        assert_eq!(*transport.delivered.lock().await, vec![0, 2, 3, 4]);
    }
}
