//! Per-client rate limiting.
//!
//! Fixed-window buckets keyed by client identifier (IP), kept in process
//! memory. Buckets are created on first request and swept once expired.
//! Under a multi-instance deployment this degrades to per-instance
//! limits; a global limit would need an external shared counter.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Points granted per window.
pub const DEFAULT_POINTS: u32 = 10;
/// Window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(1);

/// Bucket-map size that triggers a sweep of expired buckets.
const EVICT_SCAN_LEN: usize = 4096;

/// Limiter tuning: how many points per rolling window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub points: u32,
    pub window: Duration,
}

impl Default for RatePolicy {
    fn default() -> Self {
        Self {
            points: DEFAULT_POINTS,
            window: DEFAULT_WINDOW,
        }
    }
}

/// Outcome of consuming one point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    Allowed,
    /// Out of points; retry once the window rolls over.
    Limited { retry_after: Duration },
}

#[derive(Debug)]
struct RateBucket {
    remaining: u32,
    window_start: Instant,
}

/// In-memory fixed-window limiter, one bucket per client identifier.
#[derive(Debug)]
pub struct RateLimiter {
    policy: RatePolicy,
    buckets: Mutex<HashMap<String, RateBucket>>,
}

impl RateLimiter {
    pub fn new(policy: RatePolicy) -> Self {
        Self {
            policy,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Consume one point from `client`'s bucket.
    pub async fn check(&self, client: &str) -> RateDecision {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().await;

        if buckets.len() >= EVICT_SCAN_LEN {
            let window = self.policy.window;
            let before = buckets.len();
            buckets.retain(|_, bucket| now.duration_since(bucket.window_start) < window);
            tracing::debug!(swept = before - buckets.len(), "evicted expired rate buckets");
        }

        let bucket = buckets.entry(client.to_owned()).or_insert(RateBucket {
            remaining: self.policy.points,
            window_start: now,
        });

        if now.duration_since(bucket.window_start) >= self.policy.window {
            bucket.remaining = self.policy.points;
            bucket.window_start = now;
        }

        if bucket.remaining > 0 {
            bucket.remaining -= 1;
            RateDecision::Allowed
        } else {
            let elapsed = now.duration_since(bucket.window_start);
            RateDecision::Limited {
                retry_after: self.policy.window.saturating_sub(elapsed),
            }
        }
    }
}
