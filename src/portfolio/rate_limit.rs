//! Process-wide request pacing for the block-explorer API.
//!
//! The explorer enforces one requests-per-second ceiling shared by every
//! query kind, so all outbound calls go through a single [`RequestGate`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, instrument};

/// Token-bucket-of-one: at most one dispatch per `min_interval`.
///
/// The last dispatch instant is read, waited on and written while holding
/// the lock, so concurrent callers queue in FIFO order and never dispatch
/// closer together than the interval. Uses tokio's clock, which tests can
/// pause and advance.
#[derive(Debug)]
pub struct RequestGate {
    min_interval: Duration,
    last_dispatch: Mutex<Option<Instant>>,
    dispatched: AtomicU64,
    total_wait_ms: AtomicU64,
}

impl RequestGate {
    /// Create a new gate.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_dispatch: Mutex::new(None),
            dispatched: AtomicU64::new(0),
            total_wait_ms: AtomicU64::new(0),
        }
    }

    /// Wait until a request may be dispatched and claim the slot.
    ///
    /// Returns the dispatch instant that was recorded.
    #[instrument(skip(self))]
    pub async fn acquire(&self) -> Instant {
        let mut last = self.last_dispatch.lock().await;

        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            let now = Instant::now();
            if now < ready_at {
                let wait = ready_at - now;
                debug!("Pacing upstream call, waiting {:?}", wait);
                self.total_wait_ms
                    .fetch_add(wait.as_millis() as u64, Ordering::Relaxed);
                sleep_until(ready_at).await;
            }
        }

        let dispatched_at = Instant::now();
        *last = Some(dispatched_at);
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        dispatched_at
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Get current pacing statistics.
    pub fn get_stats(&self) -> GateStats {
        GateStats {
            min_interval: self.min_interval,
            dispatched: self.dispatched.load(Ordering::Relaxed),
            total_wait_ms: self.total_wait_ms.load(Ordering::Relaxed),
        }
    }
}

/// Pacing statistics.
#[derive(Debug, Clone)]
pub struct GateStats {
    pub min_interval: Duration,
    pub dispatched: u64,
    pub total_wait_ms: u64,
}

/// Linearly increasing retry delays: `base * 1`, `base * 2`, ...
///
/// Plugs into `tokio_retry` as a strategy; bound it with `take`.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    base: Duration,
    attempt: u32,
}

impl LinearBackoff {
    pub fn new(base: Duration) -> Self {
        Self { base, attempt: 0 }
    }
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        Some(self.base.saturating_mul(self.attempt))
    }
}
