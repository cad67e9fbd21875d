//! Monotonic request tickets for discarding superseded results.
//!
//! A caller that refreshes a view repeatedly (e.g. on every period change)
//! takes a ticket before each build and drops the result if a newer ticket
//! was issued while the build was in flight.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue a new ticket, superseding every earlier one.
    pub fn next(&self) -> u64 {
        self.latest.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == ticket
    }

    /// Run `fut` under a fresh ticket; `None` if a newer run started meanwhile.
    pub async fn run<F, T>(&self, fut: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let ticket = self.next();
        let output = fut.await;
        if self.is_current(ticket) {
            Some(output)
        } else {
            debug!("Discarding result of superseded request {}", ticket);
            None
        }
    }
}
