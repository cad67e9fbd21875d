//! Portfolio module - wallet valuation and profit/loss over a block explorer.
//!
//! All upstream traffic goes through one paced, retrying fetch client; built
//! views are shared through a TTL cache keyed by address, view and period.

pub mod types;
pub mod error;
pub mod rate_limit;
pub mod fetch_client;
pub mod data_sources;
pub mod cache;
pub mod snapshot;
pub mod profit_loss;
pub mod submitter;
pub mod sequence;
pub mod service;

// Re-export main public types and the tracker
pub use service::PortfolioTracker;
pub use error::PortfolioError;
pub use types::{
    CachedView, CustodyBalance, Period, PortfolioConfig, PricePoint, ProfitLossSeries,
    RawTransaction, TokenTransfer, TransactionResult, WalletSnapshot,
};

// Re-export other key components for advanced usage
pub use cache::{CacheKind, SnapshotCache};
pub use data_sources::ChainDataSources;
pub use fetch_client::{Envelope, FetchClient, HttpTransport, Transport, UpstreamQuery};
pub use profit_loss::ProfitLossBuilder;
pub use rate_limit::RequestGate;
pub use sequence::RequestSequencer;
pub use snapshot::WalletSnapshotBuilder;
pub use submitter::{TransactionSigner, WithdrawalSubmitter};

use std::sync::Arc;

/// Tracker builder for convenient construction with sensible defaults.
pub struct PortfolioBuilder {
    config: PortfolioConfig,
}

impl PortfolioBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: PortfolioConfig::default(),
        }
    }

    /// Set the explorer endpoint.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_url = url.into();
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.config.chain_id = chain_id;
        self
    }

    /// Set minimum spacing between upstream calls.
    pub fn with_min_request_interval(mut self, interval_ms: u64) -> Self {
        self.config.min_request_interval_ms = interval_ms;
        self
    }

    /// Set rate-limit retry policy.
    pub fn with_retry(mut self, max_attempts: usize, base_delay_ms: u64) -> Self {
        self.config.max_retry_attempts = max_attempts;
        self.config.retry_base_delay_ms = base_delay_ms;
        self
    }

    pub fn with_request_timeout(mut self, timeout_seconds: u64) -> Self {
        self.config.request_timeout_seconds = timeout_seconds;
        self
    }

    /// Set cache TTL in seconds.
    pub fn with_cache_ttl(mut self, ttl_seconds: u64) -> Self {
        self.config.cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Set max cache entries.
    pub fn with_max_cache_entries(mut self, max_entries: u64) -> Self {
        self.config.max_cache_entries = max_entries;
        self
    }

    /// Set the tracked stablecoin contract and its decimals.
    pub fn with_stablecoin(mut self, contract: impl Into<String>, decimals: u32) -> Self {
        self.config.stablecoin_address = contract.into();
        self.config.stablecoin_decimals = decimals;
        self
    }

    pub fn with_max_chart_points(mut self, points: usize) -> Self {
        self.config.max_chart_points = points;
        self
    }

    /// Build the tracker configuration.
    pub fn build_config(self) -> PortfolioConfig {
        self.config
    }

    /// Build a tracker using the HTTP transport.
    pub fn build(self) -> anyhow::Result<PortfolioTracker> {
        PortfolioTracker::new(self.config)
    }

    /// Build a tracker over a caller-supplied transport.
    pub fn build_with_transport(self, transport: Arc<dyn Transport>) -> PortfolioTracker {
        PortfolioTracker::with_transport(self.config, transport)
    }
}

impl Default for PortfolioBuilder {
    fn default() -> Self {
        Self::new()
    }
}
