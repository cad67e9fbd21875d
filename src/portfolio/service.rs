//! Portfolio tracker - the public face of the portfolio layer.
//!
//! Wires one shared request gate, one fetch client, one snapshot cache and
//! the builders together, so every query made through a tracker shares the
//! same pacing and the same cached views.

use crate::portfolio::cache::SnapshotCache;
use crate::portfolio::data_sources::ChainDataSources;
use crate::portfolio::error::PortfolioError;
use crate::portfolio::fetch_client::{FetchClient, HttpTransport, Transport};
use crate::portfolio::profit_loss::ProfitLossBuilder;
use crate::portfolio::rate_limit::{GateStats, RequestGate};
use crate::portfolio::snapshot::WalletSnapshotBuilder;
use crate::portfolio::submitter::{TransactionSigner, WithdrawalSubmitter};
use crate::portfolio::types::{
    CachedView, CustodyBalance, Period, PortfolioConfig, ProfitLossSeries, TokenTransfer,
    TransactionResult, WalletSnapshot,
};
use crate::types::Address;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

pub struct PortfolioTracker {
    pub config: PortfolioConfig,
    cache: Arc<SnapshotCache<CachedView>>,
    sources: Arc<ChainDataSources>,
    gate: Arc<RequestGate>,
    snapshots: WalletSnapshotBuilder,
    profit_loss: ProfitLossBuilder,
    signer: Option<Arc<dyn TransactionSigner>>,
    submitter: Option<WithdrawalSubmitter>,
}

impl PortfolioTracker {
    /// Create a tracker talking to the configured explorer over HTTP.
    pub fn new(config: PortfolioConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config).context("Failed to create explorer transport")?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Create a tracker over any transport.
    pub fn with_transport(config: PortfolioConfig, transport: Arc<dyn Transport>) -> Self {
        let gate = Arc::new(RequestGate::new(Duration::from_millis(config.min_request_interval_ms)));
        let client = FetchClient::from_config(transport, gate.clone(), &config);
        let sources = Arc::new(ChainDataSources::from_config(client, &config));
        let cache = Arc::new(SnapshotCache::new(
            config.max_cache_entries,
            Duration::from_secs(config.cache_ttl_seconds),
        ));

        let snapshots = WalletSnapshotBuilder::new(sources.clone(), cache.clone());
        let profit_loss = ProfitLossBuilder::new(sources.clone(), cache.clone(), config.max_chart_points);

        info!(
            "Created portfolio tracker for chain {} ({}ms spacing, {}s cache)",
            config.chain_id, config.min_request_interval_ms, config.cache_ttl_seconds
        );

        Self {
            config,
            cache,
            sources,
            gate,
            snapshots,
            profit_loss,
            signer: None,
            submitter: None,
        }
    }

    /// Attach the wallet used for withdrawals and custody balance.
    pub fn with_signer(mut self, signer: Arc<dyn TransactionSigner>) -> Self {
        self.submitter = Some(WithdrawalSubmitter::new(signer.clone(), self.cache.clone()));
        self.signer = Some(signer);
        self
    }

    pub async fn get_wallet_data(&self, address: &str) -> WalletSnapshot {
        self.snapshots.build_snapshot(address).await
    }

    pub async fn get_profit_loss(&self, address: &str, period: Period) -> ProfitLossSeries {
        self.profit_loss.build_series(address, period).await
    }

    /// Drop every cached view for `address` so the next query refetches.
    #[instrument(skip(self))]
    pub async fn refresh_data(&self, address: &str) {
        match Address::parse(address) {
            Ok(owner) => {
                self.cache.invalidate(&owner, None).await;
                info!("Refreshed cached views for {}", owner.short());
            }
            Err(e) => warn!("Ignoring refresh: {}", e),
        }
    }

    pub async fn withdraw(&self, amount_eth: f64, to: &str) -> TransactionResult {
        match &self.submitter {
            Some(submitter) => submitter.withdraw(amount_eth, to).await,
            None => TransactionResult::failed(PortfolioError::SignerUnavailable.to_string()),
        }
    }

    /// Balance of the signing wallet and its fiat value; zeros on any failure.
    #[instrument(skip(self))]
    pub async fn custody_balance(&self) -> CustodyBalance {
        match self.try_custody_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                error!("Error fetching custody balance: {}", e);
                CustodyBalance { balance_eth: "0".to_string(), balance_usd: 0.0 }
            }
        }
    }

    async fn try_custody_balance(&self) -> Result<CustodyBalance, PortfolioError> {
        let signer = self.signer.as_ref().ok_or(PortfolioError::SignerUnavailable)?;
        let balance_eth = signer.balance().await?;
        let amount: f64 = balance_eth
            .trim()
            .parse()
            .map_err(|_| PortfolioError::Decode(format!("{balance_eth:?} is not a balance")))?;
        let spot_price = self.sources.spot_price().await?;

        Ok(CustodyBalance { balance_eth, balance_usd: amount * spot_price })
    }

    /// Stablecoin transfers for `address`, newest first; empty on any failure.
    #[instrument(skip(self))]
    pub async fn stablecoin_transfers(&self, address: &str) -> Vec<TokenTransfer> {
        let Ok(owner) = Address::parse(address) else {
            return Vec::new();
        };
        match self.sources.stablecoin_transfers(&owner).await {
            Ok(transfers) => transfers,
            Err(e) => {
                error!("Error fetching stablecoin transfers for {}: {}", owner, e);
                Vec::new()
            }
        }
    }

    pub fn gate_stats(&self) -> GateStats {
        self.gate.get_stats()
    }

    pub fn cache(&self) -> &Arc<SnapshotCache<CachedView>> {
        &self.cache
    }
}
