//! Wallet snapshot builder: current balance, fiat value and 24h change.

use crate::portfolio::cache::{CacheKind, SnapshotCache};
use crate::portfolio::data_sources::ChainDataSources;
use crate::portfolio::error::PortfolioError;
use crate::portfolio::types::{CachedView, RawTransaction, WalletSnapshot};
use crate::types::Address;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Label for snapshots of addresses that failed validation.
pub const NOT_CONNECTED_LABEL: &str = "Not connected";

const DAY_SECONDS: i64 = 24 * 60 * 60;

/// Upstream values a snapshot is derived from.
#[derive(Debug, Clone)]
pub struct SnapshotInputs {
    pub balance_eth: f64,
    pub spot_price: f64,
    pub stablecoin_balance: f64,
    /// Newest first, as returned by the explorer
    pub transactions: Vec<RawTransaction>,
}

/// Builds [`WalletSnapshot`]s through the data sources and the shared cache.
pub struct WalletSnapshotBuilder {
    sources: Arc<ChainDataSources>,
    cache: Arc<SnapshotCache<CachedView>>,
}

impl WalletSnapshotBuilder {
    pub fn new(sources: Arc<ChainDataSources>, cache: Arc<SnapshotCache<CachedView>>) -> Self {
        Self { sources, cache }
    }

    /// Build the snapshot for `address`. Never fails: invalid addresses and
    /// upstream failures produce a zero-valued snapshot.
    #[instrument(skip(self))]
    pub async fn build_snapshot(&self, address: &str) -> WalletSnapshot {
        let owner = match Address::parse(address) {
            Ok(owner) => owner,
            Err(e) => {
                debug!("Skipping snapshot: {}", e);
                return WalletSnapshot::empty(address.trim(), NOT_CONNECTED_LABEL);
            }
        };

        if let Some(CachedView::Wallet(snapshot)) =
            self.cache.get(&owner, CacheKind::WalletData, None).await
        {
            return snapshot;
        }

        match self.try_build(&owner).await {
            Ok(snapshot) => {
                self.cache
                    .set(&owner, CacheKind::WalletData, None, CachedView::Wallet(snapshot.clone()))
                    .await;
                info!("Built wallet snapshot for {}", owner.short());
                snapshot
            }
            Err(e) => {
                error!("Error fetching wallet data for {}: {}", owner, e);
                WalletSnapshot::empty(owner.to_string(), joined_label(&[], Utc::now()))
            }
        }
    }

    /// Fetch and compute without touching the cache.
    pub async fn try_build(&self, owner: &Address) -> Result<WalletSnapshot, PortfolioError> {
        let balance_eth = self.sources.native_balance(owner).await?;
        let spot_price = self.sources.spot_price().await?;
        let transactions = self.sources.transactions(owner).await?;
        let stablecoin_balance = match self.sources.stablecoin_balance(owner).await {
            Ok(balance) => balance,
            Err(e) => {
                warn!("Stablecoin balance unavailable, assuming zero: {}", e);
                0.0
            }
        };

        let inputs = SnapshotInputs {
            balance_eth,
            spot_price,
            stablecoin_balance,
            transactions,
        };
        compute_snapshot(owner, &inputs, Utc::now())
    }
}

/// Derive a snapshot from upstream values at instant `now`.
pub fn compute_snapshot(
    owner: &Address,
    inputs: &SnapshotInputs,
    now: DateTime<Utc>,
) -> Result<WalletSnapshot, PortfolioError> {
    let balance_usd = inputs.balance_eth * inputs.spot_price;
    // Stablecoin is valued 1:1 with USD
    let portfolio_value_with_stablecoin = balance_usd + inputs.stablecoin_balance;

    let change_eth = change_24h(&inputs.transactions, now)?;

    Ok(WalletSnapshot {
        address: owner.to_string(),
        balance: format!("{:.4}", inputs.balance_eth),
        balance_usd,
        portfolio_value: balance_usd,
        portfolio_value_with_stablecoin,
        change_24h: change_eth * inputs.spot_price,
        change_percent_24h: change_percent(inputs.balance_eth, change_eth),
        joined_date: joined_label(&inputs.transactions, now),
    })
}

/// Net native change over the trailing 24 hours (strictly after `now - 24h`).
pub fn change_24h(transactions: &[RawTransaction], now: DateTime<Utc>) -> Result<f64, PortfolioError> {
    let cutoff = now.timestamp() - DAY_SECONDS;
    transactions
        .iter()
        .filter(|tx| tx.timestamp > cutoff)
        .map(RawTransaction::signed_value_eth)
        .sum()
}

/// Percent change relative to the balance before the change.
///
/// An empty or negative prior balance yields 100 for growth and 0 otherwise.
pub fn change_percent(current_balance: f64, change: f64) -> f64 {
    let previous_balance = current_balance - change;
    if previous_balance > 0.0 {
        change / previous_balance * 100.0
    } else if change > 0.0 {
        100.0
    } else {
        0.0
    }
}

/// "Joined MMM YYYY" from the oldest transaction, or from `now` when there is none.
pub fn joined_label(transactions: &[RawTransaction], now: DateTime<Utc>) -> String {
    let joined = transactions
        .last()
        .and_then(|oldest| DateTime::<Utc>::from_timestamp(oldest.timestamp, 0))
        .unwrap_or(now);
    format!("Joined {}", joined.format("%b %Y"))
}
