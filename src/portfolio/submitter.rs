//! Outbound withdrawals through a signing collaborator.

use crate::portfolio::cache::SnapshotCache;
use crate::portfolio::error::PortfolioError;
use crate::portfolio::types::{CachedView, TransactionResult};
use crate::types::Address;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Formal contract for the wallet that signs and broadcasts transfers.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Send `amount_eth` to `to` and wait for the receipt.
    async fn send_transaction(&self, to: &Address, amount_eth: f64) -> Result<TransactionResult, PortfolioError>;

    /// Address of the signing wallet.
    async fn address(&self) -> Result<Address, PortfolioError>;

    /// Live balance of the signing wallet in ether, as a decimal string.
    async fn balance(&self) -> Result<String, PortfolioError>;
}

/// Validates withdrawals, checks funds and forwards them to the signer.
pub struct WithdrawalSubmitter {
    signer: Arc<dyn TransactionSigner>,
    cache: Arc<SnapshotCache<CachedView>>,
}

impl WithdrawalSubmitter {
    pub fn new(signer: Arc<dyn TransactionSigner>, cache: Arc<SnapshotCache<CachedView>>) -> Self {
        Self { signer, cache }
    }

    /// Submit a withdrawal. Never fails; every problem becomes a failed result.
    #[instrument(skip(self))]
    pub async fn withdraw(&self, amount_eth: f64, to: &str) -> TransactionResult {
        match self.try_withdraw(amount_eth, to).await {
            Ok(result) => result,
            Err(e) => {
                error!("Withdraw error: {}", e);
                TransactionResult::failed(e.to_string())
            }
        }
    }

    pub async fn try_withdraw(&self, amount_eth: f64, to: &str) -> Result<TransactionResult, PortfolioError> {
        let destination = Address::parse(to)
            .map_err(|_| PortfolioError::InvalidInput("Invalid destination address".to_string()))?;

        if !amount_eth.is_finite() || amount_eth <= 0.0 {
            return Err(PortfolioError::InvalidInput("Amount must be greater than 0".to_string()));
        }

        // Always a live read; the cached snapshot may predate other withdrawals.
        let available = self.signer.balance().await?;
        let available_eth: f64 = available
            .trim()
            .parse()
            .map_err(|_| PortfolioError::Decode(format!("{available:?} is not a balance")))?;
        if available_eth < amount_eth {
            return Err(PortfolioError::InsufficientFunds { available });
        }

        let result = self.signer.send_transaction(&destination, amount_eth).await?;

        if result.success {
            match self.signer.address().await {
                Ok(sender) => {
                    self.cache.invalidate(&sender, None).await;
                    info!("Withdrew {} ETH to {}, invalidated cache for {}", amount_eth, destination.short(), sender.short());
                }
                Err(e) => warn!("Could not resolve signer address to invalidate cache: {}", e),
            }
        } else {
            warn!("Signer rejected withdrawal: {:?}", result.error);
        }

        Ok(result)
    }
}
