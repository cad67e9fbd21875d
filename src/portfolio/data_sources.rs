//! Typed explorer queries.
//!
//! One operation per upstream query kind, each decoding the explorer's
//! envelope explicitly and converting base units to decimal amounts.

use crate::portfolio::error::PortfolioError;
use crate::portfolio::fetch_client::{FetchClient, UpstreamQuery};
use crate::portfolio::types::{wei_to_eth, base_units_to_decimal, PortfolioConfig, RawTransaction, TokenTransfer};
use crate::types::{Address, Direction};
use serde::Deserialize;
use tracing::{debug, instrument};

/// Transaction row as returned by `account/txlist`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxListRow {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    time_stamp: String,
    #[serde(default)]
    is_error: String,
}

/// Transfer row as returned by `account/tokentx`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenTxRow {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    time_stamp: String,
    #[serde(default)]
    token_symbol: String,
    #[serde(default)]
    token_decimal: String,
}

/// Price payload from `stats/ethprice`.
#[derive(Debug, Deserialize)]
struct EthPrice {
    ethusd: String,
}

fn parse_timestamp(raw: &str) -> Result<i64, PortfolioError> {
    raw.trim()
        .parse()
        .map_err(|_| PortfolioError::Decode(format!("{raw:?} is not a unix timestamp")))
}

/// Stablecoin contract tracked alongside the native balance.
#[derive(Debug, Clone)]
pub struct StablecoinConfig {
    pub contract: String,
    pub decimals: u32,
}

/// Data source manager for explorer queries.
pub struct ChainDataSources {
    client: FetchClient,
    stablecoin: StablecoinConfig,
    page_size: u32,
}

impl ChainDataSources {
    /// Create a new data sources manager.
    pub fn new(client: FetchClient, stablecoin: StablecoinConfig, page_size: u32) -> Self {
        Self { client, stablecoin, page_size }
    }

    pub fn from_config(client: FetchClient, config: &PortfolioConfig) -> Self {
        Self::new(
            client,
            StablecoinConfig {
                contract: config.stablecoin_address.clone(),
                decimals: config.stablecoin_decimals,
            },
            config.transaction_page_size,
        )
    }

    /// Native balance in ether.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn native_balance(&self, address: &Address) -> Result<f64, PortfolioError> {
        let query = UpstreamQuery::new("account", "balance")
            .param("address", address.as_str())
            .param("tag", "latest");

        let wei: String = self.client.fetch(&query).await?.decode()?;
        let balance = wei_to_eth(&wei)?;
        debug!("Native balance: {} ETH", balance);
        Ok(balance)
    }

    /// Native transactions, newest first.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn transactions(&self, address: &Address) -> Result<Vec<RawTransaction>, PortfolioError> {
        let query = UpstreamQuery::new("account", "txlist")
            .param("address", address.as_str())
            .param("startblock", "0")
            .param("endblock", "latest")
            .param("page", "1")
            .param("offset", self.page_size.to_string())
            .param("sort", "desc");

        let rows: Vec<TxListRow> = self.client.fetch(&query).await?.decode_list()?;
        let transactions = rows
            .into_iter()
            .map(|row| {
                Ok(RawTransaction {
                    direction: Direction::relative_to(address, &row.to),
                    timestamp: parse_timestamp(&row.time_stamp)?,
                    is_error: row.is_error == "1",
                    hash: row.hash,
                    from: row.from,
                    to: row.to,
                    value: row.value,
                })
            })
            .collect::<Result<Vec<_>, PortfolioError>>()?;

        debug!("Fetched {} transactions", transactions.len());
        Ok(transactions)
    }

    /// Current ETH/USD spot price.
    #[instrument(skip(self))]
    pub async fn spot_price(&self) -> Result<f64, PortfolioError> {
        let query = UpstreamQuery::new("stats", "ethprice");
        let price: EthPrice = self.client.fetch(&query).await?.decode()?;
        price
            .ethusd
            .trim()
            .parse()
            .map_err(|_| PortfolioError::Decode(format!("{:?} is not a price", price.ethusd)))
    }

    /// Stablecoin balance in whole tokens.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn stablecoin_balance(&self, address: &Address) -> Result<f64, PortfolioError> {
        let query = UpstreamQuery::new("account", "tokenbalance")
            .param("contractaddress", self.stablecoin.contract.clone())
            .param("address", address.as_str())
            .param("tag", "latest");

        let raw: String = self.client.fetch(&query).await?.decode()?;
        base_units_to_decimal(&raw, self.stablecoin.decimals)
    }

    /// Stablecoin transfers, newest first.
    #[instrument(skip(self), fields(address = %address))]
    pub async fn stablecoin_transfers(&self, address: &Address) -> Result<Vec<TokenTransfer>, PortfolioError> {
        let query = UpstreamQuery::new("account", "tokentx")
            .param("contractaddress", self.stablecoin.contract.clone())
            .param("address", address.as_str())
            .param("page", "1")
            .param("offset", self.page_size.to_string())
            .param("startblock", "0")
            .param("endblock", "latest")
            .param("sort", "desc");

        let rows: Vec<TokenTxRow> = self.client.fetch(&query).await?.decode_list()?;
        rows.into_iter()
            .map(|row| {
                let token_decimals = if row.token_decimal.is_empty() {
                    self.stablecoin.decimals
                } else {
                    row.token_decimal.parse().map_err(|_| {
                        PortfolioError::Decode(format!("{:?} is not a decimals count", row.token_decimal))
                    })?
                };
                Ok(TokenTransfer {
                    direction: Direction::relative_to(address, &row.to),
                    timestamp: parse_timestamp(&row.time_stamp)?,
                    token_decimals,
                    hash: row.hash,
                    from: row.from,
                    to: row.to,
                    value: row.value,
                    token_symbol: row.token_symbol,
                })
            })
            .collect()
    }
}
