//! Core types and data structures for the portfolio system.

use crate::portfolio::error::PortfolioError;
use crate::types::{Address, Direction};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decimals of the native token (wei per ether = 10^18).
pub const NATIVE_DECIMALS: u32 = 18;

/// Look-back window for a profit/loss series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1H")]
    OneHour,
    #[serde(rename = "6H")]
    SixHours,
    #[serde(rename = "1D")]
    #[default]
    OneDay,
    #[serde(rename = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    OneMonth,
    #[serde(rename = "All")]
    All,
}

impl Period {
    /// Token used on the wire and in cache keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::OneHour => "1H",
            Period::SixHours => "6H",
            Period::OneDay => "1D",
            Period::OneWeek => "1W",
            Period::OneMonth => "1M",
            Period::All => "All",
        }
    }

    /// Look-back duration, `None` for the unbounded window.
    pub fn lookback(&self) -> Option<chrono::Duration> {
        match self {
            Period::OneHour => Some(chrono::Duration::hours(1)),
            Period::SixHours => Some(chrono::Duration::hours(6)),
            Period::OneDay => Some(chrono::Duration::days(1)),
            Period::OneWeek => Some(chrono::Duration::days(7)),
            Period::OneMonth => Some(chrono::Duration::days(30)),
            Period::All => None,
        }
    }

    pub fn all() -> [Period; 6] {
        [
            Period::OneHour,
            Period::SixHours,
            Period::OneDay,
            Period::OneWeek,
            Period::OneMonth,
            Period::All,
        ]
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Period {
    type Err = PortfolioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Period::all()
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PortfolioError::InvalidInput(format!("unknown period {s:?}")))
    }
}

/// One native-token ledger entry as reported by the explorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTransaction {
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Integer wei as a decimal string
    pub value: String,
    /// Unix seconds
    pub timestamp: i64,
    pub is_error: bool,
    pub direction: Direction,
}

impl RawTransaction {
    /// Transferred amount in ether.
    pub fn value_eth(&self) -> Result<f64, PortfolioError> {
        wei_to_eth(&self.value)
    }

    /// Amount with the direction's sign applied.
    pub fn signed_value_eth(&self) -> Result<f64, PortfolioError> {
        Ok(self.direction.signed(self.value_eth()?))
    }

    /// Timestamp in unix milliseconds; fails if it does not fit.
    pub fn timestamp_ms(&self) -> Result<i64, PortfolioError> {
        self.timestamp
            .checked_mul(1000)
            .ok_or_else(|| PortfolioError::Decode(format!("timestamp {} is out of range", self.timestamp)))
    }
}

/// One stablecoin transfer as reported by the explorer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenTransfer {
    pub hash: String,
    pub from: String,
    pub to: String,
    /// Token base units as a decimal string
    pub value: String,
    pub timestamp: i64,
    pub token_symbol: String,
    pub token_decimals: u32,
    pub direction: Direction,
}

impl TokenTransfer {
    pub fn amount(&self) -> Result<f64, PortfolioError> {
        base_units_to_decimal(&self.value, self.token_decimals)
    }
}

/// Point-in-time view of an address's holdings and recent change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSnapshot {
    pub address: String,
    /// Native balance with 4 decimals
    pub balance: String,
    pub balance_usd: f64,
    /// Native holdings only
    pub portfolio_value: f64,
    /// Native plus stablecoin holdings
    pub portfolio_value_with_stablecoin: f64,
    pub change_24h: f64,
    pub change_percent_24h: f64,
    pub joined_date: String,
}

impl WalletSnapshot {
    /// Zero-valued snapshot carrying only an address and a label.
    pub fn empty(address: impl Into<String>, joined_date: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            balance: "0".to_string(),
            balance_usd: 0.0,
            portfolio_value: 0.0,
            portfolio_value_with_stablecoin: 0.0,
            change_24h: 0.0,
            change_percent_24h: 0.0,
            joined_date: joined_date.into(),
        }
    }
}

/// A single chart point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    /// Unix milliseconds
    pub timestamp: i64,
    pub date: String,
    pub value: f64,
    pub profit: f64,
}

/// Profit/loss over a look-back window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitLossSeries {
    pub current_value: f64,
    pub total_profit: f64,
    pub percent_change: f64,
    pub period: Period,
    pub chart_data: Vec<PricePoint>,
}

impl ProfitLossSeries {
    /// Zeroed series with no points.
    pub fn empty(period: Period) -> Self {
        Self {
            current_value: 0.0,
            total_profit: 0.0,
            percent_change: 0.0,
            period,
            chart_data: Vec::new(),
        }
    }
}

/// A built view as stored in the snapshot cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedView {
    Wallet(WalletSnapshot),
    ProfitLoss(ProfitLossSeries),
}

/// Outcome of a withdrawal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TransactionResult {
    pub fn submitted(hash: impl Into<String>) -> Self {
        Self { success: true, hash: Some(hash.into()), error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { success: false, hash: None, error: Some(error.into()) }
    }
}

/// Balance held by the signing wallet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustodyBalance {
    pub balance_eth: String,
    pub balance_usd: f64,
}

/// Portfolio configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioConfig {
    /// Explorer endpoint
    pub api_url: String,
    /// Explorer API key
    pub api_key: String,
    /// Chain id passed on every query
    pub chain_id: u64,
    /// Minimum spacing between upstream calls in milliseconds
    pub min_request_interval_ms: u64,
    /// Attempts before a rate-limited call fails
    pub max_retry_attempts: usize,
    /// Linear backoff base in milliseconds
    pub retry_base_delay_ms: u64,
    /// Per-attempt HTTP timeout in seconds
    pub request_timeout_seconds: u64,
    /// Cache TTL in seconds
    pub cache_ttl_seconds: u64,
    /// Maximum cache entries
    pub max_cache_entries: u64,
    /// Transactions requested per list call
    pub transaction_page_size: u32,
    /// Stablecoin contract address
    pub stablecoin_address: String,
    pub stablecoin_decimals: u32,
    /// Transaction points kept for the "All" chart
    pub max_chart_points: usize,
}

impl PortfolioConfig {
    /// Build a configuration from the process environment.
    ///
    /// `ETHERSCAN_API_KEY` is required; `ETHERSCAN_API_URL` and `CHAIN_ID`
    /// override the defaults when present.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.api_key = std::env::var("ETHERSCAN_API_KEY")
            .context("ETHERSCAN_API_KEY is not defined")?;
        if let Ok(url) = std::env::var("ETHERSCAN_API_URL") {
            config.api_url = url;
        }
        if let Ok(chain_id) = std::env::var("CHAIN_ID") {
            config.chain_id = chain_id
                .parse()
                .with_context(|| format!("CHAIN_ID {chain_id:?} is not a number"))?;
        }
        Ok(config)
    }
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.etherscan.io/v2/api".to_string(),
            api_key: String::new(),
            chain_id: 1,
            min_request_interval_ms: 400,
            max_retry_attempts: 5,
            retry_base_delay_ms: 1500,
            request_timeout_seconds: 10,
            cache_ttl_seconds: 60,
            max_cache_entries: 500,
            transaction_page_size: 1000,
            stablecoin_address: "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48".to_string(),
            stablecoin_decimals: 6,
            max_chart_points: 200,
        }
    }
}

/// Convert an integer wei string to ether.
pub fn wei_to_eth(wei: &str) -> Result<f64, PortfolioError> {
    base_units_to_decimal(wei, NATIVE_DECIMALS)
}

/// Convert an integer base-unit string to a decimal amount.
pub fn base_units_to_decimal(raw: &str, decimals: u32) -> Result<f64, PortfolioError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(0.0);
    }
    if !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PortfolioError::Decode(format!("{raw:?} is not a base-unit amount")));
    }
    let units: f64 = trimmed
        .parse()
        .map_err(|_| PortfolioError::Decode(format!("{raw:?} is not a base-unit amount")))?;
    let amount = units / 10f64.powi(decimals as i32);
    if !amount.is_finite() {
        return Err(PortfolioError::Decode(format!("{raw:?} is out of range")));
    }
    Ok(amount)
}

/// Round to cents.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
