//! wallet-pnl - Ethereum wallet valuation and profit/loss tracking
//!
//! This crate aggregates balances, prices and transaction history from a
//! block-explorer API into wallet snapshots and profit/loss chart series.

pub mod types;
pub mod portfolio;

// Re-export main types for convenience
pub use types::{Address, Direction};
pub use portfolio::{Period, PortfolioBuilder, PortfolioConfig, PortfolioTracker};
