//! Command-line entry point: `wallet-pnl <address> [period]`
//!
//! Prints the wallet snapshot and the profit/loss series as JSON.

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::{info, Level};
use wallet_pnl::{Period, PortfolioConfig, PortfolioTracker};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(address) = args.next() else {
        bail!("usage: wallet-pnl <address> [1H|6H|1D|1W|1M|All]");
    };
    let period = match args.next() {
        Some(raw) => raw.parse::<Period>().context("Invalid period")?,
        None => Period::default(),
    };

    let config = PortfolioConfig::from_env()?;
    let tracker = PortfolioTracker::new(config)?;

    info!("Fetching portfolio for {} over {}", address, period);

    let wallet = tracker.get_wallet_data(&address).await;
    let profit_loss = tracker.get_profit_loss(&address, period).await;

    let report = json!({
        "wallet": wallet,
        "profitLoss": profit_loss,
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to render report")?
    );

    let stats = tracker.gate_stats();
    info!("Dispatched {} upstream calls, {}ms spent pacing", stats.dispatched, stats.total_wait_ms);

    Ok(())
}
