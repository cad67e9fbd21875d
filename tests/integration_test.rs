//! End-to-end tests for the portfolio tracker over a scripted explorer.

mod common;

use chrono::Utc;
use common::{tx_row, MockSigner, ScriptedTransport, COUNTERPARTY, OWNER};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wallet_pnl::portfolio::{Envelope, PortfolioError, TransactionResult};
use wallet_pnl::{Period, PortfolioBuilder, PortfolioTracker};

const HOUR: i64 = 3_600;

fn tracker(transport: &Arc<ScriptedTransport>) -> PortfolioTracker {
    PortfolioBuilder::new()
        .with_api_key("test-key")
        .build_with_transport(transport.clone())
}

/// 2.5 ETH at $3000 with one 0.5 ETH deposit three hours ago.
fn deposit_fixture() -> Arc<ScriptedTransport> {
    let three_hours_ago = Utc::now().timestamp() - 3 * HOUR;
    Arc::new(ScriptedTransport::wallet(
        "2500000000000000000",
        "3000",
        json!([tx_row(COUNTERPARTY, OWNER, "500000000000000000", three_hours_ago)]),
    ))
}

#[tokio::test(start_paused = true)]
async fn test_invalid_address_makes_no_calls() {
    let transport = deposit_fixture();
    let tracker = tracker(&transport);

    let wallet = tracker.get_wallet_data("not-an-address").await;
    assert_eq!(wallet.balance, "0");
    assert_eq!(wallet.balance_usd, 0.0);
    assert_eq!(wallet.joined_date, "Not connected");

    let series = tracker.get_profit_loss("0x1234", Period::OneDay).await;
    assert!(series.chart_data.is_empty());
    assert_eq!(series.total_profit, 0.0);

    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_and_series_values() {
    let transport = deposit_fixture();
    let tracker = tracker(&transport);

    let wallet = tracker.get_wallet_data(OWNER).await;
    assert_eq!(wallet.address, OWNER);
    assert_eq!(wallet.balance, "2.5000");
    assert_eq!(wallet.balance_usd, 7500.0);
    assert_eq!(wallet.portfolio_value_with_stablecoin, 7500.0);
    assert_eq!(wallet.change_24h, 1500.0);
    assert_eq!(wallet.change_percent_24h, 25.0);

    let series = tracker.get_profit_loss(OWNER, Period::OneDay).await;
    assert_eq!(series.current_value, 7500.0);
    assert_eq!(series.total_profit, 1500.0);
    assert_eq!(series.percent_change, 25.0);
    assert_eq!(series.chart_data.len(), 3);
    assert_eq!(series.chart_data[0].value, 6000.0);
    assert_eq!(series.chart_data[0].profit, 0.0);
    assert_eq!(series.chart_data[2].value, 7500.0);
    assert_eq!(series.chart_data[2].profit, 1500.0);

    // The deposit is older than one hour.
    let hourly = tracker.get_profit_loss(OWNER, Period::OneHour).await;
    assert_eq!(hourly.total_profit, 0.0);
    assert_eq!(hourly.chart_data.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cache_hit_and_refresh() {
    let transport = deposit_fixture();
    let tracker = tracker(&transport);

    let first = tracker.get_wallet_data(OWNER).await;
    let second = tracker.get_wallet_data(OWNER).await;
    assert_eq!(first, second);
    assert_eq!(transport.calls_to("balance"), 1);

    // Different periods are cached separately.
    tracker.get_profit_loss(OWNER, Period::OneDay).await;
    tracker.get_profit_loss(OWNER, Period::OneDay).await;
    tracker.get_profit_loss(OWNER, Period::OneWeek).await;
    assert_eq!(transport.calls_to("txlist"), 3);

    tracker.refresh_data(OWNER).await;
    tracker.get_wallet_data(OWNER).await;
    tracker.get_profit_loss(OWNER, Period::OneDay).await;
    assert_eq!(transport.calls_to("balance"), 5);
}

#[tokio::test(start_paused = true)]
async fn test_cache_expires_after_ttl() {
    let transport = deposit_fixture();
    let tracker = tracker(&transport);

    tracker.get_wallet_data(OWNER).await;
    tokio::time::advance(Duration::from_secs(61)).await;
    tracker.get_wallet_data(OWNER).await;

    assert_eq!(transport.calls_to("balance"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_stablecoin_is_added_and_its_failure_tolerated() {
    let with_usdc = Arc::new(
        ScriptedTransport::wallet("1000000000000000000", "2000", json!([]))
            .reply("tokenbalance", Envelope::ok(json!("120500000"))),
    );
    let wallet = tracker(&with_usdc).get_wallet_data(OWNER).await;
    assert_eq!(wallet.portfolio_value, 2000.0);
    assert_eq!(wallet.portfolio_value_with_stablecoin, 2120.5);

    let broken_usdc = Arc::new(
        ScriptedTransport::wallet("1000000000000000000", "2000", json!([]))
            .fail("tokenbalance", PortfolioError::Transport("connection reset".to_string())),
    );
    let wallet = tracker(&broken_usdc).get_wallet_data(OWNER).await;
    assert_eq!(wallet.balance, "1.0000");
    assert_eq!(wallet.portfolio_value_with_stablecoin, 2000.0);
}

#[tokio::test(start_paused = true)]
async fn test_upstream_error_yields_zero_snapshot() {
    let transport = Arc::new(
        ScriptedTransport::wallet("1000000000000000000", "2000", json!([]))
            .reply("ethprice", Envelope::error("NOTOK", json!("Invalid API Key"))),
    );
    let tracker = tracker(&transport);

    let wallet = tracker.get_wallet_data(OWNER).await;
    assert_eq!(wallet.address, OWNER);
    assert_eq!(wallet.balance, "0");
    assert_eq!(wallet.portfolio_value, 0.0);
    assert!(wallet.joined_date.starts_with("Joined "));

    let series = tracker.get_profit_loss(OWNER, Period::OneWeek).await;
    assert!(series.chart_data.is_empty());
    assert_eq!(series.period, Period::OneWeek);

    // Failures are not cached.
    tracker.get_wallet_data(OWNER).await;
    assert_eq!(transport.calls_to("balance"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_all_period_without_history() {
    let transport = Arc::new(
        ScriptedTransport::wallet("0", "3000", json!([]))
            .reply("txlist", Envelope::error("No transactions found", json!([]))),
    );
    let series = tracker(&transport).get_profit_loss(OWNER, Period::All).await;

    assert_eq!(series.chart_data.len(), 2);
    assert_eq!(series.chart_data[0].timestamp, 0);
    assert_eq!(series.chart_data[0].date, "Jan 01, 1970");
    assert_eq!(series.total_profit, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_is_retried_transparently() {
    let transport = Arc::new(
        ScriptedTransport::wallet("1000000000000000000", "2000", json!([]))
            .reply("ethprice", Envelope::error("NOTOK", json!("Max calls per sec rate limit reached (3/sec)"))),
    );
    let tracker = tracker(&transport);

    let wallet = tracker.get_wallet_data(OWNER).await;

    // Still rate limited after five attempts, so the build fails.
    assert_eq!(wallet.balance, "0");
    assert_eq!(transport.calls_to("ethprice"), 5);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_builds_share_the_gate() {
    let transport = deposit_fixture();
    let tracker = Arc::new(tracker(&transport));

    let mut handles = Vec::new();
    for period in [Period::OneHour, Period::OneDay, Period::OneWeek] {
        let tracker = tracker.clone();
        handles.push(tokio::spawn(async move { tracker.get_profit_loss(OWNER, period).await }));
    }
    let wallet = tracker.get_wallet_data(OWNER).await;
    for handle in handles {
        assert_eq!(handle.await.unwrap().current_value, 7500.0);
    }
    assert_eq!(wallet.balance_usd, 7500.0);

    let mut times = transport.dispatch_times();
    times.sort();
    assert_eq!(times.len(), 13);
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(400));
    }
    assert_eq!(tracker.gate_stats().dispatched, 13);
}

#[tokio::test(start_paused = true)]
async fn test_withdraw_invalidates_sender_views() {
    let transport = deposit_fixture();
    let signer = MockSigner::new("2.5", Ok(TransactionResult::submitted("0xabc")));
    let tracker = tracker(&transport).with_signer(signer.clone());

    tracker.get_wallet_data(OWNER).await;
    let result = tracker.withdraw(1.0, COUNTERPARTY).await;
    assert!(result.success);
    assert_eq!(result.hash.as_deref(), Some("0xabc"));
    assert_eq!(signer.send_count(), 1);

    tracker.get_wallet_data(OWNER).await;
    assert_eq!(transport.calls_to("balance"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_withdraw_failures() {
    let transport = deposit_fixture();

    let unsigned = tracker(&transport);
    let result = unsigned.withdraw(1.0, COUNTERPARTY).await;
    assert_eq!(result.error.as_deref(), Some("No transaction signer configured"));

    let signer = MockSigner::new("0.25", Ok(TransactionResult::submitted("0xabc")));
    let tracker = tracker(&transport).with_signer(signer.clone());

    let result = tracker.withdraw(1.0, COUNTERPARTY).await;
    assert_eq!(result.error.as_deref(), Some("Insufficient balance. Available: 0.25 ETH"));

    let result = tracker.withdraw(0.0, COUNTERPARTY).await;
    assert_eq!(result.error.as_deref(), Some("Amount must be greater than 0"));

    let result = tracker.withdraw(0.1, "0xdeadbeef").await;
    assert_eq!(result.error.as_deref(), Some("Invalid destination address"));

    assert_eq!(signer.send_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_custody_balance() {
    let transport = deposit_fixture();

    let signer = MockSigner::new("1.5", Ok(TransactionResult::submitted("0xabc")));
    let custody = tracker(&transport).with_signer(signer).custody_balance().await;
    assert_eq!(custody.balance_eth, "1.5");
    assert_eq!(custody.balance_usd, 4500.0);

    let custody = tracker(&transport).custody_balance().await;
    assert_eq!(custody.balance_eth, "0");
    assert_eq!(custody.balance_usd, 0.0);
}

#[tokio::test(start_paused = true)]
async fn test_stablecoin_transfers() {
    let now = Utc::now().timestamp();
    let mut incoming = tx_row(COUNTERPARTY, OWNER, "250000000", now - HOUR);
    incoming["tokenSymbol"] = json!("USDC");
    incoming["tokenDecimal"] = json!("6");
    let mut outgoing = tx_row(OWNER, COUNTERPARTY, "1000000", now - 2 * HOUR);
    outgoing["tokenSymbol"] = json!("USDC");
    outgoing["tokenDecimal"] = json!("6");

    let transport = Arc::new(ScriptedTransport::new().reply("tokentx", Envelope::ok(json!([incoming, outgoing]))));
    let tracker = tracker(&transport);

    let transfers = tracker.stablecoin_transfers(OWNER).await;
    assert_eq!(transfers.len(), 2);
    assert_eq!(transfers[0].token_symbol, "USDC");
    assert_eq!(transfers[0].amount().unwrap(), 250.0);
    assert_eq!(transfers[0].direction, wallet_pnl::Direction::In);
    assert_eq!(transfers[1].direction, wallet_pnl::Direction::Out);

    assert!(tracker.stablecoin_transfers("bogus").await.is_empty());
}
