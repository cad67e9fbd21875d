//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use wallet_pnl::portfolio::{Envelope, PortfolioError, TransactionResult, TransactionSigner, Transport, UpstreamQuery};
use wallet_pnl::Address;

pub const OWNER: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";
pub const COUNTERPARTY: &str = "0xfb6916095ca1df60bb79ce92ce3ea74c37c5d359";

/// Answers each explorer action with a fixed reply and records every call.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<&'static str, Result<Envelope, PortfolioError>>>,
    calls: Mutex<Vec<(&'static str, Instant)>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, action: &'static str, envelope: Envelope) -> Self {
        self.replies.lock().unwrap().insert(action, Ok(envelope));
        self
    }

    pub fn fail(self, action: &'static str, error: PortfolioError) -> Self {
        self.replies.lock().unwrap().insert(action, Err(error));
        self
    }

    /// Explorer fixture for a wallet holding `balance_wei` at `price` USD.
    pub fn wallet(balance_wei: &str, price: &str, transactions: Value) -> Self {
        Self::new()
            .reply("balance", Envelope::ok(json!(balance_wei)))
            .reply("ethprice", Envelope::ok(json!({ "ethusd": price, "ethbtc": "0.05" })))
            .reply("txlist", Envelope::ok(transactions))
            .reply("tokenbalance", Envelope::ok(json!("0")))
    }

    pub fn calls_to(&self, action: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(a, _)| *a == action).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn dispatch_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(_, at)| *at).collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, query: &UpstreamQuery) -> Result<Envelope, PortfolioError> {
        self.calls.lock().unwrap().push((query.action, Instant::now()));
        self.replies
            .lock()
            .unwrap()
            .get(query.action)
            .cloned()
            .unwrap_or_else(|| Ok(Envelope::error("NOTOK", json!("unscripted action"))))
    }
}

/// One `txlist` row.
pub fn tx_row(from: &str, to: &str, value_wei: &str, timestamp: i64) -> Value {
    json!({
        "blockNumber": "19000000",
        "timeStamp": timestamp.to_string(),
        "hash": format!("0x{:064x}", timestamp),
        "from": from,
        "to": to,
        "value": value_wei,
        "isError": "0",
    })
}

/// Signer with a fixed balance and a fixed send outcome.
pub struct MockSigner {
    pub balance: String,
    pub outcome: Result<TransactionResult, PortfolioError>,
    pub sends: AtomicUsize,
}

impl MockSigner {
    pub fn new(balance: &str, outcome: Result<TransactionResult, PortfolioError>) -> Arc<Self> {
        Arc::new(Self {
            balance: balance.to_string(),
            outcome,
            sends: AtomicUsize::new(0),
        })
    }

    pub fn send_count(&self) -> usize {
        self.sends.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransactionSigner for MockSigner {
    async fn send_transaction(&self, _to: &Address, _amount_eth: f64) -> Result<TransactionResult, PortfolioError> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }

    async fn address(&self) -> Result<Address, PortfolioError> {
        Address::parse(OWNER)
    }

    async fn balance(&self) -> Result<String, PortfolioError> {
        Ok(self.balance.clone())
    }
}
