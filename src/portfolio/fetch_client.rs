//! Rate-limited access to the block-explorer API.
//!
//! Every logical request passes through the shared [`RequestGate`] and is
//! retried with linear backoff while the explorer reports rate limiting.
//! Application errors other than rate limiting are handed back to the caller
//! inside the [`Envelope`] for interpretation.

use crate::portfolio::error::PortfolioError;
use crate::portfolio::rate_limit::{LinearBackoff, RequestGate};
use crate::portfolio::types::PortfolioConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_retry::RetryIf;
use tracing::{debug, error, instrument, warn};

/// Substrings the explorer uses to signal throttling.
const RATE_LIMIT_MARKERS: &[&str] = &["rate limit", "max calls per sec"];

/// Explorer message for an address with no history.
const NO_TRANSACTIONS_MESSAGE: &str = "No transactions found";

/// One upstream query: module, action and extra parameters.
///
/// Chain id and API key are added by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamQuery {
    pub module: &'static str,
    pub action: &'static str,
    pub params: Vec<(&'static str, String)>,
}

impl UpstreamQuery {
    pub fn new(module: &'static str, action: &'static str) -> Self {
        Self { module, action, params: Vec::new() }
    }

    pub fn param(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.params.push((key, value.into()));
        self
    }

    /// Value of a parameter, if set.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// The explorer's `{status, message, result}` reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub status: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub result: serde_json::Value,
}

impl Envelope {
    /// Successful reply wrapping `result`.
    pub fn ok(result: serde_json::Value) -> Self {
        Self { status: "1".to_string(), message: "OK".to_string(), result }
    }

    /// Application error reply.
    pub fn error(message: impl Into<String>, result: serde_json::Value) -> Self {
        Self { status: "0".to_string(), message: message.into(), result }
    }

    pub fn is_success(&self) -> bool {
        self.status == "1"
    }

    /// True when the explorer reports throttling in `message` or a string `result`.
    pub fn is_rate_limited(&self) -> bool {
        if self.status != "0" {
            return false;
        }
        let message = self.message.to_ascii_lowercase();
        let result = self
            .result
            .as_str()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        RATE_LIMIT_MARKERS
            .iter()
            .any(|marker| message.contains(marker) || result.contains(marker))
    }

    /// True for the explorer's "no history" reply to list queries.
    pub fn is_empty_listing(&self) -> bool {
        self.status == "0" && self.message.eq_ignore_ascii_case(NO_TRANSACTIONS_MESSAGE)
    }

    /// Decode a successful `result`, or surface the application error.
    pub fn decode<T: DeserializeOwned>(self) -> Result<T, PortfolioError> {
        if !self.is_success() {
            return Err(self.into_upstream_error());
        }
        Ok(serde_json::from_value(self.result)?)
    }

    /// Decode a list `result`, treating "No transactions found" as empty.
    pub fn decode_list<T: DeserializeOwned>(self) -> Result<Vec<T>, PortfolioError> {
        if self.is_empty_listing() {
            return Ok(Vec::new());
        }
        if self.is_success() && self.result.is_null() {
            return Ok(Vec::new());
        }
        self.decode()
    }

    fn into_upstream_error(self) -> PortfolioError {
        let detail = self.result.as_str().unwrap_or_default();
        let message = if detail.is_empty() || detail == self.message {
            self.message
        } else {
            format!("{} ({})", self.message, detail)
        };
        PortfolioError::Upstream { message }
    }
}

/// Formal contract for reaching the explorer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue one request and parse the envelope; no pacing or retry.
    async fn send(&self, query: &UpstreamQuery) -> Result<Envelope, PortfolioError>;
}

/// reqwest-backed explorer transport.
pub struct HttpTransport {
    http_client: Client,
    api_url: String,
    api_key: String,
    chain_id: u64,
}

impl HttpTransport {
    /// Create a transport from configuration.
    pub fn new(config: &PortfolioConfig) -> Result<Self, PortfolioError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;

        Ok(Self {
            http_client,
            api_url: config.api_url.clone(),
            api_key: config.api_key.clone(),
            chain_id: config.chain_id,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, query), fields(module = query.module, action = query.action))]
    async fn send(&self, query: &UpstreamQuery) -> Result<Envelope, PortfolioError> {
        let mut params: Vec<(&str, String)> = Vec::with_capacity(query.params.len() + 4);
        params.push(("chainid", self.chain_id.to_string()));
        params.push(("module", query.module.to_string()));
        params.push(("action", query.action.to_string()));
        params.extend(query.params.iter().map(|(k, v)| (*k, v.clone())));
        params.push(("apikey", self.api_key.clone()));

        let response = self
            .http_client
            .get(&self.api_url)
            .query(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PortfolioError::Transport(format!(
                "explorer returned HTTP {}",
                response.status()
            )));
        }

        let envelope: Envelope = response.json().await?;
        debug!("Explorer replied status={} message={}", envelope.status, envelope.message);
        Ok(envelope)
    }
}

/// Paced, retrying client over a [`Transport`].
#[derive(Clone)]
pub struct FetchClient {
    transport: Arc<dyn Transport>,
    gate: Arc<RequestGate>,
    max_attempts: usize,
    retry_base_delay: Duration,
}

impl FetchClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        gate: Arc<RequestGate>,
        max_attempts: usize,
        retry_base_delay: Duration,
    ) -> Self {
        Self {
            transport,
            gate,
            max_attempts: max_attempts.max(1),
            retry_base_delay,
        }
    }

    /// Create a client from configuration sharing an existing gate.
    pub fn from_config(
        transport: Arc<dyn Transport>,
        gate: Arc<RequestGate>,
        config: &PortfolioConfig,
    ) -> Self {
        Self::new(
            transport,
            gate,
            config.max_retry_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    /// Issue one logical request.
    ///
    /// Returns the envelope, including application errors, unless the
    /// explorer is still rate limiting after the last attempt.
    #[instrument(skip(self, query), fields(module = query.module, action = query.action))]
    pub async fn fetch(&self, query: &UpstreamQuery) -> Result<Envelope, PortfolioError> {
        let attempt = AtomicUsize::new(0);
        let strategy = LinearBackoff::new(self.retry_base_delay).take(self.max_attempts - 1);

        RetryIf::spawn(
            strategy,
            || self.attempt(query, &attempt),
            |err: &PortfolioError| err.is_rate_limited(),
        )
        .await
        .map_err(|err| {
            if err.is_rate_limited() {
                error!("Max retries reached for {}/{}", query.module, query.action);
            }
            err
        })
    }

    async fn attempt(
        &self,
        query: &UpstreamQuery,
        attempt: &AtomicUsize,
    ) -> Result<Envelope, PortfolioError> {
        let current = attempt.fetch_add(1, Ordering::SeqCst) + 1;
        self.gate.acquire().await;

        let envelope = self.transport.send(query).await?;

        if envelope.is_rate_limited() {
            warn!(
                "Rate limited on {}/{}, attempt {}/{}",
                query.module, query.action, current, self.max_attempts
            );
            return Err(PortfolioError::RateLimited {
                attempts: current,
                message: envelope.message,
            });
        }

        if !envelope.is_success() && !envelope.is_empty_listing() {
            warn!(
                "Explorer error on {}/{}: {}",
                query.module, query.action, envelope.message
            );
        }

        Ok(envelope)
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }
}
