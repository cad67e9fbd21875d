//! Profit/loss series builder.
//!
//! Replays the transactions inside a look-back window against the current
//! balance to recover the balance at the start of the window, then emits one
//! chart point per transaction between a start point and a "now" point. All
//! values use the current spot price; there is no historical pricing.

use crate::portfolio::cache::{CacheKind, SnapshotCache};
use crate::portfolio::data_sources::ChainDataSources;
use crate::portfolio::error::PortfolioError;
use crate::portfolio::types::{round2, CachedView, Period, PricePoint, ProfitLossSeries, RawTransaction};
use crate::types::Address;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

const START_LABEL_FORMAT: &str = "%b %d, %Y";
const POINT_LABEL_FORMAT: &str = "%b %d, %H:%M";

/// Builds [`ProfitLossSeries`] through the data sources and the shared cache.
pub struct ProfitLossBuilder {
    sources: Arc<ChainDataSources>,
    cache: Arc<SnapshotCache<CachedView>>,
    max_chart_points: usize,
}

impl ProfitLossBuilder {
    pub fn new(
        sources: Arc<ChainDataSources>,
        cache: Arc<SnapshotCache<CachedView>>,
        max_chart_points: usize,
    ) -> Self {
        Self { sources, cache, max_chart_points }
    }

    /// Build the series for `address` over `period`. Never fails: invalid
    /// addresses and upstream failures produce an empty, zeroed series.
    #[instrument(skip(self), fields(period = %period))]
    pub async fn build_series(&self, address: &str, period: Period) -> ProfitLossSeries {
        let owner = match Address::parse(address) {
            Ok(owner) => owner,
            Err(e) => {
                debug!("Skipping profit/loss: {}", e);
                return ProfitLossSeries::empty(period);
            }
        };

        if let Some(CachedView::ProfitLoss(series)) = self
            .cache
            .get(&owner, CacheKind::ProfitLoss, Some(period.as_str()))
            .await
        {
            return series;
        }

        match self.try_build(&owner, period).await {
            Ok(series) => {
                self.cache
                    .set(
                        &owner,
                        CacheKind::ProfitLoss,
                        Some(period.as_str()),
                        CachedView::ProfitLoss(series.clone()),
                    )
                    .await;
                info!(
                    "Built {} profit/loss for {} with {} points",
                    period,
                    owner.short(),
                    series.chart_data.len()
                );
                series
            }
            Err(e) => {
                error!("Error fetching profit/loss for {}: {}", owner, e);
                ProfitLossSeries::empty(period)
            }
        }
    }

    /// Fetch and compute without touching the cache.
    pub async fn try_build(&self, owner: &Address, period: Period) -> Result<ProfitLossSeries, PortfolioError> {
        let balance_eth = self.sources.native_balance(owner).await?;
        let spot_price = self.sources.spot_price().await?;
        let transactions = self.sources.transactions(owner).await?;

        compute_series(
            balance_eth,
            spot_price,
            transactions,
            period,
            Utc::now(),
            self.max_chart_points,
        )
    }
}

/// Derive the series at instant `now` from the current balance, the spot
/// price and the explorer's transaction list (any order).
pub fn compute_series(
    current_balance: f64,
    spot_price: f64,
    transactions: Vec<RawTransaction>,
    period: Period,
    now: DateTime<Utc>,
    max_chart_points: usize,
) -> Result<ProfitLossSeries, PortfolioError> {
    let now_ms = now.timestamp_millis();
    let window_start_ms = period
        .lookback()
        .map(|lookback| (now - lookback).timestamp_millis())
        .unwrap_or(0);

    let stamped = transactions
        .into_iter()
        .map(|tx| Ok((tx.timestamp_ms()?, tx)))
        .collect::<Result<Vec<(i64, RawTransaction)>, PortfolioError>>()?;

    let mut relevant: Vec<(i64, RawTransaction)> = match period {
        Period::All => stamped,
        _ => stamped
            .into_iter()
            .filter(|(timestamp, _)| *timestamp >= window_start_ms)
            .collect(),
    };
    relevant.sort_by_key(|(timestamp, _)| *timestamp);

    let deltas = relevant
        .iter()
        .map(|(_, tx)| tx.signed_value_eth())
        .collect::<Result<Vec<f64>, PortfolioError>>()?;
    let net_change: f64 = deltas.iter().sum();

    let current_value = current_balance * spot_price;
    let start_balance = current_balance - net_change;
    let start_value = start_balance * spot_price;
    let total_profit = net_change * spot_price;
    let percent_change = if start_value > 0.0 {
        total_profit / start_value * 100.0
    } else {
        0.0
    };

    let start_ms = match (period, relevant.first()) {
        (Period::All, Some((earliest, _))) => *earliest,
        _ => window_start_ms,
    };

    let mut running_balance = start_balance;
    let transaction_points: Vec<PricePoint> = relevant
        .iter()
        .zip(deltas)
        .map(|((timestamp, _), delta)| {
            running_balance += delta;
            let timestamp = *timestamp;
            PricePoint {
                timestamp,
                date: format_label(timestamp, POINT_LABEL_FORMAT),
                value: round2(running_balance * spot_price),
                profit: round2((running_balance - start_balance) * spot_price),
            }
        })
        .collect();

    let transaction_points = if period == Period::All {
        downsample(transaction_points, max_chart_points)
    } else {
        transaction_points
    };

    let mut chart_data = Vec::with_capacity(transaction_points.len() + 2);
    chart_data.push(PricePoint {
        timestamp: start_ms,
        date: format_label(start_ms, START_LABEL_FORMAT),
        value: round2(start_value),
        profit: 0.0,
    });
    chart_data.extend(transaction_points);

    // A transaction stamped after our clock reading must not sort after "now".
    let end_ms = chart_data
        .last()
        .map_or(now_ms, |last| last.timestamp.max(now_ms));
    chart_data.push(PricePoint {
        timestamp: end_ms,
        date: format_label(end_ms, POINT_LABEL_FORMAT),
        value: round2(current_value),
        profit: round2(total_profit),
    });

    Ok(ProfitLossSeries {
        current_value: round2(current_value),
        total_profit: round2(total_profit),
        percent_change: round2(percent_change),
        period,
        chart_data,
    })
}

/// Keep every `stride`-th item plus the last, with at most `ceiling` kept.
///
/// The stride starts at `len / ceiling` and widens until the kept set fits.
/// The first and last items always survive.
pub fn downsample<T>(items: Vec<T>, ceiling: usize) -> Vec<T> {
    let ceiling = ceiling.max(2);
    let len = items.len();
    if len <= ceiling {
        return items;
    }

    let mut stride = (len / ceiling).max(1);
    while kept_count(len, stride) > ceiling {
        stride += 1;
    }

    items
        .into_iter()
        .enumerate()
        .filter(|(i, _)| i % stride == 0 || *i == len - 1)
        .map(|(_, item)| item)
        .collect()
}

fn kept_count(len: usize, stride: usize) -> usize {
    let on_stride = len.div_ceil(stride);
    if (len - 1) % stride == 0 {
        on_stride
    } else {
        on_stride + 1
    }
}

fn format_label(timestamp_ms: i64, format: &str) -> String {
    DateTime::<Utc>::from_timestamp(timestamp_ms.div_euclid(1000), 0)
        .map(|at| at.format(format).to_string())
        .unwrap_or_default()
}
