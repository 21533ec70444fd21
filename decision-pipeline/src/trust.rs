//! Trust stage - synthetic trend cross-check and profitability scoring
//!
//! Synthesizes a short historical price/volume/market-cap series biased
//! toward the claimed sentiment, classifies the price trend, and computes a
//! momentum-weighted profitability heuristic. A signal is trusted only when
//! the price trend strictly agrees with the claimed sentiment; a mixed or
//! opposite trend fails.

use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use crate::audit::AuditLog;
use common::{AlphaSignal, MarketSeries, Sentiment, Trend, TrustResult};

/// Source of historical market data for a token.
///
/// The production implementation is synthetic (no real market feed, by
/// scope); tests inject fixed series.
pub trait MarketDataSource: Send + Sync {
    fn historical_series(&self, claimed: Sentiment) -> MarketSeries;
}

/// Settings for synthetic series generation.
#[derive(Debug, Clone)]
pub struct SyntheticDataConfig {
    /// Points per series.
    pub points: usize,
    /// Probability the series rises when the claim is positive (falls when
    /// negative). Deliberately noisy, not deterministic.
    pub directional_bias: f64,
}

impl Default for SyntheticDataConfig {
    fn default() -> Self {
        Self {
            points: 10,
            directional_bias: 0.9,
        }
    }
}

/// Synthetic market data generator.
pub struct SyntheticMarketData {
    config: SyntheticDataConfig,
}

impl SyntheticMarketData {
    pub fn new(config: SyntheticDataConfig) -> Self {
        Self { config }
    }
}

impl Default for SyntheticMarketData {
    fn default() -> Self {
        Self::new(SyntheticDataConfig::default())
    }
}

impl MarketDataSource for SyntheticMarketData {
    fn historical_series(&self, claimed: Sentiment) -> MarketSeries {
        let rising_chance = match claimed {
            Sentiment::Positive => self.config.directional_bias,
            Sentiment::Negative => 1.0 - self.config.directional_bias,
        };
        let rising = fastrand::f64() < rising_chance;
        synthesize_series(rising, self.config.points)
    }
}

fn uniform(low: f64, high: f64) -> f64 {
    low + fastrand::f64() * (high - low)
}

/// Build a series point by point: price drifts by ±[0.5, 2.0] per step,
/// volume by ±[1e3, 5e3], floored at 1.0 / 1e3; market cap is price×volume.
fn synthesize_series(rising: bool, points: usize) -> MarketSeries {
    let mut series = MarketSeries::default();
    if points == 0 {
        return series;
    }

    let start_price = uniform(1.0, 100.0);
    let start_volume = uniform(1e3, 1e6);
    series.prices.push(start_price);
    series.total_volumes.push(start_volume);
    series.market_caps.push(start_price * start_volume);

    for _ in 1..points {
        let (price_change, volume_change) = if rising {
            (uniform(0.5, 2.0), uniform(1e3, 5e3))
        } else {
            (uniform(-2.0, -0.5), uniform(-5e3, -1e3))
        };

        let last_price = *series.prices.last().unwrap_or(&start_price);
        let last_volume = *series.total_volumes.last().unwrap_or(&start_volume);
        let price = (last_price + price_change).max(1.0);
        let volume = (last_volume + volume_change).max(1e3);

        series.prices.push(price);
        series.total_volumes.push(volume);
        series.market_caps.push(price * volume);
    }

    series
}

/// Trend classification per series field.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct SeriesTrends {
    pub prices: Trend,
    pub market_caps: Trend,
    pub total_volumes: Trend,
}

/// Classify one series: monotone non-increasing is negative, monotone
/// non-decreasing is positive, anything else is mixed. A constant series
/// counts as non-increasing.
pub fn detect_trend(values: &[f64]) -> Trend {
    if values.windows(2).all(|w| w[0] >= w[1]) {
        Trend::Negative
    } else if values.windows(2).all(|w| w[0] <= w[1]) {
        Trend::Positive
    } else {
        Trend::Mixed
    }
}

pub fn classify_series(series: &MarketSeries) -> SeriesTrends {
    SeriesTrends {
        prices: detect_trend(&series.prices),
        market_caps: detect_trend(&series.market_caps),
        total_volumes: detect_trend(&series.total_volumes),
    }
}

/// Momentum-weighted profitability heuristic: percent price change, sign
/// following price direction, dampened by how far average market cap and
/// volume sit below their peaks (penalizes single-spike series).
pub fn pnl_potential(series: &MarketSeries) -> f64 {
    let (Some(first), Some(last)) = (series.prices.first(), series.prices.last()) else {
        return 0.0;
    };
    if series.market_caps.is_empty() || series.total_volumes.is_empty() {
        return 0.0;
    }

    let price_change = (last - first) / first * 100.0;

    let avg_market_cap =
        series.market_caps.iter().sum::<f64>() / series.market_caps.len() as f64;
    let max_market_cap = series.market_caps.iter().copied().fold(f64::MIN, f64::max);
    let avg_volume =
        series.total_volumes.iter().sum::<f64>() / series.total_volumes.len() as f64;
    let max_volume = series.total_volumes.iter().copied().fold(f64::MIN, f64::max);

    price_change * (avg_market_cap / max_market_cap) * (avg_volume / max_volume)
}

pub struct TrustStage {
    source: Arc<dyn MarketDataSource>,
    audit: AuditLog,
}

impl TrustStage {
    pub fn new(source: Arc<dyn MarketDataSource>, audit: AuditLog) -> Self {
        Self { source, audit }
    }

    /// Cross-check the claimed sentiment against the historical price trend
    /// and score profitability.
    ///
    /// Only the price-series trend participates in the trust decision; the
    /// other series are classified and audited but not gated on.
    pub async fn trust(
        &self,
        sentiment: Sentiment,
        signal: &AlphaSignal,
        user_id: &str,
    ) -> Result<(TrustResult, Trend)> {
        let series = self.source.historical_series(signal.sentiment);
        self.audit
            .record("Get Historical Data", signal, &series, user_id)
            .await;

        let trends = classify_series(&series);
        self.audit.record("Detect Trends", signal, &trends, user_id).await;

        let matches = matches!(
            (sentiment, trends.prices),
            (Sentiment::Positive, Trend::Positive) | (Sentiment::Negative, Trend::Negative)
        );
        if !matches {
            self.audit
                .record(
                    "Sentiment and Trends do not match",
                    &serde_json::json!({
                        "token": signal.token,
                        "sentiment": sentiment,
                        "trends": trends,
                    }),
                    "Sentiment and Trends do not match",
                    user_id,
                )
                .await;
            return Ok((
                TrustResult {
                    sentiment_confirmed: false,
                    pnl_potential: 0.0,
                },
                trends.prices,
            ));
        }

        let pnl = pnl_potential(&series);
        self.audit
            .record(
                "Get PNL Potential",
                &serde_json::json!({ "token": signal.token, "historical_data": series }),
                &pnl,
                user_id,
            )
            .await;

        debug!(token = %signal.token, pnl, "trust stage passed");
        Ok((
            TrustResult {
                sentiment_confirmed: true,
                pnl_potential: pnl,
            },
            trends.prices,
        ))
    }
}

/// Fixed-series source for deterministic tests.
pub struct FixedMarketData {
    series: MarketSeries,
}

impl FixedMarketData {
    pub fn new(series: MarketSeries) -> Self {
        Self { series }
    }
}

impl MarketDataSource for FixedMarketData {
    fn historical_series(&self, _claimed: Sentiment) -> MarketSeries {
        self.series.clone()
    }
}
