use std::num::NonZeroU32;
use std::sync::Arc;

use error_stack::{Report, ResultExt, bail};
use futures::future::BoxFuture;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ProviderError;
use crate::feed::{RawColumn, RawFeed, RawValue};

const YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";
/// Yahoo throttles unauthenticated chart requests aggressively.
const YAHOO_REQUESTS_PER_SECOND: u32 = 2;

const VALID_PERIODS: &[&str] = &[
    "1d", "5d", "1mo", "3mo", "6mo", "1y", "2y", "5y", "10y", "ytd", "max",
];

/// Common alternative spellings mapped to the provider's period format.
const PERIOD_ALIASES: &[(&str, &str)] = &[
    ("1w", "5d"),
    ("1m", "1mo"),
    ("3m", "3mo"),
    ("6m", "6mo"),
    ("1yr", "1y"),
    ("2yr", "2y"),
    ("5yr", "5y"),
    ("10yr", "10y"),
];

/// Map a requested period to a provider-valid one. Unknown periods fall back
/// to `1d` with a warning rather than failing the fetch.
pub fn canonical_period(period: &str) -> &'static str {
    if let Some(&(_, mapped)) = PERIOD_ALIASES.iter().find(|(alias, _)| *alias == period) {
        return mapped;
    }
    if let Some(&valid) = VALID_PERIODS.iter().find(|&&p| p == period) {
        return valid;
    }
    warn!(period, "invalid period, falling back to 1d");
    "1d"
}

/// Abstraction over a market-data source.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait
/// to keep the trait object-safe (`dyn MarketProvider`).
pub trait MarketProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch a raw tabular feed for the symbol. Column naming and shape are
    /// provider-specific; callers normalize before use.
    fn fetch(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> BoxFuture<'_, Result<RawFeed, Report<ProviderError>>>;

    /// Latest traded price for the symbol.
    fn current_price(&self, symbol: &str) -> BoxFuture<'_, Result<f64, Report<ProviderError>>>;
}

/// Yahoo Finance v8 chart API provider.
pub struct YahooProvider {
    client: reqwest::Client,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl YahooProvider {
    pub fn new() -> Self {
        Self::with_base_url(YAHOO_BASE_URL.to_string())
    }

    pub fn with_base_url(base_url: String) -> Self {
        let quota = Quota::per_second(NonZeroU32::new(YAHOO_REQUESTS_PER_SECOND).unwrap());
        Self {
            client: reqwest::Client::new(),
            base_url,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn fetch_chart(
        &self,
        symbol: &str,
        range: &str,
        interval: &str,
    ) -> Result<ChartResult, Report<ProviderError>> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/v8/finance/chart/{symbol}", self.base_url);
        let params = [("range", range), ("interval", interval)];

        let response = self
            .client
            .get(&url)
            .query(&params)
            .send()
            .await
            .change_context(ProviderError::Request {
                provider: "yahoo".into(),
            })?;

        if !response.status().is_success() {
            return Err(Report::new(ProviderError::Request {
                provider: "yahoo".into(),
            })
            .attach(format!("HTTP status: {}", response.status())));
        }

        let envelope: ChartEnvelope =
            response
                .json()
                .await
                .change_context(ProviderError::ResponseParse {
                    provider: "yahoo".into(),
                })?;

        let Some(result) = envelope.chart.result.into_iter().flatten().next() else {
            bail!(ProviderError::NoData {
                provider: "yahoo".into(),
            });
        };

        Ok(result)
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    fn fetch(
        &self,
        symbol: &str,
        period: &str,
        interval: &str,
    ) -> BoxFuture<'_, Result<RawFeed, Report<ProviderError>>> {
        let symbol = symbol.to_owned();
        let range = canonical_period(period).to_owned();
        let interval = interval.to_owned();
        Box::pin(async move {
            let chart = self.fetch_chart(&symbol, &range, &interval).await?;
            let rows = chart.timestamp.len();
            let feed = chart_to_feed(chart);

            info!(symbol = %symbol, range = %range, interval = %interval, rows, "market data fetched");
            Ok(feed)
        })
    }

    fn current_price(&self, symbol: &str) -> BoxFuture<'_, Result<f64, Report<ProviderError>>> {
        let symbol = symbol.to_owned();
        Box::pin(async move {
            let chart = self.fetch_chart(&symbol, "1d", "1m").await?;

            if let Some(price) = chart.meta.as_ref().and_then(|m| m.regular_market_price) {
                return Ok(price);
            }

            let last_close = chart
                .indicators
                .quote
                .first()
                .and_then(|q| q.close.iter().rev().flatten().next())
                .copied();

            last_close.ok_or_else(|| {
                Report::new(ProviderError::NoData {
                    provider: "yahoo".into(),
                })
            })
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    meta: Option<ChartMeta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartMeta {
    #[serde(rename = "regularMarketPrice")]
    regular_market_price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    quote: Vec<ChartQuote>,
    #[serde(default)]
    adjclose: Option<Vec<ChartAdjClose>>,
}

#[derive(Debug, Deserialize, Default)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct ChartAdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

/// Convert a chart result into a raw feed with the provider's capitalized
/// column names; the normalizer owns canonicalization.
fn chart_to_feed(chart: ChartResult) -> RawFeed {
    let timestamps: Vec<RawValue> = chart
        .timestamp
        .iter()
        .map(|&secs| match chrono::DateTime::from_timestamp(secs, 0) {
            Some(ts) => RawValue::Timestamp(ts),
            None => RawValue::Missing,
        })
        .collect();

    let quote = chart.indicators.quote.into_iter().next().unwrap_or_default();
    let cells = |values: Vec<Option<f64>>| -> Vec<RawValue> {
        values
            .into_iter()
            .map(|v| v.map_or(RawValue::Missing, RawValue::Number))
            .collect()
    };

    let mut columns = vec![
        RawColumn::single("Date", timestamps),
        RawColumn::single("Open", cells(quote.open)),
        RawColumn::single("High", cells(quote.high)),
        RawColumn::single("Low", cells(quote.low)),
        RawColumn::single("Close", cells(quote.close)),
        RawColumn::single("Volume", cells(quote.volume)),
    ];

    if let Some(adjclose) = chart
        .indicators
        .adjclose
        .and_then(|a| a.into_iter().next())
    {
        columns.push(RawColumn::single("Adj Close", cells(adjclose.adjclose)));
    }

    RawFeed {
        columns,
        index: None,
    }
}
