use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One row of the canonical price series.
///
/// `price_change` and `percent_change` are derived from the previous close and
/// are absent at the first row.
#[derive(Debug, Clone, PartialEq)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub price_change: Option<f64>,
    pub percent_change: Option<f64>,
}

/// Indicator columns aligned 1:1 with the price series by position.
///
/// A `None` entry means the indicator window has not warmed up at that row.
#[derive(Debug, Clone, Default)]
pub struct IndicatorSeries {
    pub rsi: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub macd_histogram: Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
    pub bb_middle: Vec<Option<f64>>,
    pub bb_lower: Vec<Option<f64>>,
}

/// De-duplicated support and resistance price levels, at most 5 per side.
///
/// No ordering is guaranteed by construction; sorting is left to presentation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LevelSet {
    pub support: Vec<f64>,
    pub resistance: Vec<f64>,
}

/// Unit of record handed downstream: the canonical series with its indicator
/// columns, detected levels, and the most recent close.
#[derive(Debug, Clone)]
pub struct IndicatorBundle {
    pub series: Vec<PricePoint>,
    pub indicators: IndicatorSeries,
    pub levels: LevelSet,
    pub last_price: Option<f64>,
}

impl IndicatorBundle {
    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

/// Trade direction from the recommendation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignalKind {
    Buy,
    Sell,
    Neutral,
    Error,
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Medium => write!(f, "MEDIUM"),
            Self::High => write!(f, "HIGH"),
        }
    }
}

/// Fixed-schema reply from the recommendation service.
///
/// Either a well-formed recommendation or an ERROR sentinel; never partially
/// populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub signal: SignalKind,
    pub entry_price: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub confidence: Confidence,
    pub rationale: String,
    pub risk_factors: String,
}

impl TradeSignal {
    /// ERROR sentinel carrying a failure message in `rationale`.
    pub fn error(reason: impl Into<String>) -> Self {
        Self {
            signal: SignalKind::Error,
            entry_price: 0.0,
            stop_loss: 0.0,
            take_profit: 0.0,
            confidence: Confidence::Low,
            rationale: reason.into(),
            risk_factors: "Unable to assess risks due to signal generation failure".into(),
        }
    }
}
