use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{close_prices, span_ema};
use crate::model::PricePoint;

/// MACD line, signal line, and histogram aligned 1:1 with the input series.
///
/// Built from recursive span EMAs seeded with the first close, so every row is
/// present once the series has at least one point. Values for very short
/// series are numerically unstable but never missing.
#[derive(Debug, Clone, Default)]
pub struct MacdSeries {
    pub line: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

pub struct Macd {
    fast_span: usize,
    slow_span: usize,
    signal_span: usize,
}

impl Macd {
    pub fn new(
        fast_span: usize,
        slow_span: usize,
        signal_span: usize,
    ) -> Result<Self, Report<IndicatorError>> {
        if fast_span == 0 || slow_span == 0 || signal_span == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "all spans must be > 0".into(),
            });
        }
        if fast_span >= slow_span {
            bail!(IndicatorError::InvalidParameter {
                name: "fast_span must be < slow_span".into(),
            });
        }
        Ok(Self {
            fast_span,
            slow_span,
            signal_span,
        })
    }

    pub fn calculate(&self, points: &[PricePoint]) -> MacdSeries {
        let prices = close_prices(points);
        let fast = span_ema(&prices, self.fast_span);
        let slow = span_ema(&prices, self.slow_span);

        let line: Vec<f64> = fast
            .iter()
            .zip(slow.iter())
            .map(|(f, s)| f - s)
            .collect();
        let signal = span_ema(&line, self.signal_span);
        let histogram: Vec<f64> = line
            .iter()
            .zip(signal.iter())
            .map(|(m, s)| m - s)
            .collect();

        MacdSeries {
            line: line.into_iter().map(Some).collect(),
            signal: signal.into_iter().map(Some).collect(),
            histogram: histogram.into_iter().map(Some).collect(),
        }
    }
}
