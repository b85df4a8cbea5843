use error_stack::Report;

use crate::error::IndicatorError;
use crate::indicator::bollinger::BollingerBands;
use crate::indicator::macd::Macd;
use crate::indicator::rsi::Rsi;
use crate::levels::{self, LevelDetector};
use crate::model::{IndicatorBundle, IndicatorSeries, PricePoint};

/// Indicator parameters, overridable from configuration.
#[derive(Debug, Clone)]
pub struct IndicatorSettings {
    pub rsi_window: usize,
    pub macd_fast: usize,
    pub macd_slow: usize,
    pub macd_signal: usize,
    pub bb_window: usize,
    pub bb_std_multiplier: f64,
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            rsi_window: 14,
            macd_fast: 12,
            macd_slow: 26,
            macd_signal: 9,
            bb_window: 20,
            bb_std_multiplier: 2.0,
        }
    }
}

/// Run the indicator engine and level detector over a normalized series and
/// compose the result. Pure composition: an empty input yields an empty
/// bundle with `last_price` absent, not an error.
pub fn analyze(
    series: Vec<PricePoint>,
    settings: &IndicatorSettings,
) -> Result<IndicatorBundle, Report<IndicatorError>> {
    let rsi = Rsi::new(settings.rsi_window)?;
    let macd = Macd::new(settings.macd_fast, settings.macd_slow, settings.macd_signal)?;
    let bollinger = BollingerBands::new(settings.bb_window, settings.bb_std_multiplier)?;
    let detector = LevelDetector::new(levels::DEFAULT_WINDOW, levels::DEFAULT_PROMINENCE)?;

    let rsi_series = rsi.calculate(&series);
    let macd_series = macd.calculate(&series);
    let bb_series = bollinger.calculate(&series);
    let level_set = detector.detect(&series);
    let last_price = series.last().map(|p| p.close);

    Ok(IndicatorBundle {
        indicators: IndicatorSeries {
            rsi: rsi_series,
            macd: macd_series.line,
            macd_signal: macd_series.signal,
            macd_histogram: macd_series.histogram,
            bb_upper: bb_series.upper,
            bb_middle: bb_series.middle,
            bb_lower: bb_series.lower,
        },
        levels: level_set,
        last_price,
        series,
    })
}
