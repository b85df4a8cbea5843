use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{align_series, close_prices, rolling_mean, rolling_sample_std};
use crate::model::PricePoint;

/// Bollinger band columns aligned 1:1 with the input series. The first
/// `window - 1` rows are missing.
#[derive(Debug, Clone, Default)]
pub struct BollingerSeries {
    pub upper: Vec<Option<f64>>,
    pub middle: Vec<Option<f64>>,
    pub lower: Vec<Option<f64>>,
}

pub struct BollingerBands {
    window: usize,
    std_multiplier: f64,
}

impl BollingerBands {
    pub fn new(window: usize, std_multiplier: f64) -> Result<Self, Report<IndicatorError>> {
        if window == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "window must be > 0".into(),
            });
        }
        if std_multiplier <= 0.0 {
            bail!(IndicatorError::InvalidParameter {
                name: "std_multiplier must be > 0".into(),
            });
        }
        Ok(Self {
            window,
            std_multiplier,
        })
    }

    pub fn calculate(&self, points: &[PricePoint]) -> BollingerSeries {
        let prices = close_prices(points);
        let n = prices.len();

        let middle = rolling_mean(&prices, self.window);
        let std = rolling_sample_std(&prices, self.window);

        let upper: Vec<f64> = middle
            .iter()
            .zip(std.iter())
            .map(|(m, s)| m + self.std_multiplier * s)
            .collect();
        let lower: Vec<f64> = middle
            .iter()
            .zip(std.iter())
            .map(|(m, s)| m - self.std_multiplier * s)
            .collect();

        BollingerSeries {
            upper: align_series(n, upper),
            middle: align_series(n, middle),
            lower: align_series(n, lower),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn points_from_closes(closes: &[f64]) -> Vec<PricePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PricePoint {
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::hours(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1.0,
                price_change: None,
                percent_change: None,
            })
            .collect()
    }

    #[test]
    fn bollinger_window_zero_invalid() {
        assert!(BollingerBands::new(0, 2.0).is_err());
    }

    #[test]
    fn bollinger_negative_multiplier_invalid() {
        assert!(BollingerBands::new(20, -1.0).is_err());
    }

    #[test]
    fn bollinger_short_series_is_all_missing() {
        let bb = BollingerBands::new(20, 2.0).unwrap();
        let series = bb.calculate(&points_from_closes(&[1900.0; 10]));
        assert_eq!(series.middle.len(), 10);
        assert!(series.middle.iter().all(Option::is_none));
    }

    #[test]
    fn bollinger_missing_exactly_first_window_minus_one_rows() {
        let bb = BollingerBands::new(20, 2.0).unwrap();
        let closes: Vec<f64> = (0..30).map(|i| 1900.0 + i as f64).collect();
        let series = bb.calculate(&points_from_closes(&closes));
        assert!(series.middle[..19].iter().all(Option::is_none));
        assert!(series.middle[19..].iter().all(Option::is_some));
        assert!(series.upper[19..].iter().all(Option::is_some));
        assert!(series.lower[19..].iter().all(Option::is_some));
    }

    #[test]
    fn bollinger_band_ordering() {
        let bb = BollingerBands::new(5, 2.0).unwrap();
        let closes: Vec<f64> = (0..30)
            .map(|i| 1900.0 + 8.0 * ((i as f64) * 0.5).sin())
            .collect();
        let series = bb.calculate(&points_from_closes(&closes));
        for i in 0..closes.len() {
            if let (Some(upper), Some(middle), Some(lower)) =
                (series.upper[i], series.middle[i], series.lower[i])
            {
                assert!(upper >= middle, "upper {upper} < middle {middle}");
                assert!(middle >= lower, "middle {middle} < lower {lower}");
            }
        }
    }

    #[test]
    fn bollinger_flat_series_collapses_bands() {
        // Constant close for 25 points: std = 0, so all three bands coincide
        let bb = BollingerBands::new(20, 2.0).unwrap();
        let series = bb.calculate(&points_from_closes(&[1900.0; 25]));
        for i in 19..25 {
            let upper = series.upper[i].unwrap();
            let middle = series.middle[i].unwrap();
            let lower = series.lower[i].unwrap();
            assert!((upper - 1900.0).abs() < 1e-9);
            assert!((middle - 1900.0).abs() < 1e-9);
            assert!((lower - 1900.0).abs() < 1e-9);
        }
    }

    #[test]
    fn bollinger_bands_symmetric_around_middle() {
        let bb = BollingerBands::new(3, 2.0).unwrap();
        let series = bb.calculate(&points_from_closes(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        for i in 2..5 {
            let upper = series.upper[i].unwrap();
            let middle = series.middle[i].unwrap();
            let lower = series.lower[i].unwrap();
            assert!((upper - middle - (middle - lower)).abs() < 1e-9);
        }
    }
}
