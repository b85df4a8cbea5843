use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::{align_series, close_prices, rolling_mean};
use crate::model::PricePoint;

/// RSI over a rolling simple mean of gains and losses.
///
/// The first `window` rows of the output are missing; a zero average loss is
/// replaced by machine epsilon so the ratio stays finite.
pub struct Rsi {
    window: usize,
}

impl Rsi {
    pub fn new(window: usize) -> Result<Self, Report<IndicatorError>> {
        if window == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "window must be > 0".into(),
            });
        }
        Ok(Self { window })
    }

    /// Calculate RSI aligned 1:1 with the input series. Series shorter than
    /// `window + 1` yield all-missing output rather than an error.
    pub fn calculate(&self, points: &[PricePoint]) -> Vec<Option<f64>> {
        let prices = close_prices(points);
        let n = prices.len();
        if n <= self.window {
            return vec![None; n];
        }

        let deltas: Vec<f64> = prices.windows(2).map(|w| w[1] - w[0]).collect();
        let gains: Vec<f64> = deltas.iter().map(|&d| d.max(0.0)).collect();
        let losses: Vec<f64> = deltas.iter().map(|&d| (-d).max(0.0)).collect();

        let avg_gains = rolling_mean(&gains, self.window);
        let avg_losses = rolling_mean(&losses, self.window);

        let values: Vec<f64> = avg_gains
            .iter()
            .zip(avg_losses.iter())
            .map(|(&gain, &loss)| rsi_value(gain, loss))
            .collect();

        align_series(n, values)
    }
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    let loss = if avg_loss == 0.0 {
        f64::EPSILON
    } else {
        avg_loss
    };
    let rs = avg_gain / loss;
    100.0 - 100.0 / (1.0 + rs)
}
