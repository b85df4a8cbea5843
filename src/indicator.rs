pub mod bollinger;
pub mod macd;
pub mod rsi;

use crate::model::PricePoint;

/// Extract close prices from the canonical series.
pub fn close_prices(points: &[PricePoint]) -> Vec<f64> {
    points.iter().map(|p| p.close).collect()
}

/// Align a tail-valued output to the full series length, padding the warm-up
/// region with `None`.
pub fn align_series(total_len: usize, values: Vec<f64>) -> Vec<Option<f64>> {
    let offset = total_len.saturating_sub(values.len());
    let mut output = vec![None; total_len];
    for (index, value) in values.into_iter().enumerate() {
        output[offset + index] = Some(value);
    }
    output
}

/// Rolling simple mean; output is shorter than input by `window - 1`.
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values
        .windows(window)
        .map(|w| w.iter().sum::<f64>() / window as f64)
        .collect()
}

/// Rolling sample standard deviation (ddof = 1), matching pandas' default.
/// A window of 1 yields NaN, as the sample variance is undefined there.
pub fn rolling_sample_std(values: &[f64], window: usize) -> Vec<f64> {
    if window == 0 || values.len() < window {
        return Vec::new();
    }
    values
        .windows(window)
        .map(|w| {
            let mean = w.iter().sum::<f64>() / window as f64;
            let sum_sq = w.iter().map(|&v| (v - mean).powi(2)).sum::<f64>();
            (sum_sq / (window as f64 - 1.0)).sqrt()
        })
        .collect()
}

/// Span-parameterized exponential moving average in the recursive
/// (`adjust=false`) form: alpha = 2 / (span + 1), seeded with the first value.
/// Output has the full input length; there is no warm-up gap.
pub fn span_ema(values: &[f64], span: usize) -> Vec<f64> {
    let Some(&first) = values.first() else {
        return Vec::new();
    };
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut ema = first;
    let mut output = Vec::with_capacity(values.len());
    output.push(ema);
    for &value in &values[1..] {
        ema = value * alpha + ema * (1.0 - alpha);
        output.push(ema);
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_series_pads_leading_nones() {
        let aligned = align_series(5, vec![1.0, 2.0]);
        assert_eq!(aligned, vec![None, None, None, Some(1.0), Some(2.0)]);
    }

    #[test]
    fn align_series_handles_empty_values() {
        assert_eq!(align_series(3, Vec::new()), vec![None, None, None]);
    }

    #[test]
    fn rolling_mean_known_values() {
        let means = rolling_mean(&[1.0, 2.0, 3.0, 4.0], 3);
        assert_eq!(means.len(), 2);
        assert!((means[0] - 2.0).abs() < 1e-9);
        assert!((means[1] - 3.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_mean_short_input_is_empty() {
        assert!(rolling_mean(&[1.0, 2.0], 3).is_empty());
        assert!(rolling_mean(&[1.0, 2.0], 0).is_empty());
    }

    #[test]
    fn rolling_sample_std_uses_ddof_one() {
        // Sample std of [1, 2, 3] = 1.0
        let stds = rolling_sample_std(&[1.0, 2.0, 3.0], 3);
        assert_eq!(stds.len(), 1);
        assert!((stds[0] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn rolling_sample_std_constant_window_is_zero() {
        let stds = rolling_sample_std(&[5.0, 5.0, 5.0, 5.0], 3);
        for std in &stds {
            assert!((std - 0.0).abs() < 1e-12);
        }
    }

    #[test]
    fn span_ema_seeds_with_first_value() {
        let ema = span_ema(&[10.0, 11.0, 12.0], 3);
        assert_eq!(ema.len(), 3);
        assert!((ema[0] - 10.0).abs() < 1e-9);
        // alpha = 0.5: 11*0.5 + 10*0.5 = 10.5
        assert!((ema[1] - 10.5).abs() < 1e-9);
    }

    #[test]
    fn span_ema_empty_input_is_empty() {
        assert!(span_ema(&[], 12).is_empty());
    }

    #[test]
    fn span_ema_flat_input_stays_flat() {
        let ema = span_ema(&[7.0; 10], 5);
        for v in &ema {
            assert!((v - 7.0).abs() < 1e-9);
        }
    }
}
