use error_stack::{Report, bail};

use crate::error::IndicatorError;
use crate::indicator::close_prices;
use crate::model::{LevelSet, PricePoint};

pub const DEFAULT_WINDOW: usize = 10;
pub const DEFAULT_PROMINENCE: f64 = 0.5;

/// Maximum number of levels kept per side after reduction.
const MAX_LEVELS: usize = 5;

/// Minimum relative spacing between two consecutively kept levels.
const MIN_RELATIVE_SPACING: f64 = 0.001;

/// How candidate extrema are reduced to at most five levels per side.
///
/// `HighestPrice` sorts candidates ascending by price and keeps the five
/// numerically highest, which is what the original analysis did despite
/// labeling it "most recent". `MostRecent` keeps the five latest by position
/// in the series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidateFilter {
    #[default]
    HighestPrice,
    MostRecent,
}

/// Finds local extrema in the close series and reduces them to de-duplicated
/// support and resistance levels.
pub struct LevelDetector {
    window: usize,
    prominence: f64,
    filter: CandidateFilter,
}

impl LevelDetector {
    pub fn new(window: usize, prominence: f64) -> Result<Self, Report<IndicatorError>> {
        if window == 0 {
            bail!(IndicatorError::InvalidParameter {
                name: "window must be > 0".into(),
            });
        }
        if prominence <= 0.0 {
            bail!(IndicatorError::InvalidParameter {
                name: "prominence must be > 0".into(),
            });
        }
        Ok(Self {
            window,
            prominence,
            filter: CandidateFilter::default(),
        })
    }

    pub fn with_filter(mut self, filter: CandidateFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Detect support and resistance levels. A series too short to hold an
    /// interior extremum (< `2 * window + 1` points) yields empty sets.
    pub fn detect(&self, points: &[PricePoint]) -> LevelSet {
        let closes = close_prices(points);
        if closes.len() < 2 * self.window + 1 {
            return LevelSet::default();
        }

        let resistance_idx = find_peaks(&closes, self.window, self.prominence);
        let negated: Vec<f64> = closes.iter().map(|&c| -c).collect();
        let support_idx = find_peaks(&negated, self.window, self.prominence);

        LevelSet {
            support: self.reduce(&support_idx, &closes),
            resistance: self.reduce(&resistance_idx, &closes),
        }
    }

    fn reduce(&self, indices: &[usize], closes: &[f64]) -> Vec<f64> {
        let mut candidates: Vec<(usize, f64)> =
            indices.iter().map(|&i| (i, closes[i])).collect();

        match self.filter {
            CandidateFilter::HighestPrice => {
                candidates.sort_by(|a, b| a.1.total_cmp(&b.1));
            }
            CandidateFilter::MostRecent => {
                candidates.sort_by_key(|&(i, _)| i);
            }
        }
        let start = candidates.len().saturating_sub(MAX_LEVELS);
        let kept: Vec<f64> = candidates[start..].iter().map(|&(_, price)| price).collect();

        dedup_levels(&kept)
    }
}

/// Single left-to-right pass: always keep the first level; keep each later one
/// only when its relative distance from the previously kept level exceeds the
/// minimum spacing.
fn dedup_levels(levels: &[f64]) -> Vec<f64> {
    let mut kept: Vec<f64> = Vec::with_capacity(levels.len());
    for &level in levels {
        match kept.last() {
            None => kept.push(level),
            Some(&prev) => {
                if ((level - prev) / prev).abs() > MIN_RELATIVE_SPACING {
                    kept.push(level);
                }
            }
        }
    }
    kept
}

/// Local maxima with minimum horizontal separation `distance` and minimum
/// prominence, in ascending index order. A subset of scipy's `find_peaks`:
/// plateau midpoints count as peaks, the distance filter keeps higher peaks
/// over lower neighbors, and prominence is measured against the higher of the
/// two surrounding bases.
fn find_peaks(values: &[f64], distance: usize, min_prominence: f64) -> Vec<usize> {
    let maxima = local_maxima(values);
    let spaced = enforce_distance(&maxima, values, distance);
    spaced
        .into_iter()
        .filter(|&i| prominence(values, i) >= min_prominence)
        .collect()
}

/// Interior local maxima; a flat-topped peak is reported at its midpoint.
fn local_maxima(values: &[f64]) -> Vec<usize> {
    let n = values.len();
    let mut peaks = Vec::new();
    let mut i = 1;
    while i + 1 < n {
        if values[i] <= values[i - 1] {
            i += 1;
            continue;
        }
        // Rising edge; scan across any plateau
        let mut j = i;
        while j + 1 < n && values[j + 1] == values[i] {
            j += 1;
        }
        if j + 1 < n && values[j + 1] < values[i] {
            peaks.push((i + j) / 2);
        }
        i = j + 1;
    }
    peaks
}

/// Greedily suppress peaks closer than `distance` samples to a higher peak.
fn enforce_distance(peaks: &[usize], values: &[f64], distance: usize) -> Vec<usize> {
    let mut by_height: Vec<usize> = (0..peaks.len()).collect();
    by_height.sort_by(|&a, &b| values[peaks[b]].total_cmp(&values[peaks[a]]));

    let mut keep = vec![true; peaks.len()];
    for &k in &by_height {
        if !keep[k] {
            continue;
        }
        for (other, kept) in keep.iter_mut().enumerate() {
            if other != k && *kept && peaks[other].abs_diff(peaks[k]) < distance {
                *kept = false;
            }
        }
    }

    peaks
        .iter()
        .zip(keep)
        .filter_map(|(&peak, kept)| kept.then_some(peak))
        .collect()
}

/// Vertical drop from the peak to the higher of its two bases. Each base is
/// the minimum between the peak and the next higher value (or the series
/// boundary) on that side.
fn prominence(values: &[f64], peak: usize) -> f64 {
    let height = values[peak];

    let mut left_min = height;
    for j in (0..peak).rev() {
        if values[j] > height {
            break;
        }
        left_min = left_min.min(values[j]);
    }

    let mut right_min = height;
    for &value in &values[peak + 1..] {
        if value > height {
            break;
        }
        right_min = right_min.min(value);
    }

    height - left_min.max(right_min)
}
