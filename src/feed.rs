use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use error_stack::{Report, bail};
use tracing::{debug, warn};

use crate::error::FeedError;
use crate::model::PricePoint;

/// Top-level field names recognized when collapsing two-level column headers.
const KNOWN_FIELDS: &[&str] = &["open", "high", "low", "close", "volume", "adj close"];

/// Logical fields every canonical series must resolve.
const REQUIRED_COLUMNS: &[&str] = &["open", "high", "low", "close", "volume"];

/// Substrings that mark a column as time-related during timestamp resolution.
const TIME_WORDS: &[&str] = &["date", "time", "datetime"];

/// One cell of a raw market feed. Providers are inconsistent about types, so
/// timestamps may arrive pre-parsed, as text, or as epoch seconds.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Missing,
}

/// One column of a raw feed. `name` holds one entry per header level; a
/// single-level header is a one-element vector.
#[derive(Debug, Clone)]
pub struct RawColumn {
    pub name: Vec<String>,
    pub values: Vec<RawValue>,
}

impl RawColumn {
    pub fn single(name: impl Into<String>, values: Vec<RawValue>) -> Self {
        Self {
            name: vec![name.into()],
            values,
        }
    }

    pub fn two_level(top: impl Into<String>, second: impl Into<String>, values: Vec<RawValue>) -> Self {
        Self {
            name: vec![top.into(), second.into()],
            values,
        }
    }

    pub fn numbers(name: impl Into<String>, values: &[f64]) -> Self {
        Self::single(name, values.iter().map(|&v| RawValue::Number(v)).collect())
    }
}

/// A raw tabular feed of unknown column naming and shape. `index` carries a
/// datetime index for providers that do not expose the timestamp as a column.
#[derive(Debug, Clone, Default)]
pub struct RawFeed {
    pub columns: Vec<RawColumn>,
    pub index: Option<Vec<DateTime<Utc>>>,
}

/// Result of normalization: either a canonical series or an explicit
/// empty-series marker. Normalization never surfaces an error to callers.
#[derive(Debug, Clone)]
pub enum NormalizeOutcome {
    Series(Vec<PricePoint>),
    Empty { reason: String },
}

impl NormalizeOutcome {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Series(points) => points.is_empty(),
            Self::Empty { .. } => true,
        }
    }

    /// Unwrap into a series; the empty marker becomes an empty vector.
    pub fn into_series(self) -> Vec<PricePoint> {
        match self {
            Self::Series(points) => points,
            Self::Empty { .. } => Vec::new(),
        }
    }
}

/// Normalize a raw feed into the canonical series.
///
/// Any failure (no timestamp column, unresolvable OHLCV column, unparseable
/// timestamps) is recovered into `NormalizeOutcome::Empty` so callers only
/// ever branch on "found" vs "no data available".
pub fn normalize(feed: RawFeed) -> NormalizeOutcome {
    match try_normalize(feed) {
        Ok(points) => NormalizeOutcome::Series(points),
        Err(report) => {
            warn!(error = ?report, "feed normalization failed, returning empty series");
            NormalizeOutcome::Empty {
                reason: report.to_string(),
            }
        }
    }
}

fn try_normalize(feed: RawFeed) -> Result<Vec<PricePoint>, Report<FeedError>> {
    let index = feed.index;
    let mut columns = collapse_levels(feed.columns);
    canonicalize_names(&mut columns);

    let timestamps = resolve_timestamps(&mut columns, index.as_deref())?;

    let names: Vec<String> = columns.iter().map(|c| c.name[0].clone()).collect();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .filter(|required| resolve_column(required, &names).is_none())
        .copied()
        .collect();
    if !missing.is_empty() {
        bail!(FeedError::MissingColumns {
            columns: format!("{missing:?}"),
        });
    }

    let field = |col: usize, row: usize| numeric_cell(&columns[col].values, row);

    // resolve_column is total for every required field after the check above
    let position = |target: &str| resolve_column(target, &names).unwrap_or(0);
    let (open, high, low, close, volume) = (
        position("open"),
        position("high"),
        position("low"),
        position("close"),
        position("volume"),
    );

    let mut points = Vec::with_capacity(timestamps.len());
    let mut prev_close: Option<f64> = None;
    for (row, timestamp) in timestamps.into_iter().enumerate() {
        let close_value = field(close, row);
        let price_change = prev_close.map(|p| close_value - p);
        let percent_change = prev_close.map(|p| (close_value / p - 1.0) * 100.0);
        points.push(PricePoint {
            timestamp,
            open: field(open, row),
            high: field(high, row),
            low: field(low, row),
            close: close_value,
            volume: field(volume, row),
            price_change,
            percent_change,
        });
        prev_close = Some(close_value);
    }

    debug!(rows = points.len(), "feed normalized");
    Ok(points)
}

/// Collapse two-level headers to the field level when every top-level name is
/// a known OHLCV field; otherwise flatten levels with an underscore.
fn collapse_levels(columns: Vec<RawColumn>) -> Vec<RawColumn> {
    let multi_level = columns.iter().any(|c| c.name.len() > 1);
    if !multi_level {
        return columns;
    }

    let all_known = columns
        .iter()
        .all(|c| KNOWN_FIELDS.contains(&c.name[0].to_lowercase().as_str()));

    columns
        .into_iter()
        .map(|mut c| {
            if all_known {
                c.name.truncate(1);
            } else {
                c.name = vec![c.name.join("_")];
            }
            c
        })
        .collect()
}

/// Lowercase all column names and replace spaces with underscores.
fn canonicalize_names(columns: &mut [RawColumn]) {
    for column in columns.iter_mut() {
        let canonical = column.name[0].to_lowercase().replace(' ', "_");
        column.name = vec![canonical];
    }
}

/// Resolve the timestamp column: literal `date`, then `datetime`, then any
/// column with a time-related substring in its name, then the feed index.
/// Removes the chosen column from `columns` so it cannot shadow an OHLCV name.
fn resolve_timestamps(
    columns: &mut Vec<RawColumn>,
    index: Option<&[DateTime<Utc>]>,
) -> Result<Vec<DateTime<Utc>>, Report<FeedError>> {
    let position = columns
        .iter()
        .position(|c| c.name[0] == "date")
        .or_else(|| columns.iter().position(|c| c.name[0] == "datetime"))
        .or_else(|| {
            columns
                .iter()
                .position(|c| TIME_WORDS.iter().any(|w| c.name[0].contains(w)))
        });

    if let Some(pos) = position {
        let column = columns.remove(pos);
        return column.values.iter().map(parse_timestamp).collect();
    }

    if let Some(index) = index {
        return Ok(index.to_vec());
    }

    bail!(FeedError::NoTimestampColumn)
}

fn parse_timestamp(value: &RawValue) -> Result<DateTime<Utc>, Report<FeedError>> {
    match value {
        RawValue::Timestamp(ts) => Ok(*ts),
        RawValue::Number(secs) => DateTime::from_timestamp(*secs as i64, 0).ok_or_else(|| {
            Report::new(FeedError::TimestampParse {
                value: secs.to_string(),
            })
        }),
        RawValue::Text(text) => parse_timestamp_text(text).ok_or_else(|| {
            Report::new(FeedError::TimestampParse {
                value: text.clone(),
            })
        }),
        RawValue::Missing => Err(Report::new(FeedError::TimestampParse {
            value: "<missing>".into(),
        })),
    }
}

fn parse_timestamp_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }
    None
}

/// Ordered column-resolution strategies, applied deterministically. Later
/// strategies only run when earlier ones find nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStrategy {
    Exact,
    CaseInsensitive,
    Substring,
    /// `close` only: fall back to an adjusted-close column.
    AdjustedClose,
}

impl ResolveStrategy {
    pub fn apply(self, target: &str, names: &[String]) -> Option<usize> {
        match self {
            Self::Exact => names.iter().position(|n| n == target),
            Self::CaseInsensitive => names
                .iter()
                .position(|n| n.eq_ignore_ascii_case(target)),
            Self::Substring => names
                .iter()
                .position(|n| n.to_lowercase().contains(&target.to_lowercase())),
            Self::AdjustedClose => {
                if target != "close" {
                    return None;
                }
                names.iter().position(|n| n == "adj_close")
            }
        }
    }
}

const RESOLVE_ORDER: &[ResolveStrategy] = &[
    ResolveStrategy::Exact,
    ResolveStrategy::CaseInsensitive,
    ResolveStrategy::Substring,
    ResolveStrategy::AdjustedClose,
];

/// Resolve a required logical field to a column index, or `None` if no
/// strategy matches.
pub fn resolve_column(target: &str, names: &[String]) -> Option<usize> {
    RESOLVE_ORDER
        .iter()
        .find_map(|strategy| strategy.apply(target, names))
}

fn numeric_cell(values: &[RawValue], row: usize) -> f64 {
    match values.get(row) {
        Some(RawValue::Number(v)) => *v,
        Some(RawValue::Text(t)) => t.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}
