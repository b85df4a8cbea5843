use std::fmt;

use error_stack::{Report, ResultExt, bail};
use futures::future::BoxFuture;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::SignalError;
use crate::model::{IndicatorBundle, TradeSignal};

/// Samples summarized for the recommendation prompt (24 hours at the default
/// hourly interval).
const SUMMARY_SAMPLES: usize = 24;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_MODEL: &str = "gpt-4o";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsiState {
    Overbought,
    Oversold,
    Neutral,
}

impl fmt::Display for RsiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Overbought => write!(f, "overbought"),
            Self::Oversold => write!(f, "oversold"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdTrend {
    Bullish,
    Bearish,
}

impl fmt::Display for MacdTrend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerPosition {
    UpperBand,
    LowerBand,
    Middle,
}

impl fmt::Display for BollingerPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UpperBand => write!(f, "upper_band"),
            Self::LowerBand => write!(f, "lower_band"),
            Self::Middle => write!(f, "middle"),
        }
    }
}

/// Numeric summary of current market conditions, extracted from the most
/// recent rows of an indicator bundle.
#[derive(Debug, Clone)]
pub struct MarketSummary {
    pub current_price: f64,
    pub price_change: f64,
    pub price_change_pct: f64,
    pub high: f64,
    pub low: f64,
    pub volatility: f64,
    pub rsi: Option<f64>,
    pub rsi_state: RsiState,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_trend: MacdTrend,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub bb_position: BollingerPosition,
    pub support: Vec<f64>,
    pub resistance: Vec<f64>,
}

impl MarketSummary {
    /// Summarize the last 24 samples of the bundle. Returns `None` for an
    /// empty bundle so callers can short-circuit before any external call.
    pub fn from_bundle(bundle: &IndicatorBundle) -> Option<Self> {
        let current_price = bundle.last_price?;
        let tail_start = bundle.series.len().saturating_sub(SUMMARY_SAMPLES);
        let recent = &bundle.series[tail_start..];

        let first_close = recent.first()?.close;
        let last_close = recent.last()?.close;
        let high = recent.iter().map(|p| p.high).fold(f64::MIN, f64::max);
        let low = recent.iter().map(|p| p.low).fold(f64::MAX, f64::min);

        let last = |column: &[Option<f64>]| column.last().copied().flatten();
        let rsi = last(&bundle.indicators.rsi);
        let macd = last(&bundle.indicators.macd);
        let macd_signal = last(&bundle.indicators.macd_signal);
        let bb_upper = last(&bundle.indicators.bb_upper);
        let bb_lower = last(&bundle.indicators.bb_lower);

        Some(Self {
            current_price,
            price_change: last_close - first_close,
            price_change_pct: (last_close / first_close - 1.0) * 100.0,
            high,
            low,
            volatility: high - low,
            rsi,
            rsi_state: rsi_state(rsi),
            macd,
            macd_signal,
            macd_trend: macd_trend(macd, macd_signal),
            bb_upper,
            bb_lower,
            bb_position: bollinger_position(current_price, bb_upper, bb_lower),
            support: bundle.levels.support.clone(),
            resistance: bundle.levels.resistance.clone(),
        })
    }
}

/// RSI above 70 is overbought, below 30 oversold. A missing (not yet warmed
/// up) value reads as neutral.
fn rsi_state(rsi: Option<f64>) -> RsiState {
    match rsi {
        Some(value) if value > 70.0 => RsiState::Overbought,
        Some(value) if value < 30.0 => RsiState::Oversold,
        _ => RsiState::Neutral,
    }
}

fn macd_trend(macd: Option<f64>, signal: Option<f64>) -> MacdTrend {
    match (macd, signal) {
        (Some(m), Some(s)) if m > s => MacdTrend::Bullish,
        _ => MacdTrend::Bearish,
    }
}

fn bollinger_position(price: f64, upper: Option<f64>, lower: Option<f64>) -> BollingerPosition {
    if let Some(upper) = upper
        && price > upper
    {
        return BollingerPosition::UpperBand;
    }
    if let Some(lower) = lower
        && price < lower
    {
        return BollingerPosition::LowerBand;
    }
    BollingerPosition::Middle
}

fn fmt_opt(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "n/a".into(),
    }
}

fn fmt_levels(levels: &[f64]) -> String {
    let formatted: Vec<String> = levels.iter().map(|l| format!("${l:.2}")).collect();
    format!("[{}]", formatted.join(", "))
}

/// Build the text prompt for the recommendation service: current conditions,
/// indicator readings with categorical labels, levels, and an instruction to
/// reply with the exact JSON schema.
pub fn build_prompt(summary: &MarketSummary) -> String {
    format!(
        r#"You are an expert gold trading analyst specialized in XAUUSD technical analysis.
Analyze the following market data and generate a trading signal based only on the provided information.

Current Market Conditions for XAUUSD (Gold/USD):
- Current Price: ${price:.2}
- 24h Price Change: ${change:.2} ({change_pct:.2}%)
- 24h High: ${high:.2}
- 24h Low: ${low:.2}
- 24h Volatility: ${volatility:.2}

Technical Indicators:
- RSI (14): {rsi} ({rsi_state})
- MACD: {macd} (Signal: {macd_signal}, Trend: {macd_trend})
- Bollinger Bands: Price is near the {bb_position} (Upper: ${bb_upper}, Lower: ${bb_lower})

Support and Resistance Levels:
- Support Levels: {support}
- Resistance Levels: {resistance}

Based on this technical analysis, provide a trading recommendation in JSON format:
1. Signal type (BUY, SELL, or NEUTRAL)
2. Entry price
3. Stop-loss price (specify a technically appropriate level)
4. Take-profit price (specify a technically appropriate level)
5. Confidence level (LOW, MEDIUM, HIGH)
6. Short explanation of the trade rationale
7. Key risk factors to monitor

Response must be in a single valid JSON object with these exact keys:
{{
  "signal": "BUY, SELL, or NEUTRAL",
  "entry_price": 0.0,
  "stop_loss": 0.0,
  "take_profit": 0.0,
  "confidence": "LOW, MEDIUM, or HIGH",
  "rationale": "explanation here",
  "risk_factors": "risks here"
}}"#,
        price = summary.current_price,
        change = summary.price_change,
        change_pct = summary.price_change_pct,
        high = summary.high,
        low = summary.low,
        volatility = summary.volatility,
        rsi = fmt_opt(summary.rsi),
        rsi_state = summary.rsi_state,
        macd = fmt_opt(summary.macd),
        macd_signal = fmt_opt(summary.macd_signal),
        macd_trend = summary.macd_trend,
        bb_position = summary.bb_position,
        bb_upper = fmt_opt(summary.bb_upper),
        bb_lower = fmt_opt(summary.bb_lower),
        support = fmt_levels(&summary.support),
        resistance = fmt_levels(&summary.resistance),
    )
}

/// External text-generation capability behind an object-safe trait.
///
/// Uses `BoxFuture` (from `futures` crate) instead of `async fn` in trait to
/// keep the trait object-safe (`dyn SignalService`), so tests can substitute
/// a stub for the live API.
pub trait SignalService: Send + Sync {
    /// Submit a prompt and return the raw reply text.
    fn complete(&self, prompt: String) -> BoxFuture<'_, Result<String, Report<SignalError>>>;
}

/// OpenAI chat-completions implementation of [`SignalService`].
pub struct OpenAiService {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiService {
    pub fn new(api_key: String, model: String, base_url: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url: base_url.unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

impl SignalService for OpenAiService {
    fn complete(&self, prompt: String) -> BoxFuture<'_, Result<String, Report<SignalError>>> {
        Box::pin(async move {
            let url = format!("{}/v1/chat/completions", self.base_url);
            let body = json!({
                "model": self.model,
                "messages": [{"role": "user", "content": prompt}],
                "response_format": {"type": "json_object"},
                "temperature": 0.1,
                "max_tokens": 1000,
            });

            let response = self
                .client
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await
                .change_context(SignalError::Request)?;

            if !response.status().is_success() {
                return Err(Report::new(SignalError::Request)
                    .attach(format!("HTTP status: {}", response.status())));
            }

            let reply: ChatReply = response
                .json()
                .await
                .change_context(SignalError::ReplyParse)?;

            let Some(choice) = reply.choices.into_iter().next() else {
                bail!(SignalError::ReplyParse);
            };

            debug!(model = %self.model, "signal service reply received");
            Ok(choice.message.content)
        })
    }
}

/// Generate a trading recommendation for the bundle.
///
/// Never fails outright: an empty bundle short-circuits before the external
/// call, and any service or parse failure is converted into the ERROR
/// sentinel with the failure message in `rationale`.
pub async fn generate_trade_signal(
    service: &dyn SignalService,
    bundle: &IndicatorBundle,
) -> TradeSignal {
    let Some(summary) = MarketSummary::from_bundle(bundle) else {
        return TradeSignal::error("Insufficient data to generate trade signal");
    };

    let prompt = build_prompt(&summary);
    let content = match service.complete(prompt).await {
        Ok(content) => content,
        Err(report) => {
            warn!(error = ?report, "signal service request failed");
            return TradeSignal::error(format!("Failed to generate trade signal: {report}"));
        }
    };

    match serde_json::from_str::<TradeSignal>(&content) {
        Ok(signal) => signal,
        Err(e) => {
            warn!(error = %e, "signal service reply was not valid schema JSON");
            TradeSignal::error(format!("Failed to generate trade signal: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{TimeZone, Utc};

    use crate::analysis::{IndicatorSettings, analyze};
    use crate::model::{Confidence, IndicatorSeries, LevelSet, SignalKind};

    fn points_from_closes(closes: &[f64]) -> Vec<crate::model::PricePoint> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| crate::model::PricePoint {
                timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
                    + chrono::Duration::hours(i as i64),
                open: c,
                high: c + 1.0,
                low: c - 1.0,
                close: c,
                volume: 10.0,
                price_change: None,
                percent_change: None,
            })
            .collect()
    }

    fn empty_bundle() -> IndicatorBundle {
        IndicatorBundle {
            series: Vec::new(),
            indicators: IndicatorSeries::default(),
            levels: LevelSet::default(),
            last_price: None,
        }
    }

    struct StubService {
        reply: Result<String, ()>,
        calls: AtomicUsize,
    }

    impl StubService {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                reply: Err(()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl SignalService for StubService {
        fn complete(&self, _prompt: String) -> BoxFuture<'_, Result<String, Report<SignalError>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let reply = self.reply.clone();
            Box::pin(async move {
                reply.map_err(|_| Report::new(SignalError::Request))
            })
        }
    }

    const VALID_REPLY: &str = r#"{
        "signal": "BUY",
        "entry_price": 1910.0,
        "stop_loss": 1900.0,
        "take_profit": 1930.0,
        "confidence": "MEDIUM",
        "rationale": "bounce off support",
        "risk_factors": "dollar strength"
    }"#;

    fn analyzed_bundle() -> IndicatorBundle {
        let closes: Vec<f64> = (0..40)
            .map(|i| 1900.0 + 6.0 * ((i as f64) * 0.4).sin())
            .collect();
        analyze(points_from_closes(&closes), &IndicatorSettings::default()).unwrap()
    }

    #[tokio::test]
    async fn empty_bundle_short_circuits_without_service_call() {
        let service = StubService::replying(VALID_REPLY);
        let signal = generate_trade_signal(&service, &empty_bundle()).await;
        assert_eq!(signal.signal, SignalKind::Error);
        assert!(signal.rationale.contains("Insufficient data"));
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn valid_reply_is_parsed() {
        let service = StubService::replying(VALID_REPLY);
        let signal = generate_trade_signal(&service, &analyzed_bundle()).await;
        assert_eq!(signal.signal, SignalKind::Buy);
        assert_eq!(signal.confidence, Confidence::Medium);
        assert!((signal.entry_price - 1910.0).abs() < 1e-9);
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn malformed_reply_becomes_error_sentinel() {
        let service = StubService::replying("not json at all");
        let signal = generate_trade_signal(&service, &analyzed_bundle()).await;
        assert_eq!(signal.signal, SignalKind::Error);
        assert_eq!(signal.confidence, Confidence::Low);
        assert_eq!(signal.entry_price, 0.0);
        assert!(signal.rationale.contains("Failed to generate trade signal"));
    }

    #[tokio::test]
    async fn service_failure_becomes_error_sentinel() {
        let service = StubService::failing();
        let signal = generate_trade_signal(&service, &analyzed_bundle()).await;
        assert_eq!(signal.signal, SignalKind::Error);
        assert!(signal.rationale.contains("Failed to generate trade signal"));
    }

    #[test]
    fn rsi_state_thresholds() {
        assert_eq!(rsi_state(Some(75.0)), RsiState::Overbought);
        assert_eq!(rsi_state(Some(25.0)), RsiState::Oversold);
        assert_eq!(rsi_state(Some(50.0)), RsiState::Neutral);
        assert_eq!(rsi_state(Some(70.0)), RsiState::Neutral);
        assert_eq!(rsi_state(None), RsiState::Neutral);
    }

    #[test]
    fn macd_trend_compares_line_to_signal() {
        assert_eq!(macd_trend(Some(1.0), Some(0.5)), MacdTrend::Bullish);
        assert_eq!(macd_trend(Some(0.5), Some(1.0)), MacdTrend::Bearish);
        assert_eq!(macd_trend(None, None), MacdTrend::Bearish);
    }

    #[test]
    fn bollinger_position_brackets_price() {
        assert_eq!(
            bollinger_position(110.0, Some(105.0), Some(95.0)),
            BollingerPosition::UpperBand
        );
        assert_eq!(
            bollinger_position(90.0, Some(105.0), Some(95.0)),
            BollingerPosition::LowerBand
        );
        assert_eq!(
            bollinger_position(100.0, Some(105.0), Some(95.0)),
            BollingerPosition::Middle
        );
        assert_eq!(bollinger_position(100.0, None, None), BollingerPosition::Middle);
    }

    #[test]
    fn summary_covers_last_24_samples() {
        let mut closes = vec![1000.0; 10];
        closes.extend((0..24).map(|i| 1900.0 + i as f64));
        let bundle = analyze(points_from_closes(&closes), &IndicatorSettings::default()).unwrap();
        let summary = MarketSummary::from_bundle(&bundle).unwrap();
        assert!((summary.current_price - 1923.0).abs() < 1e-9);
        assert!((summary.price_change - 23.0).abs() < 1e-9);
        // high/low come from the 24-sample tail, not the leading 1000s
        assert!((summary.low - 1899.0).abs() < 1e-9);
        assert!((summary.high - 1924.0).abs() < 1e-9);
        assert!((summary.volatility - 25.0).abs() < 1e-9);
    }

    #[test]
    fn summary_absent_for_empty_bundle() {
        assert!(MarketSummary::from_bundle(&empty_bundle()).is_none());
    }

    #[test]
    fn prompt_embeds_summary_and_schema() {
        let bundle = analyzed_bundle();
        let summary = MarketSummary::from_bundle(&bundle).unwrap();
        let prompt = build_prompt(&summary);
        assert!(prompt.contains("XAUUSD"));
        assert!(prompt.contains("Current Price: $"));
        assert!(prompt.contains("\"signal\": \"BUY, SELL, or NEUTRAL\""));
        assert!(prompt.contains("Support Levels:"));
        assert!(prompt.contains(&format!("({})", summary.rsi_state)));
    }
}
