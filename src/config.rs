use std::path::Path;

use error_stack::{Report, ResultExt};
use serde::Deserialize;

use crate::analysis::IndicatorSettings;
use crate::error::ConfigError;
use crate::signal;

fn default_log_level() -> String {
    "info".into()
}

fn default_log_format() -> String {
    "text".into()
}

fn default_symbol() -> String {
    // Yahoo Finance ticker for Gold futures, the XAUUSD proxy
    "GC=F".into()
}

fn default_period() -> String {
    "2d".into()
}

fn default_interval() -> String {
    "1h".into()
}

fn default_rsi_window() -> usize {
    14
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

fn default_bb_window() -> usize {
    20
}

fn default_bb_std_multiplier() -> f64 {
    2.0
}

fn default_model() -> String {
    signal::DEFAULT_MODEL.into()
}

#[derive(Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub market: MarketConfig,
    #[serde(default)]
    pub indicators: IndicatorsConfig,
    #[serde(default)]
    pub signal: SignalConfig,
}

#[derive(Debug, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Accepted values: `"text"` | `"json"`
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct MarketConfig {
    #[serde(default = "default_symbol")]
    pub symbol: String,
    #[serde(default = "default_period")]
    pub period: String,
    #[serde(default = "default_interval")]
    pub interval: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbol: default_symbol(),
            period: default_period(),
            interval: default_interval(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct IndicatorsConfig {
    #[serde(default = "default_rsi_window")]
    pub rsi_window: usize,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
    #[serde(default = "default_bb_window")]
    pub bb_window: usize,
    #[serde(default = "default_bb_std_multiplier")]
    pub bb_std_multiplier: f64,
}

impl Default for IndicatorsConfig {
    fn default() -> Self {
        Self {
            rsi_window: default_rsi_window(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bb_window: default_bb_window(),
            bb_std_multiplier: default_bb_std_multiplier(),
        }
    }
}

impl IndicatorsConfig {
    pub fn settings(&self) -> IndicatorSettings {
        IndicatorSettings {
            rsi_window: self.rsi_window,
            macd_fast: self.macd_fast,
            macd_slow: self.macd_slow,
            macd_signal: self.macd_signal,
            bb_window: self.bb_window,
            bb_std_multiplier: self.bb_std_multiplier,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SignalConfig {
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// Falls back to the `OPENAI_API_KEY` environment variable when unset.
    pub api_key: Option<String>,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: None,
            api_key: None,
        }
    }
}

impl SignalConfig {
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
    }
}

/// Load and validate an `AppConfig` from a TOML file at `path`.
pub fn load(path: &Path) -> Result<AppConfig, Report<ConfigError>> {
    let content = std::fs::read_to_string(path)
        .change_context(ConfigError::ReadFile)
        .attach_with(|| format!("path: {}", path.display()))?;

    let config: AppConfig = toml::from_str(&content).change_context(ConfigError::Parse {
        reason: "invalid TOML syntax or schema mismatch".into(),
    })?;

    validate(&config)?;

    Ok(config)
}

fn validate(config: &AppConfig) -> Result<(), Report<ConfigError>> {
    validate_windows(&config.indicators)?;
    validate_macd_order(&config.indicators)?;
    validate_log_format(&config.general)?;
    Ok(())
}

fn validate_windows(indicators: &IndicatorsConfig) -> Result<(), Report<ConfigError>> {
    let windows = [
        ("indicators.rsi_window", indicators.rsi_window),
        ("indicators.macd_fast", indicators.macd_fast),
        ("indicators.macd_slow", indicators.macd_slow),
        ("indicators.macd_signal", indicators.macd_signal),
        ("indicators.bb_window", indicators.bb_window),
    ];
    for (field, value) in windows {
        if value == 0 {
            return Err(Report::new(ConfigError::Validation {
                field: format!("{field} must be > 0"),
            }));
        }
    }
    if indicators.bb_std_multiplier <= 0.0 {
        return Err(Report::new(ConfigError::Validation {
            field: "indicators.bb_std_multiplier must be > 0".into(),
        }));
    }
    Ok(())
}

fn validate_macd_order(indicators: &IndicatorsConfig) -> Result<(), Report<ConfigError>> {
    if indicators.macd_fast >= indicators.macd_slow {
        return Err(Report::new(ConfigError::Validation {
            field: format!(
                "indicators.macd_fast ({}) must be < indicators.macd_slow ({})",
                indicators.macd_fast, indicators.macd_slow
            ),
        }));
    }
    Ok(())
}

fn validate_log_format(general: &GeneralConfig) -> Result<(), Report<ConfigError>> {
    match general.log_format.as_str() {
        "text" | "json" => Ok(()),
        other => Err(Report::new(ConfigError::Validation {
            field: format!("general.log_format \"{other}\" is not valid"),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> AppConfig {
        toml::from_str(toml).expect("parse failed")
    }

    #[test]
    fn valid_full_config_parses() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "json"

[market]
symbol = "GC=F"
period = "5d"
interval = "1h"

[indicators]
rsi_window = 10
macd_fast = 8
macd_slow = 21
macd_signal = 5
bb_window = 14
bb_std_multiplier = 2.5

[signal]
model = "gpt-4o"
api_key = "sk-test"
"#;
        let config = parse(toml);
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.market.period, "5d");
        assert_eq!(config.indicators.rsi_window, 10);
        assert_eq!(config.signal.resolve_api_key().as_deref(), Some("sk-test"));
    }

    #[test]
    fn defaults_applied_when_fields_omitted() {
        let config = parse("");
        assert!(validate(&config).is_ok());
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "text");
        assert_eq!(config.market.symbol, "GC=F");
        assert_eq!(config.market.period, "2d");
        assert_eq!(config.market.interval, "1h");
        assert_eq!(config.indicators.rsi_window, 14);
        assert_eq!(config.indicators.macd_fast, 12);
        assert_eq!(config.indicators.macd_slow, 26);
        assert_eq!(config.indicators.macd_signal, 9);
        assert_eq!(config.indicators.bb_window, 20);
        assert_eq!(config.signal.model, "gpt-4o");
    }

    #[test]
    fn settings_mirror_indicator_config() {
        let config = parse("[indicators]\nrsi_window = 7\n");
        let settings = config.indicators.settings();
        assert_eq!(settings.rsi_window, 7);
        assert_eq!(settings.macd_slow, 26);
    }

    #[test]
    fn macd_fast_ge_slow_rejected() {
        let config = parse("[indicators]\nmacd_fast = 30\nmacd_slow = 26\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn zero_window_rejected() {
        let config = parse("[indicators]\nrsi_window = 0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn negative_multiplier_rejected() {
        let config = parse("[indicators]\nbb_std_multiplier = -1.0\n");
        assert!(validate(&config).is_err());
    }

    #[test]
    fn unknown_log_format_rejected() {
        let config = parse("[general]\nlog_format = \"xml\"\n");
        assert!(validate(&config).is_err());
    }
}
