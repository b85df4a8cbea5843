use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum FeedError {
    #[display("no timestamp column found in feed")]
    NoTimestampColumn,
    #[display("missing required columns: {columns}")]
    MissingColumns { columns: String },
    #[display("failed to parse timestamp value \"{value}\"")]
    TimestampParse { value: String },
}

/// Short series are not indicator errors; they surface as missing values.
/// Only parameter validation can fail here.
#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum ProviderError {
    #[display("request to {provider} failed")]
    Request { provider: String },
    #[display("failed to parse response from {provider}")]
    ResponseParse { provider: String },
    #[display("{provider} returned no data")]
    NoData { provider: String },
}

#[derive(Debug, Display, Error)]
pub enum SignalError {
    #[display("signal service request failed")]
    Request,
    #[display("signal service reply is not valid JSON")]
    ReplyParse,
}
