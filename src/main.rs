mod analysis;
mod config;
mod error;
mod feed;
mod indicator;
mod levels;
mod model;
mod provider;
mod signal;

use std::path::Path;

use clap::Parser;
use derive_more::{Display, Error};
use error_stack::{Report, ResultExt};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use model::{IndicatorBundle, SignalKind, TradeSignal};
use provider::{MarketProvider, YahooProvider};
use signal::{MarketSummary, OpenAiService, generate_trade_signal};

#[derive(Debug, Display, Error)]
pub enum AppError {
    #[display("configuration error")]
    Config,
    #[display("analysis error")]
    Analysis,
}

#[derive(Parser)]
#[command(name = "xau-signal", about = "XAUUSD technical analysis and trading signal agent")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Request an AI trading recommendation after analysis
    #[arg(long)]
    signal: bool,
}

#[tokio::main]
async fn main() {
    if let Err(report) = run().await {
        eprintln!("{report:?}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Report<AppError>> {
    let cli = Cli::parse();
    let config = load_config(Path::new(&cli.config))?;

    init_tracing(&config);

    let provider = YahooProvider::new();
    let market = &config.market;

    let raw = match provider
        .fetch(&market.symbol, &market.period, &market.interval)
        .await
    {
        Ok(raw) => raw,
        Err(e) => {
            warn!(provider = provider.name(), error = ?e, "market data fetch failed");
            println!("No market data available. Please check your connection and try again.");
            return Ok(());
        }
    };

    let series = feed::normalize(raw).into_series();
    if series.is_empty() {
        println!("No market data available. Please check your connection and try again.");
        return Ok(());
    }

    let bundle = analysis::analyze(series, &config.indicators.settings())
        .change_context(AppError::Analysis)?;

    let current_price = match provider.current_price(&market.symbol).await {
        Ok(price) => Some(price),
        Err(e) => {
            warn!(error = ?e, "current price fetch failed");
            None
        }
    };

    print_report(&market.symbol, &bundle, current_price);

    if cli.signal {
        let Some(api_key) = config.signal.resolve_api_key() else {
            println!("No API key configured; set signal.api_key or OPENAI_API_KEY to generate signals.");
            return Ok(());
        };
        let service = OpenAiService::new(
            api_key,
            config.signal.model.clone(),
            config.signal.base_url.clone(),
        );
        info!(model = %config.signal.model, "requesting trading recommendation");
        let trade_signal = generate_trade_signal(&service, &bundle).await;
        print_signal(&trade_signal);
    }

    Ok(())
}

fn load_config(path: &Path) -> Result<AppConfig, Report<AppError>> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    config::load(path).change_context(AppError::Config)
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::new(&config.general.log_level);
    match config.general.log_format.as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
        }
    }
}

fn print_report(symbol: &str, bundle: &IndicatorBundle, current_price: Option<f64>) {
    let Some(summary) = MarketSummary::from_bundle(bundle) else {
        println!("No market data available. Please check your connection and try again.");
        return;
    };

    println!("== {symbol} ==");
    match current_price {
        Some(price) => println!("Price: ${price:.2} ({:+.2}%)", summary.price_change_pct),
        None => println!("Price: ${:.2} ({:+.2}%)", summary.current_price, summary.price_change_pct),
    }
    match summary.rsi {
        Some(rsi) => println!("RSI: {rsi:.2} ({})", summary.rsi_state),
        None => println!("RSI: n/a"),
    }
    if let (Some(macd), Some(macd_signal)) = (summary.macd, summary.macd_signal) {
        println!(
            "MACD: {macd:.2} (Signal: {macd_signal:.2}, Trend: {})",
            summary.macd_trend
        );
    }
    if let (Some(upper), Some(lower)) = (summary.bb_upper, summary.bb_lower) {
        println!(
            "Bollinger: price near the {} (Upper: ${upper:.2}, Lower: ${lower:.2})",
            summary.bb_position
        );
    }

    // Sorting is a presentation concern; the detector makes no order promise
    print_levels("Support", &bundle.levels.support);
    print_levels("Resistance", &bundle.levels.resistance);
}

fn print_levels(label: &str, levels: &[f64]) {
    if levels.is_empty() {
        println!("{label}: no significant levels identified");
        return;
    }
    let mut sorted = levels.to_vec();
    sorted.sort_by(f64::total_cmp);
    let formatted: Vec<String> = sorted.iter().map(|l| format!("${l:.2}")).collect();
    println!("{label}: {}", formatted.join(", "));
}

fn print_signal(trade_signal: &TradeSignal) {
    if trade_signal.signal == SignalKind::Error {
        println!("Signal generation failed: {}", trade_signal.rationale);
        return;
    }

    println!(
        "Signal: {} (Confidence: {})",
        trade_signal.signal, trade_signal.confidence
    );
    println!("Entry: ${:.2}", trade_signal.entry_price);
    println!("Stop Loss: ${:.2}", trade_signal.stop_loss);
    println!("Take Profit: ${:.2}", trade_signal.take_profit);
    println!("Rationale: {}", trade_signal.rationale);
    println!("Risk Factors: {}", trade_signal.risk_factors);
}
