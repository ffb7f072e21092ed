use std::time::Instant;

use clap::Args;
use litterman_core::estimation::{CovarianceEstimator, RiskAversionEstimator};
use litterman_core::market_data::{PriceHistoryAdapter, Resolution};
use litterman_core::{with_metadata, EngineConfig};
use serde_json::{json, Value};
use tracing::info;

use super::elapsed_us;
use crate::input;

/// Arguments for covariance estimation
#[derive(Args)]
pub struct CovarianceArgs {
    /// Long-format price CSV with columns date,symbol,close
    #[arg(long)]
    pub prices: String,

    /// Comma-separated symbols (default: every symbol in the file)
    #[arg(long)]
    pub symbols: Option<String>,

    /// Last date of the window, YYYY-MM-DD (default: last date in the file)
    #[arg(long)]
    pub end: Option<String>,

    /// Bars in the window (default: config lookback)
    #[arg(long)]
    pub lookback: Option<usize>,
}

/// Arguments for market risk-aversion estimation
#[derive(Args)]
pub struct RiskAversionArgs {
    /// Long-format price CSV with columns date,symbol,close
    #[arg(long)]
    pub prices: String,

    /// Benchmark symbol (default: config benchmark_symbol)
    #[arg(long)]
    pub symbol: Option<String>,

    /// Last date of the window, YYYY-MM-DD (default: last date in the file)
    #[arg(long)]
    pub end: Option<String>,

    /// Bars in the window (default: config lookback)
    #[arg(long)]
    pub lookback: Option<usize>,
}

pub fn run_covariance(
    args: CovarianceArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let history = input::prices::load_prices(&args.prices)?;
    let symbols = input::prices::resolve_symbols(&history, args.symbols.as_deref(), None);
    let end = input::prices::resolve_date(&history, args.end.as_deref())?;
    let lookback = args.lookback.unwrap_or(config.lookback);

    let start = Instant::now();
    let panel = history.history(&symbols, lookback, Resolution::Daily, end)?;
    let covariance = CovarianceEstimator::new(config.covariance.clone(), config.frequency)
        .estimate(&panel)?;
    info!(assets = covariance.n_assets(), observations = covariance.observations, "covariance estimated");

    let mut warnings = Vec::new();
    if panel.n_observations() < lookback {
        warnings.push(format!(
            "Only {} aligned bars available of {} requested",
            panel.n_observations(),
            lookback
        ));
    }
    if covariance.shrinkage_intensity > 0.9 {
        warnings.push(format!(
            "Shrinkage intensity {:.3} is close to 1; the sample carries little information",
            covariance.shrinkage_intensity
        ));
    }

    let output = with_metadata(
        "Ledoit-Wolf shrinkage covariance, annualized",
        &json!({
            "end": end,
            "lookback": lookback,
            "frequency": config.frequency,
            "covariance": config.covariance,
        }),
        warnings,
        elapsed_us(start),
        covariance,
    );
    Ok(serde_json::to_value(output)?)
}

pub fn run_risk_aversion(
    args: RiskAversionArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let history = input::prices::load_prices(&args.prices)?;
    let symbol = args.symbol.unwrap_or_else(|| config.benchmark_symbol.clone());
    let end = input::prices::resolve_date(&history, args.end.as_deref())?;
    let lookback = args.lookback.unwrap_or(config.lookback);

    let start = Instant::now();
    let series = history.benchmark_history(&symbol, lookback, Resolution::Daily, end)?;
    let estimate = RiskAversionEstimator::new(
        config.risk_aversion.clone(),
        config.frequency,
        config.risk_free_rate,
    )
    .estimate(&series)?;
    info!(%symbol, delta = estimate.delta, "risk aversion estimated");

    let mut warnings = Vec::new();
    if estimate.delta <= 0.0 {
        warnings.push(format!(
            "Benchmark excess return is not positive; delta = {:.4}",
            estimate.delta
        ));
    }

    let output = with_metadata(
        "Market-implied risk aversion: (annual return - rf) / annual variance",
        &json!({
            "symbol": symbol,
            "end": end,
            "lookback": lookback,
            "frequency": config.frequency,
            "risk_free_rate": config.risk_free_rate,
        }),
        warnings,
        elapsed_us(start),
        estimate,
    );
    Ok(serde_json::to_value(output)?)
}
