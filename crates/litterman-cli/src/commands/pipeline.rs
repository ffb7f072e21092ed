use std::time::Instant;

use clap::Args;
use litterman_core::black_litterman::ViewGeneratorConfig;
use litterman_core::market_data::{PriceHistoryAdapter, Resolution};
use litterman_core::{with_metadata, EngineConfig, PortfolioPipeline};
use serde_json::{json, Value};
use tracing::{info, warn};

use super::elapsed_us;
use crate::input;

/// Arguments for a full construction cycle
#[derive(Args)]
pub struct PipelineArgs {
    /// Long-format price CSV with columns date,symbol,close
    #[arg(long)]
    pub prices: String,

    /// Separate benchmark price CSV (default: read the benchmark from --prices)
    #[arg(long)]
    pub benchmark: Option<String>,

    /// Benchmark symbol (default: config benchmark_symbol)
    #[arg(long)]
    pub benchmark_symbol: Option<String>,

    /// JSON view generator config, e.g. {"kind": "momentum"} (default: config views)
    #[arg(long)]
    pub views: Option<String>,

    /// Comma-separated universe (default: every non-benchmark symbol)
    #[arg(long)]
    pub symbols: Option<String>,

    /// Evaluation date, YYYY-MM-DD (default: last date in the file)
    #[arg(long)]
    pub date: Option<String>,
}

pub fn run_pipeline(
    args: PipelineArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let mut config = config.clone();
    if let Some(symbol) = args.benchmark_symbol {
        config.benchmark_symbol = symbol;
    }
    if let Some(ref path) = args.views {
        config.views = input::file::read_json::<ViewGeneratorConfig>(path)?;
    }

    let history = input::prices::load_prices(&args.prices)?;
    let bench_history = match args.benchmark {
        Some(ref path) => input::prices::load_prices(path)?,
        None => history.clone(),
    };
    let symbols = input::prices::resolve_symbols(
        &history,
        args.symbols.as_deref(),
        Some(config.benchmark_symbol.as_str()),
    );
    let date = input::prices::resolve_date(&history, args.date.as_deref())?;

    let start = Instant::now();
    let panel = history.history(&symbols, config.lookback, Resolution::Daily, date)?;
    let benchmark = bench_history.benchmark_history(
        &config.benchmark_symbol,
        config.lookback,
        Resolution::Daily,
        date,
    )?;

    let pipeline = PortfolioPipeline::new(config.clone());
    let output = pipeline.run(&panel, &benchmark, date).map_err(|e| {
        warn!(stage = %e.stage, error = %e.source, "pipeline failed");
        e
    })?;
    info!(%date, positions = output.targets.len(), "pipeline complete");

    let mut warnings = Vec::new();
    if panel.n_observations() < config.lookback {
        warnings.push(format!(
            "Only {} aligned bars available of {} requested",
            panel.n_observations(),
            config.lookback
        ));
    }
    if let Some(fallback) = output.optimization.fallback {
        warnings.push(format!("Primary solve failed; result from {:?} retry", fallback));
    }

    let envelope = with_metadata(
        "Ledoit-Wolf covariance, market-implied risk aversion, Black-Litterman posterior, \
         regularized max-Sharpe",
        &json!({
            "date": date,
            "benchmark_symbol": config.benchmark_symbol,
            "view_generator": pipeline.view_generator().name(),
            "config": config,
        }),
        warnings,
        elapsed_us(start),
        output,
    );
    Ok(serde_json::to_value(envelope)?)
}
