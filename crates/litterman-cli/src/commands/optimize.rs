use std::time::Instant;

use clap::Args;
use litterman_core::estimation::{CovarianceMatrix, ExpectedReturns};
use litterman_core::optimization::{
    OptimizationResult, OptimizerConfig, PortfolioOptimizer, PortfolioTarget, WeightBounds,
};
use litterman_core::{with_metadata, EngineConfig, Rate, Symbol};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::info;

use super::elapsed_us;
use crate::input;

/// Arguments for max-Sharpe optimization
#[derive(Args)]
pub struct OptimizeArgs {
    /// Path to JSON input file (symbols, expected_returns, covariance)
    #[arg(long)]
    pub input: Option<String>,

    /// L2 regularization strength (default: config optimizer.gamma)
    #[arg(long)]
    pub gamma: Option<f64>,

    /// Lower weight bound per asset
    #[arg(long, allow_hyphen_values = true)]
    pub lower: Option<f64>,

    /// Upper weight bound per asset
    #[arg(long)]
    pub upper: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OptimizeRequest {
    symbols: Vec<Symbol>,
    expected_returns: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    #[serde(default)]
    risk_free_rate: Option<Rate>,
}

#[derive(Debug, Serialize)]
struct OptimizeOutput {
    #[serde(flatten)]
    optimization: OptimizationResult,
    targets: Vec<PortfolioTarget>,
}

pub fn run_optimize(
    args: OptimizeArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let request: OptimizeRequest = input::read_request(args.input.as_deref())?;

    let start = Instant::now();
    let rf = request.risk_free_rate.unwrap_or(config.risk_free_rate);
    let expected = ExpectedReturns::new(
        request.symbols.clone(),
        DVector::from_vec(request.expected_returns),
    )?;
    let cov = CovarianceMatrix::from_rows(request.symbols, &request.covariance)?;

    let opt_config = OptimizerConfig {
        gamma: args.gamma.unwrap_or(config.optimizer.gamma),
        bounds: WeightBounds {
            lower: args.lower.unwrap_or(config.optimizer.bounds.lower),
            upper: args.upper.unwrap_or(config.optimizer.bounds.upper),
        },
        ..config.optimizer.clone()
    };
    let optimization = PortfolioOptimizer::new(opt_config.clone()).optimize(&expected, &cov, rf)?;
    let targets = optimization.weights.to_targets(opt_config.target_decimals)?;
    info!(
        sharpe = optimization.sharpe_ratio,
        positions = targets.len(),
        "portfolio optimized"
    );

    let mut warnings = Vec::new();
    if let Some(fallback) = optimization.fallback {
        warnings.push(format!("Primary solve failed; result from {:?} retry", fallback));
    }

    let output = with_metadata(
        "Max-Sharpe with L2 penalty via homogenized QP (y = kw), solved by ADMM",
        &json!({
            "optimizer": opt_config,
            "risk_free_rate": rf,
        }),
        warnings,
        elapsed_us(start),
        OptimizeOutput {
            optimization,
            targets,
        },
    );
    Ok(serde_json::to_value(output)?)
}
