use std::time::Instant;

use clap::Args;
use litterman_core::black_litterman::{
    BlackLittermanBlender, BlackLittermanConfig, View, ViewSet, ViewUncertainty,
};
use litterman_core::estimation::{market_implied_prior_returns, CovarianceMatrix, ExpectedReturns};
use litterman_core::{with_metadata, EngineConfig, Rate, Symbol};
use nalgebra::DVector;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::elapsed_us;
use crate::input;

/// Arguments for Black-Litterman blending
#[derive(Args)]
pub struct BlackLittermanArgs {
    /// Path to JSON input file (symbols, covariance, prior or market_weights, views)
    #[arg(long)]
    pub input: Option<String>,

    /// Override tau from the config
    #[arg(long)]
    pub tau: Option<f64>,
}

/// Blending request. Either `prior` or `market_weights` must be given;
/// market weights are reverse-optimized into equilibrium returns.
#[derive(Debug, Deserialize)]
struct BlackLittermanRequest {
    symbols: Vec<Symbol>,
    covariance: Vec<Vec<f64>>,
    risk_aversion: f64,
    #[serde(default)]
    prior: Option<Vec<f64>>,
    #[serde(default)]
    market_weights: Option<Vec<f64>>,
    #[serde(default)]
    risk_free_rate: Option<Rate>,
    #[serde(default)]
    views: Vec<View>,
    #[serde(default)]
    uncertainty: ViewUncertainty,
}

pub fn run_black_litterman(
    args: BlackLittermanArgs,
    config: &EngineConfig,
) -> Result<Value, Box<dyn std::error::Error>> {
    let request: BlackLittermanRequest = input::read_request(args.input.as_deref())?;

    let start = Instant::now();
    let rf = request.risk_free_rate.unwrap_or(config.risk_free_rate);
    let cov = CovarianceMatrix::from_rows(request.symbols.clone(), &request.covariance)?;

    let mut warnings: Vec<String> = Vec::new();
    let prior_values = match (request.prior, request.market_weights) {
        (Some(prior), weights) => {
            if weights.is_some() {
                warnings.push("Both prior and market_weights given; market_weights ignored".into());
            }
            DVector::from_vec(prior)
        }
        (None, Some(weights)) => {
            market_implied_prior_returns(&DVector::from_vec(weights), request.risk_aversion, &cov, rf)?
        }
        (None, None) => return Err("Either prior or market_weights is required".into()),
    };
    let prior = ExpectedReturns::new(request.symbols.clone(), prior_values)?;
    let views = ViewSet::from_views(&request.symbols, &request.views, request.uncertainty)?;
    if views.is_empty() {
        warnings.push("No views supplied; posterior equals the prior".into());
    }

    let bl_config = BlackLittermanConfig {
        tau: args.tau.unwrap_or(config.black_litterman.tau),
        ..config.black_litterman.clone()
    };
    let result = BlackLittermanBlender::new(bl_config.clone()).blend(
        &cov,
        &prior,
        request.risk_aversion,
        &views,
    )?;
    if result.ridge > 0.0 {
        warnings.push(format!("Singular system; ridge {:.3e} added to covariance", result.ridge));
    }
    info!(views = result.view_count, tau = result.tau, "posterior computed");

    let output = with_metadata(
        "Black-Litterman posterior: [(tS)^-1 + P'O^-1 P]^-1 [(tS)^-1 pi + P'O^-1 Q]",
        &json!({
            "black_litterman": bl_config,
            "risk_aversion": request.risk_aversion,
            "risk_free_rate": rf,
        }),
        warnings,
        elapsed_us(start),
        result,
    );
    Ok(serde_json::to_value(output)?)
}
