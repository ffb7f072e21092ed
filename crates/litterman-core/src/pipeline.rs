//! One portfolio-construction cycle as a pure function of its inputs.
//!
//! Covers:
//! 1. **Covariance** -- shrunk, annualized Σ of the panel
//! 2. **Risk aversion** -- δ from the benchmark series
//! 3. **Prior** -- π per the configured prior kind
//! 4. **Views** -- generated on the panel's symbol order
//! 5. **Black-Litterman** -- posterior returns
//! 6. **Optimization** -- regularized max-Sharpe weights and execution targets
//!
//! Identical panels, benchmark and date always produce identical output.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::black_litterman::{BlackLittermanBlender, BlackLittermanOutput, ViewGenerator, ViewSet};
use crate::config::EngineConfig;
use crate::error::LittermanError;
use crate::estimation::{
    CovarianceEstimator, CovarianceMatrix, PriorEstimator, RiskAversion, RiskAversionEstimator,
};
use crate::market_data::{PricePanel, PriceSeries};
use crate::optimization::{OptimizationResult, PortfolioOptimizer, PortfolioTarget};
use crate::types::Symbol;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Step of an evaluation, used to label failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Fetch,
    Covariance,
    RiskAversion,
    Prior,
    Views,
    BlackLitterman,
    Optimization,
}

impl PipelineStage {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Fetch => "fetch",
            PipelineStage::Covariance => "covariance",
            PipelineStage::RiskAversion => "risk_aversion",
            PipelineStage::Prior => "prior",
            PipelineStage::Views => "views",
            PipelineStage::BlackLitterman => "black_litterman",
            PipelineStage::Optimization => "optimization",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("{stage} stage failed: {source}")]
pub struct StageError {
    pub stage: PipelineStage,
    #[source]
    pub source: LittermanError,
}

/// Tag a stage's error with the stage it came from.
pub(crate) trait AtStage<T> {
    fn at(self, stage: PipelineStage) -> Result<T, StageError>;
}

impl<T> AtStage<T> for Result<T, LittermanError> {
    fn at(self, stage: PipelineStage) -> Result<T, StageError> {
        self.map_err(|source| StageError { stage, source })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOutput {
    pub date: NaiveDate,
    pub symbols: Vec<Symbol>,
    pub covariance: CovarianceMatrix,
    pub risk_aversion: RiskAversion,
    pub views: ViewSet,
    pub black_litterman: BlackLittermanOutput,
    pub optimization: OptimizationResult,
    pub targets: Vec<PortfolioTarget>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct PortfolioPipeline {
    config: EngineConfig,
    view_generator: Box<dyn ViewGenerator>,
}

impl PortfolioPipeline {
    /// Pipeline using the view generator named in `config.views`.
    pub fn new(config: EngineConfig) -> Self {
        let view_generator = config.views.build();
        Self {
            config,
            view_generator,
        }
    }

    pub fn with_view_generator(mut self, generator: Box<dyn ViewGenerator>) -> Self {
        self.view_generator = generator;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn view_generator(&self) -> &dyn ViewGenerator {
        self.view_generator.as_ref()
    }

    pub fn run(
        &self,
        panel: &PricePanel,
        benchmark: &PriceSeries,
        date: NaiveDate,
    ) -> Result<PipelineOutput, StageError> {
        let cfg = &self.config;

        let covariance = CovarianceEstimator::new(cfg.covariance.clone(), cfg.frequency)
            .estimate(panel)
            .at(PipelineStage::Covariance)?;

        let risk_aversion =
            RiskAversionEstimator::new(cfg.risk_aversion.clone(), cfg.frequency, cfg.risk_free_rate)
                .estimate(benchmark)
                .at(PipelineStage::RiskAversion)?;

        let prior = PriorEstimator::new(
            cfg.prior,
            cfg.covariance.return_kind,
            cfg.frequency,
            cfg.risk_free_rate,
        )
        .estimate(panel, &covariance, risk_aversion.delta)
        .at(PipelineStage::Prior)?;

        let views = self
            .view_generator
            .generate(panel, date)
            .at(PipelineStage::Views)?;

        let black_litterman = BlackLittermanBlender::new(cfg.black_litterman.clone())
            .blend(&covariance, &prior, risk_aversion.delta, &views)
            .at(PipelineStage::BlackLitterman)?;

        let optimization = PortfolioOptimizer::new(cfg.optimizer.clone())
            .optimize(&black_litterman.posterior, &covariance, cfg.risk_free_rate)
            .at(PipelineStage::Optimization)?;

        let targets = optimization
            .weights
            .to_targets(cfg.optimizer.target_decimals)
            .at(PipelineStage::Optimization)?;

        info!(
            %date,
            assets = panel.n_assets(),
            views = views.len(),
            generator = self.view_generator.name(),
            sharpe = optimization.sharpe_ratio,
            "pipeline completed"
        );

        Ok(PipelineOutput {
            date,
            symbols: panel.symbols().to_vec(),
            covariance,
            risk_aversion,
            views,
            black_litterman,
            optimization,
            targets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::black_litterman::{StaticViews, View, ViewUncertainty};
    use crate::test_support::{synthetic_benchmark, synthetic_panel};
    use rust_decimal::Decimal;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    #[test]
    fn test_pipeline_produces_full_targets() {
        let panel = synthetic_panel(&["AAA", "BBB", "CCC"], 253, 42);
        let bench = synthetic_benchmark("SPY", 253, 7);
        let out = PortfolioPipeline::new(EngineConfig::default())
            .run(&panel, &bench, date())
            .unwrap();
        assert_eq!(out.symbols, panel.symbols());
        let total: Decimal = out.targets.iter().map(|t| t.weight).sum();
        assert_eq!(total, Decimal::ONE);
        assert_eq!(out.black_litterman.view_count, 0);
        assert_eq!(out.black_litterman.posterior, out.black_litterman.prior);
    }

    #[test]
    fn test_pipeline_is_idempotent() {
        let panel = synthetic_panel(&["AAA", "BBB", "CCC", "DDD"], 253, 3);
        let bench = synthetic_benchmark("SPY", 253, 9);
        let pipeline = PortfolioPipeline::new(EngineConfig::default());
        let a = pipeline.run(&panel, &bench, date()).unwrap();
        let b = pipeline.run(&panel, &bench, date()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_static_views_shift_posterior() {
        let panel = synthetic_panel(&["AAA", "BBB"], 253, 5);
        let bench = synthetic_benchmark("SPY", 253, 1);
        let pipeline = PortfolioPipeline::new(EngineConfig::default()).with_view_generator(
            Box::new(StaticViews::new(
                vec![View::Absolute {
                    symbol: "AAA".into(),
                    expected_return: 0.50,
                }],
                ViewUncertainty::Proportional,
            )),
        );
        let out = pipeline.run(&panel, &bench, date()).unwrap();
        let prior = out.black_litterman.prior.get("AAA").unwrap();
        let post = out.black_litterman.posterior.get("AAA").unwrap();
        assert!(post > prior);
    }

    #[test]
    fn test_short_history_fails_at_covariance() {
        let panel = synthetic_panel(&["AAA", "BBB"], 20, 5);
        let bench = synthetic_benchmark("SPY", 20, 1);
        let err = PortfolioPipeline::new(EngineConfig::default())
            .run(&panel, &bench, date())
            .unwrap_err();
        assert_eq!(err.stage, PipelineStage::Covariance);
        assert!(matches!(err.source, LittermanError::InsufficientData(_)));
    }
}
