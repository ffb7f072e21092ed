//! Platform-facing evaluation entry point.
//!
//! Each evaluation: settle the scheduler, ask the recompute policy, fetch
//! prices, run the pipeline, stage the targets, then let the scheduler
//! decide whether to apply them. Nothing escapes `on_evaluation`; every
//! failure is logged and summarized in the returned report.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::black_litterman::ViewGenerator;
use crate::config::EngineConfig;
use crate::market_data::{PriceHistoryAdapter, Resolution};
use crate::optimization::{PortfolioTarget, WeightVector};
use crate::pipeline::{AtStage, PipelineOutput, PipelineStage, PortfolioPipeline, StageError};
use crate::scheduling::{ExecutionSink, RebalanceScheduler, RebalanceState};
use crate::types::Symbol;
use crate::LittermanResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What gets staged when optimization fails after its own retry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Leave positions and pending targets untouched.
    #[default]
    Skip,
    /// 1/n across the active symbols.
    EqualWeight,
    /// The most recently applied targets, if any.
    PreviousWeights,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationTrigger {
    pub date: NaiveDate,
    pub active_symbols: Vec<Symbol>,
    pub invested: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationFailure {
    pub stage: PipelineStage,
    pub kind: String,
    pub message: String,
}

impl From<&StageError> for EvaluationFailure {
    fn from(e: &StageError) -> Self {
        Self {
            stage: e.stage,
            kind: e.source.kind().to_string(),
            message: e.source.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub date: NaiveDate,
    /// Whether the pipeline ran this evaluation.
    pub recomputed: bool,
    /// Whether new targets entered the pending buffer.
    pub staged: bool,
    pub fallback: Option<FallbackPolicy>,
    pub failure: Option<EvaluationFailure>,
    pub applied: Option<Vec<PortfolioTarget>>,
    pub state: RebalanceState,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct PortfolioConstructionEngine {
    pipeline: PortfolioPipeline,
    scheduler: RebalanceScheduler,
    last_output: Option<PipelineOutput>,
}

impl PortfolioConstructionEngine {
    pub fn new(config: EngineConfig) -> LittermanResult<Self> {
        config.validate()?;
        let scheduler = RebalanceScheduler::new(config.schedule.clone());
        Ok(Self {
            pipeline: PortfolioPipeline::new(config),
            scheduler,
            last_output: None,
        })
    }

    pub fn with_view_generator(mut self, generator: Box<dyn ViewGenerator>) -> Self {
        self.pipeline = self.pipeline.with_view_generator(generator);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        self.pipeline.config()
    }

    pub fn scheduler(&self) -> &RebalanceScheduler {
        &self.scheduler
    }

    /// Output of the most recent successful pipeline run.
    pub fn last_output(&self) -> Option<&PipelineOutput> {
        self.last_output.as_ref()
    }

    pub fn on_evaluation(
        &mut self,
        trigger: &EvaluationTrigger,
        adapter: &dyn PriceHistoryAdapter,
        sink: &mut dyn ExecutionSink,
    ) -> EvaluationReport {
        let date = trigger.date;
        self.scheduler.begin_evaluation(date, trigger.invested);

        let mut report = EvaluationReport {
            date,
            recomputed: false,
            staged: false,
            fallback: None,
            failure: None,
            applied: None,
            state: self.scheduler.state(),
        };

        let recompute = self.scheduler.should_recompute(date, trigger.invested);
        if recompute && trigger.active_symbols.is_empty() {
            warn!(%date, "no active symbols; skipping recompute");
        } else if recompute {
            report.recomputed = true;
            match self.compute(trigger, adapter) {
                Ok(output) => {
                    report.staged = self.scheduler.stage(output.targets.clone());
                    self.last_output = Some(output);
                }
                Err(e) => {
                    warn!(
                        %date,
                        symbols = ?trigger.active_symbols,
                        stage = %e.stage,
                        kind = e.source.kind(),
                        error = %e.source,
                        "evaluation failed"
                    );
                    report.failure = Some(EvaluationFailure::from(&e));
                    if e.stage == PipelineStage::Optimization {
                        self.apply_fallback(trigger, &mut report);
                    }
                }
            }
        }

        report.applied = self.scheduler.check_rebalance(date, sink);
        report.state = self.scheduler.state();
        report
    }

    fn compute(
        &self,
        trigger: &EvaluationTrigger,
        adapter: &dyn PriceHistoryAdapter,
    ) -> Result<PipelineOutput, StageError> {
        let cfg = self.pipeline.config();
        let panel = adapter
            .history(&trigger.active_symbols, cfg.lookback, Resolution::Daily, trigger.date)
            .at(PipelineStage::Fetch)?;
        let benchmark = adapter
            .benchmark_history(&cfg.benchmark_symbol, cfg.lookback, Resolution::Daily, trigger.date)
            .at(PipelineStage::Fetch)?;
        self.pipeline.run(&panel, &benchmark, trigger.date)
    }

    fn apply_fallback(&mut self, trigger: &EvaluationTrigger, report: &mut EvaluationReport) {
        let policy = self.pipeline.config().fallback;
        let decimals = self.pipeline.config().optimizer.target_decimals;
        let targets = match policy {
            FallbackPolicy::Skip => None,
            FallbackPolicy::EqualWeight => {
                WeightVector::equal_weight(&trigger.active_symbols)
                    .to_targets(decimals)
                    .ok()
            }
            FallbackPolicy::PreviousWeights => {
                self.scheduler.last_applied().map(|a| a.targets.clone())
            }
        };

        if let Some(targets) = targets {
            if self.scheduler.stage(targets) {
                info!(date = %trigger.date, ?policy, "fallback targets staged");
                report.staged = true;
                report.fallback = Some(policy);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
