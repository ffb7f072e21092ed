//! Engine configuration surface.
//!
//! Every field carries a default so a partial JSON/YAML document (or none
//! at all) yields a usable engine. `validate` rejects values that would
//! make a stage meaningless before any data is fetched.

use serde::{Deserialize, Serialize};

use crate::black_litterman::{BlackLittermanConfig, ViewGeneratorConfig};
use crate::engine::FallbackPolicy;
use crate::error::LittermanError;
use crate::estimation::{CovarianceConfig, PriorKind, RiskAversionConfig};
use crate::optimization::OptimizerConfig;
use crate::scheduling::ScheduleConfig;
use crate::types::{Rate, Symbol};
use crate::universe::UniverseConfig;
use crate::LittermanResult;

/// Trading days per year used to annualize daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Top-level configuration for one portfolio-construction engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of daily bars requested from the price adapter.
    pub lookback: usize,
    /// Periods per year used to annualize returns and variances.
    pub frequency: f64,
    /// Annual risk-free rate shared by risk aversion and Sharpe ratio.
    pub risk_free_rate: Rate,
    /// Market proxy for the risk-aversion estimate.
    pub benchmark_symbol: Symbol,
    pub covariance: CovarianceConfig,
    pub risk_aversion: RiskAversionConfig,
    pub prior: PriorKind,
    pub black_litterman: BlackLittermanConfig,
    /// View generator used by every cycle.
    pub views: ViewGeneratorConfig,
    pub optimizer: OptimizerConfig,
    pub schedule: ScheduleConfig,
    pub universe: UniverseConfig,
    /// What to hand the scheduler when the optimizer gives up.
    pub fallback: FallbackPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lookback: 252,
            frequency: TRADING_DAYS_PER_YEAR,
            risk_free_rate: 0.0,
            benchmark_symbol: "SPY".to_string(),
            covariance: CovarianceConfig::default(),
            risk_aversion: RiskAversionConfig::default(),
            prior: PriorKind::default(),
            black_litterman: BlackLittermanConfig::default(),
            views: ViewGeneratorConfig::default(),
            optimizer: OptimizerConfig::default(),
            schedule: ScheduleConfig::default(),
            universe: UniverseConfig::default(),
            fallback: FallbackPolicy::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document, filling omitted fields with defaults.
    pub fn from_json(json: &str) -> LittermanResult<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> LittermanResult<()> {
        if self.lookback < 2 {
            return Err(invalid(
                "lookback",
                format!("At least 2 bars required, got {}", self.lookback),
            ));
        }
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(invalid(
                "frequency",
                format!("Must be positive, got {}", self.frequency),
            ));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(invalid("risk_free_rate", "Must be finite".into()));
        }
        if self.benchmark_symbol.trim().is_empty() {
            return Err(invalid("benchmark_symbol", "Must not be empty".into()));
        }
        if self.covariance.min_observations < 2 {
            return Err(invalid(
                "covariance.min_observations",
                format!(
                    "At least 2 observations required, got {}",
                    self.covariance.min_observations
                ),
            ));
        }
        if !(self.black_litterman.tau.is_finite() && self.black_litterman.tau > 0.0) {
            return Err(invalid(
                "black_litterman.tau",
                format!("Must be positive, got {}", self.black_litterman.tau),
            ));
        }
        if !self.black_litterman.ridge_epsilon.is_finite() || self.black_litterman.ridge_epsilon < 0.0 {
            return Err(invalid(
                "black_litterman.ridge_epsilon",
                format!(
                    "Must be non-negative, got {}",
                    self.black_litterman.ridge_epsilon
                ),
            ));
        }
        self.optimizer.validate()?;
        self.schedule.validate()?;
        if self.universe.size == 0 {
            return Err(invalid("universe.size", "Must select at least one symbol".into()));
        }
        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> LittermanError {
    LittermanError::InvalidInput {
        field: field.into(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimation::ShrinkageTarget;
    use crate::scheduling::RecomputePolicy;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_match_reference_strategy() {
        let c = EngineConfig::default();
        assert_eq!(c.lookback, 252);
        assert_eq!(c.universe.size, 10);
        assert_eq!(
            c.schedule.rebalance_months.iter().copied().collect::<Vec<_>>(),
            vec![1, 4, 7, 10]
        );
        assert_eq!(c.risk_free_rate, 0.0);
        assert_eq!(c.optimizer.gamma, 1.0);
        assert_eq!(c.optimizer.weight_cutoff, 1e-4);
        assert_eq!(c.covariance.shrinkage_target, ShrinkageTarget::ConstantVariance);
        assert_eq!(c.schedule.recompute_policy, RecomputePolicy::WhenUninvested);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let c = EngineConfig::from_json(
            r#"{ "lookback": 126, "schedule": { "rebalance_months": [3, 6, 9, 12] } }"#,
        )
        .unwrap();
        assert_eq!(c.lookback, 126);
        assert_eq!(c.benchmark_symbol, "SPY");
        assert!(c.schedule.rebalance_months.contains(&12));
        assert!(!c.schedule.rebalance_months.contains(&1));
    }

    #[test]
    fn test_rejects_out_of_range_month() {
        let err = EngineConfig::from_json(r#"{ "schedule": { "rebalance_months": [13] } }"#)
            .unwrap_err();
        assert!(matches!(err, LittermanError::InvalidInput { .. }));
    }

    #[test]
    fn test_rejects_non_positive_tau() {
        let mut c = EngineConfig::default();
        c.black_litterman.tau = 0.0;
        assert!(c.validate().is_err());
    }
}
