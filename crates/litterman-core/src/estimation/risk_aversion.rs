//! Market-implied risk aversion from a benchmark price series.
//!
//! δ = (E[R_m] − r_f) / Var[R_m], both moments annualized by the same
//! frequency. Higher δ means the market demands more excess return per
//! unit of variance.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::error::LittermanError;
use crate::market_data::{PriceSeries, ReturnKind};
use crate::types::Rate;
use crate::LittermanResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskAversionConfig {
    pub return_kind: ReturnKind,
}

impl Default for RiskAversionConfig {
    fn default() -> Self {
        Self {
            return_kind: ReturnKind::Simple,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAversion {
    /// Risk-aversion coefficient δ.
    pub delta: f64,
    pub annual_return: f64,
    pub annual_variance: f64,
    pub risk_free_rate: Rate,
    pub observations: usize,
}

#[derive(Debug, Clone)]
pub struct RiskAversionEstimator {
    config: RiskAversionConfig,
    frequency: f64,
    risk_free_rate: Rate,
}

impl RiskAversionEstimator {
    pub fn new(config: RiskAversionConfig, frequency: f64, risk_free_rate: Rate) -> Self {
        Self {
            config,
            frequency,
            risk_free_rate,
        }
    }

    pub fn estimate(&self, benchmark: &PriceSeries) -> LittermanResult<RiskAversion> {
        let returns = benchmark.returns(self.config.return_kind);
        let delta = market_implied_risk_aversion(&returns, self.frequency, self.risk_free_rate)
            .map_err(|e| match e {
                LittermanError::InsufficientData(reason) => LittermanError::InsufficientData(
                    format!("Benchmark {}: {}", benchmark.symbol, reason),
                ),
                other => other,
            })?;

        let annual_return = returns.iter().mean() * self.frequency;
        let annual_variance = returns.iter().variance() * self.frequency;
        debug!(
            benchmark = %benchmark.symbol,
            delta,
            annual_return,
            annual_variance,
            "risk aversion estimated"
        );

        Ok(RiskAversion {
            delta,
            annual_return,
            annual_variance,
            risk_free_rate: self.risk_free_rate,
            observations: returns.len(),
        })
    }
}

/// δ from already-computed period returns.
///
/// Uses the sample (n − 1) variance. Needs at least two returns; a flat
/// benchmark has zero variance and no defined δ.
pub fn market_implied_risk_aversion(
    returns: &[f64],
    frequency: f64,
    risk_free_rate: Rate,
) -> LittermanResult<f64> {
    if returns.len() < 2 {
        return Err(LittermanError::InsufficientData(format!(
            "Risk aversion needs at least 2 return observations, got {}",
            returns.len()
        )));
    }
    if returns.iter().any(|r| !r.is_finite()) {
        return Err(LittermanError::InvalidInput {
            field: "benchmark".into(),
            reason: "Returns contain non-finite values".into(),
        });
    }

    let annual_return = returns.iter().mean() * frequency;
    let annual_variance = returns.iter().variance() * frequency;
    if annual_variance <= 0.0 {
        return Err(LittermanError::InvalidInput {
            field: "benchmark".into(),
            reason: "Benchmark return variance is zero; risk aversion undefined".into(),
        });
    }

    Ok((annual_return - risk_free_rate) / annual_variance)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;

    fn series(closes: &[f64]) -> PriceSeries {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        PriceSeries::new(
            "SPY",
            closes
                .iter()
                .enumerate()
                .map(|(i, p)| (start + chrono::Days::new(i as u64), *p))
                .collect(),
        )
    }

    #[test]
    fn test_hand_computed_delta() {
        // Returns +10%, -10%, +10%: mean 1/30, sample variance 1/75
        let s = series(&[100.0, 110.0, 99.0, 108.9]);
        let est = RiskAversionEstimator::new(RiskAversionConfig::default(), 252.0, 0.02);
        let ra = est.estimate(&s).unwrap();
        let expected = (252.0 / 30.0 - 0.02) / (252.0 / 75.0);
        assert_abs_diff_eq!(ra.delta, expected, epsilon = 1e-9);
        assert_eq!(ra.observations, 3);
    }

    #[test]
    fn test_frequency_cancels_without_risk_free() {
        let s = series(&[100.0, 110.0, 99.0, 108.9]);
        let daily = RiskAversionEstimator::new(RiskAversionConfig::default(), 1.0, 0.0)
            .estimate(&s)
            .unwrap();
        let annual = RiskAversionEstimator::new(RiskAversionConfig::default(), 252.0, 0.0)
            .estimate(&s)
            .unwrap();
        assert_abs_diff_eq!(daily.delta, 2.5, epsilon = 1e-9);
        assert_abs_diff_eq!(annual.delta, 2.5, epsilon = 1e-9);
    }

    #[test]
    fn test_two_prices_is_insufficient() {
        let s = series(&[100.0, 101.0]);
        let err = RiskAversionEstimator::new(RiskAversionConfig::default(), 252.0, 0.0)
            .estimate(&s)
            .unwrap_err();
        assert!(matches!(err, LittermanError::InsufficientData(_)));
    }

    #[test]
    fn test_flat_benchmark_is_invalid() {
        let err = market_implied_risk_aversion(&[0.0, 0.0, 0.0], 252.0, 0.0).unwrap_err();
        assert!(matches!(err, LittermanError::InvalidInput { .. }));
    }
}
