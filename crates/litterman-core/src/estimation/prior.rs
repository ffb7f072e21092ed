//! Prior expected returns fed into the Black-Litterman blend.
//!
//! Covers:
//! 1. **Historical mean** -- annualized average period return of each asset
//! 2. **Equilibrium** -- reverse optimization π = δΣw + r_f from market weights

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use crate::error::LittermanError;
use crate::market_data::{PricePanel, ReturnKind};
use crate::types::{matrix_serde, Rate, Symbol};
use crate::LittermanResult;

use super::covariance::CovarianceMatrix;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorKind {
    /// Annualized mean of each asset's own returns over the lookback.
    #[default]
    HistoricalMean,
    /// Market-implied returns assuming an equal-weight market portfolio.
    EquilibriumEqualWeight,
}

/// Expected annual returns in a fixed symbol order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedReturns {
    pub symbols: Vec<Symbol>,
    #[serde(with = "matrix_serde::vector")]
    pub values: DVector<f64>,
}

impl ExpectedReturns {
    pub fn new(symbols: Vec<Symbol>, values: DVector<f64>) -> LittermanResult<Self> {
        if symbols.len() != values.len() {
            return Err(LittermanError::Alignment(format!(
                "{} symbols but {} expected returns",
                symbols.len(),
                values.len()
            )));
        }
        Ok(Self { symbols, values })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Symbol, f64)> {
        self.symbols.iter().zip(self.values.iter().copied())
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PriorEstimator {
    kind: PriorKind,
    return_kind: ReturnKind,
    frequency: f64,
    risk_free_rate: Rate,
}

impl PriorEstimator {
    pub fn new(kind: PriorKind, return_kind: ReturnKind, frequency: f64, risk_free_rate: Rate) -> Self {
        Self {
            kind,
            return_kind,
            frequency,
            risk_free_rate,
        }
    }

    pub fn estimate(
        &self,
        panel: &PricePanel,
        cov: &CovarianceMatrix,
        delta: f64,
    ) -> LittermanResult<ExpectedReturns> {
        if panel.symbols() != cov.symbols.as_slice() {
            return Err(LittermanError::Alignment(
                "Price panel and covariance symbol orders differ".into(),
            ));
        }
        let values = match self.kind {
            PriorKind::HistoricalMean => {
                let returns = panel.returns(self.return_kind);
                if returns.nrows() == 0 {
                    return Err(LittermanError::InsufficientData(
                        "Historical mean prior needs at least one return observation".into(),
                    ));
                }
                returns.row_mean().transpose() * self.frequency
            }
            PriorKind::EquilibriumEqualWeight => {
                let n = cov.n_assets();
                let w = DVector::from_element(n, 1.0 / n as f64);
                market_implied_prior_returns(&w, delta, cov, self.risk_free_rate)?
            }
        };
        ExpectedReturns::new(panel.symbols().to_vec(), values)
    }
}

/// Reverse-optimized equilibrium returns π = δΣw + r_f.
pub fn market_implied_prior_returns(
    market_weights: &DVector<f64>,
    delta: f64,
    cov: &CovarianceMatrix,
    risk_free_rate: Rate,
) -> LittermanResult<DVector<f64>> {
    if market_weights.len() != cov.n_assets() {
        return Err(LittermanError::Alignment(format!(
            "{} market weights for {} assets",
            market_weights.len(),
            cov.n_assets()
        )));
    }
    if !delta.is_finite() {
        return Err(LittermanError::InvalidInput {
            field: "risk_aversion".into(),
            reason: "Must be finite".into(),
        });
    }
    Ok((&cov.matrix * market_weights) * delta + DVector::from_element(cov.n_assets(), risk_free_rate))
}
