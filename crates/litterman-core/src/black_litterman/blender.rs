//! Black-Litterman posterior returns.
//!
//! Covers:
//! 1. **Posterior mean** -- μ = π + τΣPᵀ(PτΣPᵀ + Ω)⁻¹(Q − Pπ)
//! 2. **Posterior covariance** -- Σ + τΣ − τΣPᵀ(PτΣPᵀ + Ω)⁻¹PτΣ
//! 3. **Implied weights** -- (δΣ)⁻¹μ scaled to sum to one
//! 4. **Ridge retry** -- one retry with Σ + ε·mean(diag Σ)·I when the view system is singular
//!
//! Only the k x k view system is inverted, so Ω = 0 (views held with full
//! confidence) and a singular Σ are both admissible.
//!
//! With no views the posterior mean is the prior and the posterior
//! covariance is (1 + τ)Σ; no inversion is attempted.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LittermanError;
use crate::estimation::{CovarianceMatrix, ExpectedReturns};
use crate::linalg;
use crate::optimization::WeightVector;
use crate::types::matrix_serde;
use crate::LittermanResult;

use super::views::ViewSet;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackLittermanConfig {
    /// Scalar on the prior's uncertainty.
    pub tau: f64,
    /// Ridge added to Σ, relative to its mean variance, on a singular retry.
    pub ridge_epsilon: f64,
}

impl Default for BlackLittermanConfig {
    fn default() -> Self {
        Self {
            tau: 0.05,
            ridge_epsilon: 1e-6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlackLittermanOutput {
    pub posterior: ExpectedReturns,
    pub prior: ExpectedReturns,
    #[serde(with = "matrix_serde")]
    pub posterior_covariance: DMatrix<f64>,
    /// Unconstrained weights implied by the posterior; absent when δΣ is singular.
    pub implied_weights: Option<WeightVector>,
    pub view_count: usize,
    pub tau: f64,
    pub risk_aversion: f64,
    /// Ridge actually added to Σ (0 when the first attempt succeeded).
    pub ridge: f64,
}

struct Posterior {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
}

// ---------------------------------------------------------------------------
// Blender
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct BlackLittermanBlender {
    config: BlackLittermanConfig,
}

impl BlackLittermanBlender {
    pub fn new(config: BlackLittermanConfig) -> Self {
        Self { config }
    }

    pub fn blend(
        &self,
        cov: &CovarianceMatrix,
        prior: &ExpectedReturns,
        risk_aversion: f64,
        views: &ViewSet,
    ) -> LittermanResult<BlackLittermanOutput> {
        self.validate(cov, prior, views)?;
        let tau = self.config.tau;

        let (posterior, ridge) = if views.is_empty() {
            let covariance = &cov.matrix * (1.0 + tau);
            (
                Posterior {
                    mean: prior.values.clone(),
                    covariance,
                },
                0.0,
            )
        } else {
            match posterior(&cov.matrix, &prior.values, views, tau) {
                Ok(p) => (p, 0.0),
                Err(LittermanError::SingularMatrix { context }) if self.config.ridge_epsilon > 0.0 => {
                    let ridge = self.ridge_for(&cov.matrix);
                    warn!(%context, ridge, "singular matrix in posterior; retrying with ridge");
                    let n = cov.n_assets();
                    let ridged = &cov.matrix + DMatrix::identity(n, n) * ridge;
                    (posterior(&ridged, &prior.values, views, tau)?, ridge)
                }
                Err(e) => return Err(e),
            }
        };

        if !linalg::vector_finite(&posterior.mean) {
            return Err(LittermanError::SingularMatrix {
                context: "posterior returns (non-finite result)".into(),
            });
        }

        let implied_weights = implied_weights(cov, &posterior.mean, risk_aversion);
        debug!(
            views = views.len(),
            ridge,
            implied = implied_weights.is_some(),
            "black-litterman posterior computed"
        );

        Ok(BlackLittermanOutput {
            posterior: ExpectedReturns::new(cov.symbols.clone(), posterior.mean)?,
            prior: prior.clone(),
            posterior_covariance: posterior.covariance,
            implied_weights,
            view_count: views.len(),
            tau,
            risk_aversion,
            ridge,
        })
    }

    fn ridge_for(&self, sigma: &DMatrix<f64>) -> f64 {
        let n = sigma.nrows().max(1) as f64;
        let mean_var = sigma.diagonal().sum() / n;
        if mean_var > 0.0 {
            self.config.ridge_epsilon * mean_var
        } else {
            self.config.ridge_epsilon
        }
    }

    fn validate(
        &self,
        cov: &CovarianceMatrix,
        prior: &ExpectedReturns,
        views: &ViewSet,
    ) -> LittermanResult<()> {
        if !(self.config.tau.is_finite() && self.config.tau > 0.0) {
            return Err(LittermanError::InvalidInput {
                field: "tau".into(),
                reason: format!("Must be positive, got {}", self.config.tau),
            });
        }
        if cov.matrix.nrows() != cov.n_assets() || cov.matrix.ncols() != cov.n_assets() {
            return Err(LittermanError::Alignment(format!(
                "Covariance is {}x{} for {} symbols",
                cov.matrix.nrows(),
                cov.matrix.ncols(),
                cov.n_assets()
            )));
        }
        if prior.symbols != cov.symbols {
            return Err(LittermanError::Alignment(
                "Prior returns and covariance symbol orders differ".into(),
            ));
        }
        views.validate()?;
        views.check_alignment(&cov.symbols)
    }
}

/// He-Litterman update in the form that inverts only the k x k view
/// system, so Ω may be zero (fully confident views) and Σ may be singular.
fn posterior(
    sigma: &DMatrix<f64>,
    pi: &DVector<f64>,
    views: &ViewSet,
    tau: f64,
) -> LittermanResult<Posterior> {
    let p = &views.pick;
    let tau_sigma = sigma * tau;
    let tau_sigma_pt = &tau_sigma * p.transpose();
    let system = p * &tau_sigma_pt + views.omega(sigma, tau);
    let system_inv = linalg::invert_symmetric(&system, "view system (P tau S P' + omega)")?;

    let gain = &tau_sigma_pt * system_inv;
    let mean = pi + &gain * (&views.q - p * pi);
    let m = &tau_sigma - &gain * tau_sigma_pt.transpose();
    Ok(Posterior {
        mean,
        covariance: linalg::symmetrize(&(sigma + m)),
    })
}

/// w = (δΣ)⁻¹μ normalized to sum to one.
fn implied_weights(
    cov: &CovarianceMatrix,
    mu: &DVector<f64>,
    risk_aversion: f64,
) -> Option<WeightVector> {
    if !(risk_aversion.is_finite() && risk_aversion != 0.0) {
        return None;
    }
    let inv = linalg::invert_symmetric(&(&cov.matrix * risk_aversion), "delta * covariance").ok()?;
    WeightVector::normalized(cov.symbols.clone(), inv * mu).ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
