//! Shrunk covariance estimation.
//!
//! Covers:
//! 1. **Sample covariance** -- unbiased (n - 1) estimator of period returns
//! 2. **Ledoit-Wolf, constant variance** -- shrink toward mu * I (2004 closed form)
//! 3. **Ledoit-Wolf, constant correlation** -- shrink toward the average-correlation matrix (2003)
//! 4. **Annualization and repair** -- scale by frequency, symmetrize, clip negative eigenvalues
//!
//! The shrinkage intensity is always the closed-form optimum; no sampling
//! or cross-validation is involved, so identical panels give identical
//! matrices.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LittermanError;
use crate::linalg;
use crate::market_data::{PricePanel, ReturnKind};
use crate::types::{matrix_serde, Symbol};
use crate::LittermanResult;

/// Eigenvalues below this are treated as numerical negatives and clipped.
const PSD_TOLERANCE: f64 = -1e-12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Structured target the sample covariance is shrunk toward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShrinkageTarget {
    /// Average variance on the diagonal, zero elsewhere.
    #[default]
    ConstantVariance,
    /// Sample variances with a single average correlation off-diagonal.
    ConstantCorrelation,
    /// No shrinkage.
    Sample,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CovarianceConfig {
    pub return_kind: ReturnKind,
    pub shrinkage_target: ShrinkageTarget,
    /// Minimum overlapping return observations across all symbols.
    pub min_observations: usize,
}

impl Default for CovarianceConfig {
    fn default() -> Self {
        Self {
            return_kind: ReturnKind::Simple,
            shrinkage_target: ShrinkageTarget::ConstantVariance,
            min_observations: 60,
        }
    }
}

/// Annualized covariance of asset returns, indexed in `symbols` order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovarianceMatrix {
    pub symbols: Vec<Symbol>,
    #[serde(with = "matrix_serde")]
    pub matrix: DMatrix<f64>,
    /// Weight placed on the structured target, in [0, 1].
    pub shrinkage_intensity: f64,
    pub target: ShrinkageTarget,
    /// Return observations the estimate was built from (0 when supplied externally).
    pub observations: usize,
}

impl CovarianceMatrix {
    /// Wrap an externally supplied covariance, checking shape and symmetry.
    pub fn from_rows(symbols: Vec<Symbol>, rows: &[Vec<f64>]) -> LittermanResult<Self> {
        let n = symbols.len();
        let matrix = matrix_serde::rows_to_matrix(rows).map_err(|reason| {
            LittermanError::InvalidInput {
                field: "covariance_matrix".into(),
                reason,
            }
        })?;
        let cov = Self {
            symbols,
            matrix,
            shrinkage_intensity: 0.0,
            target: ShrinkageTarget::Sample,
            observations: 0,
        };
        validate_covariance_matrix(&cov.matrix, n)?;
        Ok(cov)
    }

    pub fn n_assets(&self) -> usize {
        self.symbols.len()
    }

    pub fn index_of(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    pub fn variance(&self, symbol: &str) -> Option<f64> {
        self.index_of(symbol).map(|i| self.matrix[(i, i)])
    }

    /// Same symbols with every entry scaled by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            matrix: &self.matrix * factor,
            ..self.clone()
        }
    }

    /// Copy with `ridge` added to every variance.
    pub fn with_ridge(&self, ridge: f64) -> Self {
        let n = self.n_assets();
        Self {
            matrix: &self.matrix + DMatrix::identity(n, n) * ridge,
            ..self.clone()
        }
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CovarianceEstimator {
    config: CovarianceConfig,
    frequency: f64,
}

impl CovarianceEstimator {
    pub fn new(config: CovarianceConfig, frequency: f64) -> Self {
        Self { config, frequency }
    }

    pub fn config(&self) -> &CovarianceConfig {
        &self.config
    }

    /// Estimate the annualized, shrunk covariance of the panel's returns.
    pub fn estimate(&self, panel: &PricePanel) -> LittermanResult<CovarianceMatrix> {
        let returns = panel.returns(self.config.return_kind);
        let t = returns.nrows();
        let required = self.config.min_observations.max(2);
        if t < required {
            return Err(LittermanError::InsufficientData(format!(
                "Covariance needs at least {} overlapping return observations across {} symbols, got {}",
                required,
                panel.n_assets(),
                t
            )));
        }

        let (raw, intensity) = match self.config.shrinkage_target {
            ShrinkageTarget::ConstantVariance => ledoit_wolf_constant_variance(&returns),
            ShrinkageTarget::ConstantCorrelation => ledoit_wolf_constant_correlation(&returns)?,
            ShrinkageTarget::Sample => (sample_covariance(&returns), 0.0),
        };

        let mut matrix = linalg::symmetrize(&(raw * self.frequency));
        if !linalg::all_finite(&matrix) {
            return Err(LittermanError::InvalidInput {
                field: "prices".into(),
                reason: "Covariance contains non-finite entries".into(),
            });
        }
        if let Some(min_eig) = linalg::min_eigenvalue(&matrix) {
            if min_eig < PSD_TOLERANCE {
                warn!(
                    min_eigenvalue = min_eig,
                    "covariance not positive semidefinite; clipping negative eigenvalues"
                );
                matrix = linalg::clip_to_psd(&matrix);
            }
        }

        debug!(
            assets = panel.n_assets(),
            observations = t,
            shrinkage = intensity,
            target = ?self.config.shrinkage_target,
            "covariance estimated"
        );

        Ok(CovarianceMatrix {
            symbols: panel.symbols().to_vec(),
            matrix,
            shrinkage_intensity: intensity,
            target: self.config.shrinkage_target,
            observations: t,
        })
    }
}

// ---------------------------------------------------------------------------
// Estimators on a T x N return matrix (unannualized)
// ---------------------------------------------------------------------------

fn demean(x: &DMatrix<f64>) -> DMatrix<f64> {
    let means = x.row_mean();
    DMatrix::from_fn(x.nrows(), x.ncols(), |i, j| x[(i, j)] - means[j])
}

/// Unbiased sample covariance (divisor T - 1).
pub fn sample_covariance(x: &DMatrix<f64>) -> DMatrix<f64> {
    let t = x.nrows();
    let xm = demean(x);
    let denom = (t.max(2) - 1) as f64;
    xm.transpose() * &xm / denom
}

/// Ledoit-Wolf shrinkage toward a scaled identity.
///
/// Returns the shrunk covariance (divisor T) and the intensity.
pub fn ledoit_wolf_constant_variance(x: &DMatrix<f64>) -> (DMatrix<f64>, f64) {
    let t = x.nrows() as f64;
    let n = x.ncols();
    let xm = demean(x);

    let emp_cov = xm.transpose() * &xm / t;
    let trace = emp_cov.trace();
    let mu = trace / n as f64;

    let x2 = xm.map(|v| v * v);
    let beta_sum = (x2.transpose() * &x2).sum();
    let delta_sum = (xm.transpose() * &xm).map(|v| v * v).sum() / (t * t);

    let beta = (beta_sum / t - delta_sum) / (n as f64 * t);
    let delta = (delta_sum - 2.0 * mu * trace + n as f64 * mu * mu) / n as f64;
    let beta = beta.min(delta);

    let shrinkage = if beta == 0.0 || delta <= 0.0 {
        0.0
    } else {
        (beta / delta).clamp(0.0, 1.0)
    };

    let target = DMatrix::identity(n, n) * mu;
    (emp_cov * (1.0 - shrinkage) + target * shrinkage, shrinkage)
}

/// Ledoit-Wolf shrinkage toward the constant-correlation matrix.
///
/// Returns the shrunk covariance (divisor T - 1) and the intensity.
pub fn ledoit_wolf_constant_correlation(
    x: &DMatrix<f64>,
) -> LittermanResult<(DMatrix<f64>, f64)> {
    let t_count = x.nrows();
    let t = t_count as f64;
    let n = x.ncols();
    let s = sample_covariance(x);

    let var: Vec<f64> = (0..n).map(|i| s[(i, i)]).collect();
    if let Some(i) = var.iter().position(|v| *v <= 0.0) {
        return Err(LittermanError::InvalidInput {
            field: "prices".into(),
            reason: format!(
                "Asset {} has zero return variance; constant-correlation target undefined",
                i
            ),
        });
    }
    let std: Vec<f64> = var.iter().map(|v| v.sqrt()).collect();

    if n < 2 {
        return Ok((s, 0.0));
    }

    // Average off-diagonal correlation
    let mut corr_sum = 0.0;
    for i in 0..n {
        for j in 0..n {
            corr_sum += s[(i, j)] / (std[i] * std[j]);
        }
    }
    let r_bar = (corr_sum - n as f64) / (n * (n - 1)) as f64;

    let f = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            var[i]
        } else {
            r_bar * std[i] * std[j]
        }
    });

    let xm = demean(x);
    let y = xm.map(|v| v * v);
    let xtx = xm.transpose() * &xm;

    // pi: asymptotic variance of the sample covariance entries
    let yty = y.transpose() * &y;
    let pi_mat = DMatrix::from_fn(n, n, |i, j| {
        yty[(i, j)] / t - 2.0 * xtx[(i, j)] * s[(i, j)] / t + s[(i, j)] * s[(i, j)]
    });
    let pi_hat = pi_mat.sum();

    // rho: covariance between target and sample entries
    let x3 = xm.map(|v| v * v * v);
    let term1 = x3.transpose() * &xm / t;
    let help = &xtx / t;
    let theta = DMatrix::from_fn(n, n, |i, j| {
        if i == j {
            0.0
        } else {
            term1[(i, j)] - help[(i, i)] * s[(i, j)] - help[(i, j)] * var[i] + var[i] * s[(i, j)]
        }
    });
    let mut weighted_theta = 0.0;
    for i in 0..n {
        for j in 0..n {
            weighted_theta += std[j] / std[i] * theta[(i, j)];
        }
    }
    let rho_hat = pi_mat.diagonal().sum() + r_bar * weighted_theta;

    // gamma: misspecification of the target
    let gamma_hat = (&s - &f).map(|v| v * v).sum();

    let shrinkage = if gamma_hat <= 0.0 {
        0.0
    } else {
        ((pi_hat - rho_hat) / gamma_hat / t).clamp(0.0, 1.0)
    };

    Ok((f * shrinkage + s * (1.0 - shrinkage), shrinkage))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

pub(crate) fn validate_covariance_matrix(cov: &DMatrix<f64>, n: usize) -> LittermanResult<()> {
    if cov.nrows() != n || cov.ncols() != n {
        return Err(LittermanError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!(
                "Expected {}x{} matrix but got {}x{}",
                n,
                n,
                cov.nrows(),
                cov.ncols()
            ),
        });
    }
    if !linalg::all_finite(cov) {
        return Err(LittermanError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: "Contains non-finite entries".into(),
        });
    }
    let tolerance = 1e-10;
    for i in 0..n {
        if cov[(i, i)] < 0.0 {
            return Err(LittermanError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Negative variance at [{},{}]", i, i),
            });
        }
        for j in (i + 1)..n {
            if (cov[(i, j)] - cov[(j, i)]).abs() > tolerance {
                return Err(LittermanError::InvalidInput {
                    field: "covariance_matrix".into(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i,
                        j,
                        cov[(i, j)],
                        j,
                        i,
                        cov[(j, i)]
                    ),
                });
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::synthetic_panel;
    use approx::assert_abs_diff_eq;

    fn estimator(target: ShrinkageTarget) -> CovarianceEstimator {
        CovarianceEstimator::new(
            CovarianceConfig {
                shrinkage_target: target,
                ..CovarianceConfig::default()
            },
            252.0,
        )
    }

    #[test]
    fn test_constant_variance_is_symmetric_psd() {
        let panel = synthetic_panel(&["A", "B", "C", "D"], 253, 11);
        let cov = estimator(ShrinkageTarget::ConstantVariance)
            .estimate(&panel)
            .unwrap();
        assert_eq!(cov.matrix, cov.matrix.transpose());
        assert!(linalg::min_eigenvalue(&cov.matrix).unwrap() >= -1e-12);
        assert!(cov.shrinkage_intensity >= 0.0 && cov.shrinkage_intensity <= 1.0);
        assert_eq!(cov.observations, 252);
    }

    #[test]
    fn test_constant_correlation_is_symmetric_psd() {
        let panel = synthetic_panel(&["A", "B", "C"], 253, 5);
        let cov = estimator(ShrinkageTarget::ConstantCorrelation)
            .estimate(&panel)
            .unwrap();
        assert_eq!(cov.matrix, cov.matrix.transpose());
        assert!(linalg::min_eigenvalue(&cov.matrix).unwrap() >= -1e-12);
        assert!(cov.shrinkage_intensity >= 0.0 && cov.shrinkage_intensity <= 1.0);
    }

    #[test]
    fn test_sample_target_matches_textbook_covariance() {
        // Returns: A = [0.01, -0.01, 0.02], B = [0.02, 0.00, 0.01]
        let x = DMatrix::from_row_slice(3, 2, &[0.01, 0.02, -0.01, 0.0, 0.02, 0.01]);
        let s = sample_covariance(&x);
        // mean A = 0.006667, mean B = 0.01
        // var A = ((0.003333)^2 + (-0.016667)^2 + (0.013333)^2) / 2 = 0.000233333
        assert_abs_diff_eq!(s[(0, 0)], 0.000233333333, epsilon = 1e-10);
        // var B = (0.01^2 + 0.01^2 + 0) / 2 = 0.0001
        assert_abs_diff_eq!(s[(1, 1)], 0.0001, epsilon = 1e-12);
        // cov = (0.003333*0.01 + (-0.016667)*(-0.01) + 0.013333*0) / 2 = 0.0001
        assert_abs_diff_eq!(s[(0, 1)], 0.0001, epsilon = 1e-12);
    }

    #[test]
    fn test_annualization_by_frequency() {
        let panel = synthetic_panel(&["A", "B"], 120, 3);
        let daily = CovarianceEstimator::new(
            CovarianceConfig {
                shrinkage_target: ShrinkageTarget::Sample,
                ..CovarianceConfig::default()
            },
            1.0,
        )
        .estimate(&panel)
        .unwrap();
        let annual = estimator(ShrinkageTarget::Sample).estimate(&panel).unwrap();
        assert_abs_diff_eq!(
            annual.matrix[(0, 0)],
            daily.matrix[(0, 0)] * 252.0,
            epsilon = 1e-12
        );
        assert_eq!(annual.shrinkage_intensity, 0.0);
    }

    #[test]
    fn test_shrinkage_pulls_off_diagonal_toward_zero() {
        let panel = synthetic_panel(&["A", "B", "C"], 80, 9);
        let sample = estimator(ShrinkageTarget::Sample).estimate(&panel).unwrap();
        let shrunk = estimator(ShrinkageTarget::ConstantVariance)
            .estimate(&panel)
            .unwrap();
        // Sample divisor is T-1, LW uses T; compare magnitudes loosely
        assert!(shrunk.matrix[(0, 1)].abs() <= sample.matrix[(0, 1)].abs() + 1e-12);
    }

    #[test]
    fn test_insufficient_observations() {
        let panel = synthetic_panel(&["A", "B"], 30, 1);
        let err = estimator(ShrinkageTarget::ConstantVariance)
            .estimate(&panel)
            .unwrap_err();
        assert!(matches!(err, LittermanError::InsufficientData(_)));
    }

    #[test]
    fn test_deterministic() {
        let panel = synthetic_panel(&["A", "B", "C"], 200, 21);
        let e = estimator(ShrinkageTarget::ConstantCorrelation);
        assert_eq!(e.estimate(&panel).unwrap(), e.estimate(&panel).unwrap());
    }

    #[test]
    fn test_from_rows_rejects_asymmetric() {
        let err = CovarianceMatrix::from_rows(
            vec!["A".into(), "B".into()],
            &[vec![0.04, 0.01], vec![0.02, 0.09]],
        )
        .unwrap_err();
        assert!(matches!(err, LittermanError::InvalidInput { .. }));
    }
}
