//! Regularized maximum-Sharpe portfolio.
//!
//! Covers:
//! 1. **Feasibility** -- bounds/budget consistency and a positive best-case excess return
//! 2. **Reparametrization** -- y = κw turns max Sharpe into a convex QP
//! 3. **L2 regularization** -- γ‖y‖² added to the variance term
//! 4. **Clean-up** -- clip to bounds, renormalize, zero weights below the cutoff
//! 5. **Fallback** -- one retry, unregularized or with long-only bounds
//!
//! ```text
//! minimize    yᵀ(Σ + γI)y
//! subject to  (μ − r_f)ᵀy = 1,  Σᵢ yᵢ = κ,  l·κ ≤ yᵢ ≤ u·κ,  κ ≥ 0
//! ```

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LittermanError;
use crate::estimation::{CovarianceMatrix, ExpectedReturns};
use crate::linalg;
use crate::types::Rate;
use crate::LittermanResult;

use super::qp::{self, AdmmSettings, QpProblem};
use super::weights::WeightVector;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Per-asset weight limits applied to every position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightBounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
        }
    }
}

impl WeightBounds {
    pub fn is_long_only(&self) -> bool {
        self.lower >= 0.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// L2 regularization strength γ.
    pub gamma: f64,
    pub bounds: WeightBounds,
    /// Weights with |w| below this are set to zero.
    pub weight_cutoff: f64,
    /// Decimal places kept in execution targets.
    pub target_decimals: u32,
    pub solver: AdmmSettings,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            gamma: 1.0,
            bounds: WeightBounds::default(),
            weight_cutoff: 1e-4,
            target_decimals: 5,
            solver: AdmmSettings::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> LittermanResult<()> {
        if !(self.gamma.is_finite() && self.gamma >= 0.0) {
            return Err(LittermanError::InvalidInput {
                field: "optimizer.gamma".into(),
                reason: format!("Must be non-negative, got {}", self.gamma),
            });
        }
        if !(self.weight_cutoff.is_finite() && (0.0..1.0).contains(&self.weight_cutoff)) {
            return Err(LittermanError::InvalidInput {
                field: "optimizer.weight_cutoff".into(),
                reason: format!("Must be in [0, 1), got {}", self.weight_cutoff),
            });
        }
        if !self.bounds.lower.is_finite() || !self.bounds.upper.is_finite() {
            return Err(LittermanError::InvalidInput {
                field: "optimizer.bounds".into(),
                reason: "Bounds must be finite".into(),
            });
        }
        if self.target_decimals > 12 {
            return Err(LittermanError::InvalidInput {
                field: "optimizer.target_decimals".into(),
                reason: format!("At most 12 places, got {}", self.target_decimals),
            });
        }
        self.solver.validate()
    }
}

/// Which retry produced the result, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerFallback {
    /// Solved with γ = 0 and a doubled iteration cap.
    Unregularized,
    /// Solved with long-only [0, 1] bounds.
    DefaultBounds,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub weights: WeightVector,
    pub expected_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub gamma: f64,
    pub bounds: WeightBounds,
    pub iterations: u32,
    pub fallback: Option<OptimizerFallback>,
}

// ---------------------------------------------------------------------------
// Optimizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct PortfolioOptimizer {
    config: OptimizerConfig,
}

impl PortfolioOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Maximize the regularized Sharpe ratio of `expected` under `cov`.
    pub fn optimize(
        &self,
        expected: &ExpectedReturns,
        cov: &CovarianceMatrix,
        risk_free_rate: Rate,
    ) -> LittermanResult<OptimizationResult> {
        self.config.validate()?;
        validate_inputs(expected, cov)?;

        self.with_retries(|gamma, bounds, settings| {
            self.solve_once(expected, cov, risk_free_rate, gamma, bounds, settings)
        })
    }

    /// Primary solve, then at most one retry: unregularized with a doubled
    /// iteration cap after a solver failure, or long-only bounds after an
    /// infeasible custom range. A failed retry surfaces the first error.
    fn with_retries<F>(&self, mut solve: F) -> LittermanResult<OptimizationResult>
    where
        F: FnMut(f64, WeightBounds, &AdmmSettings) -> LittermanResult<OptimizationResult>,
    {
        match solve(self.config.gamma, self.config.bounds, &self.config.solver) {
            Ok(result) => Ok(result),
            Err(err @ LittermanError::Optimization { .. }) => {
                warn!(error = %err, "optimizer failed; retrying unregularized");
                let settings = AdmmSettings {
                    max_iterations: self.config.solver.max_iterations.saturating_mul(2),
                    ..self.config.solver.clone()
                };
                match solve(0.0, self.config.bounds, &settings) {
                    Ok(mut result) => {
                        result.fallback = Some(OptimizerFallback::Unregularized);
                        Ok(result)
                    }
                    Err(retry) => {
                        warn!(error = %retry, "unregularized retry failed");
                        Err(err)
                    }
                }
            }
            Err(err @ LittermanError::Infeasible(_)) if self.config.bounds != WeightBounds::default() => {
                warn!(error = %err, "infeasible under custom bounds; retrying long-only");
                match solve(self.config.gamma, WeightBounds::default(), &self.config.solver) {
                    Ok(mut result) => {
                        result.fallback = Some(OptimizerFallback::DefaultBounds);
                        Ok(result)
                    }
                    Err(retry) => {
                        warn!(error = %retry, "long-only retry failed");
                        Err(err)
                    }
                }
            }
            Err(err) => Err(err),
        }
    }

    fn solve_once(
        &self,
        expected: &ExpectedReturns,
        cov: &CovarianceMatrix,
        risk_free_rate: Rate,
        gamma: f64,
        bounds: WeightBounds,
        settings: &AdmmSettings,
    ) -> LittermanResult<OptimizationResult> {
        let n = cov.n_assets();
        let excess = expected.values.map(|r| r - risk_free_rate);
        check_feasible(&excess, bounds)?;

        let (raw, iterations) = if n == 1 {
            (DVector::from_element(1, 1.0), 0)
        } else {
            let problem = build_problem(&excess, &cov.matrix, gamma, bounds);
            let solution = qp::solve(&problem, settings)?;
            let kappa = solution.x[n];
            if !(kappa.is_finite() && kappa > 1e-12) {
                return Err(LittermanError::Optimization {
                    solver: "dense_admm".into(),
                    iterations: solution.iterations,
                    last_residual: solution.primal_residual.max(solution.dual_residual),
                });
            }
            (solution.x.rows(0, n) / kappa, solution.iterations)
        };

        if !linalg::vector_finite(&raw) {
            return Err(LittermanError::Optimization {
                solver: "dense_admm".into(),
                iterations,
                last_residual: f64::NAN,
            });
        }

        let clipped = raw.map(|w| w.max(bounds.lower).min(bounds.upper));
        let weights = WeightVector::normalized(cov.symbols.clone(), clipped)
            .map_err(|_| LittermanError::Optimization {
                solver: "dense_admm".into(),
                iterations,
                last_residual: f64::NAN,
            })?
            .clean(self.config.weight_cutoff)?
            .cap_to(bounds.upper);

        let (expected_return, volatility, sharpe_ratio) =
            performance(&weights.weights, &expected.values, &cov.matrix, risk_free_rate);
        debug!(
            gamma,
            iterations,
            expected_return,
            volatility,
            sharpe_ratio,
            "max-sharpe solved"
        );

        Ok(OptimizationResult {
            weights,
            expected_return,
            volatility,
            sharpe_ratio,
            gamma,
            bounds,
            iterations,
            fallback: None,
        })
    }
}

// ---------------------------------------------------------------------------
// Problem construction
// ---------------------------------------------------------------------------

/// Variables x = [y; κ]. Returns and the quadratic term are rescaled to
/// unit magnitude; the ratio w = y/κ is unaffected.
fn build_problem(
    excess: &DVector<f64>,
    sigma: &DMatrix<f64>,
    gamma: f64,
    bounds: WeightBounds,
) -> QpProblem {
    let n = excess.len();
    let m = 2 * n + 3;

    let return_scale = excess.amax().max(f64::MIN_POSITIVE);
    let regularized = sigma + DMatrix::identity(n, n) * gamma;
    let mean_diag = regularized.diagonal().sum() / n as f64;
    let cost_scale = if mean_diag > 0.0 { mean_diag } else { 1.0 };

    let mut p = DMatrix::zeros(n + 1, n + 1);
    p.view_mut((0, 0), (n, n))
        .copy_from(&(linalg::symmetrize(&regularized) * (2.0 / cost_scale)));

    let mut a = DMatrix::zeros(m, n + 1);
    let mut lower = DVector::zeros(m);
    let mut upper = DVector::zeros(m);

    // (μ − r_f)ᵀy = 1
    for i in 0..n {
        a[(0, i)] = excess[i] / return_scale;
    }
    lower[0] = 1.0;
    upper[0] = 1.0;

    // Σy − κ = 0
    for i in 0..n {
        a[(1, i)] = 1.0;
    }
    a[(1, n)] = -1.0;

    for i in 0..n {
        // y_i − l·κ ≥ 0
        let row = 2 + i;
        a[(row, i)] = 1.0;
        a[(row, n)] = -bounds.lower;
        upper[row] = f64::INFINITY;

        // y_i − u·κ ≤ 0
        let row = 2 + n + i;
        a[(row, i)] = 1.0;
        a[(row, n)] = -bounds.upper;
        lower[row] = f64::NEG_INFINITY;
    }

    // κ ≥ 0
    a[(m - 1, n)] = 1.0;
    upper[m - 1] = f64::INFINITY;

    QpProblem {
        p,
        q: DVector::zeros(n + 1),
        a,
        lower,
        upper,
    }
}

/// Best excess return reachable inside the bounds, by greedy fill.
fn max_feasible_excess(excess: &DVector<f64>, bounds: WeightBounds) -> f64 {
    let n = excess.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| excess[j].total_cmp(&excess[i]));

    let mut w = vec![bounds.lower; n];
    let mut budget = 1.0 - n as f64 * bounds.lower;
    for i in order {
        if budget <= 0.0 {
            break;
        }
        let add = (bounds.upper - bounds.lower).min(budget);
        w[i] += add;
        budget -= add;
    }
    w.iter().zip(excess.iter()).map(|(w, e)| w * e).sum()
}

fn check_feasible(excess: &DVector<f64>, bounds: WeightBounds) -> LittermanResult<()> {
    let n = excess.len() as f64;
    if bounds.lower > bounds.upper {
        return Err(LittermanError::Infeasible(format!(
            "Lower bound {} exceeds upper bound {}",
            bounds.lower, bounds.upper
        )));
    }
    if n * bounds.lower > 1.0 + 1e-12 || n * bounds.upper < 1.0 - 1e-12 {
        return Err(LittermanError::Infeasible(format!(
            "No weights in [{}, {}] across {} assets sum to one",
            bounds.lower, bounds.upper, n
        )));
    }
    let best = max_feasible_excess(excess, bounds);
    if best <= 0.0 {
        return Err(LittermanError::Infeasible(format!(
            "No feasible portfolio has positive excess return (best {:.6})",
            best
        )));
    }
    Ok(())
}

fn validate_inputs(expected: &ExpectedReturns, cov: &CovarianceMatrix) -> LittermanResult<()> {
    if cov.n_assets() == 0 {
        return Err(LittermanError::InsufficientData(
            "Optimization needs at least one asset".into(),
        ));
    }
    if expected.symbols != cov.symbols {
        return Err(LittermanError::Alignment(
            "Expected returns and covariance symbol orders differ".into(),
        ));
    }
    if cov.matrix.nrows() != cov.n_assets() || cov.matrix.ncols() != cov.n_assets() {
        return Err(LittermanError::Alignment(format!(
            "Covariance is {}x{} for {} symbols",
            cov.matrix.nrows(),
            cov.matrix.ncols(),
            cov.n_assets()
        )));
    }
    if !linalg::vector_finite(&expected.values) || !linalg::all_finite(&cov.matrix) {
        return Err(LittermanError::InvalidInput {
            field: "optimizer".into(),
            reason: "Expected returns and covariance must be finite".into(),
        });
    }
    Ok(())
}

/// (expected return, volatility, Sharpe ratio) of `w`.
pub fn performance(
    w: &DVector<f64>,
    expected: &DVector<f64>,
    sigma: &DMatrix<f64>,
    risk_free_rate: Rate,
) -> (f64, f64, f64) {
    let ret = w.dot(expected);
    let variance = (w.transpose() * sigma * w)[(0, 0)];
    let vol = variance.max(0.0).sqrt();
    let sharpe = if vol > 0.0 {
        (ret - risk_free_rate) / vol
    } else {
        0.0
    };
    (ret, vol, sharpe)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Symbol;
    use approx::assert_abs_diff_eq;

    fn syms(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn two_asset() -> (ExpectedReturns, CovarianceMatrix) {
        let s = syms(&["A", "B"]);
        let cov = CovarianceMatrix::from_rows(s.clone(), &[vec![0.04, 0.0], vec![0.0, 0.01]]).unwrap();
        let mu = ExpectedReturns::new(s, DVector::from_vec(vec![0.10, 0.05])).unwrap();
        (mu, cov)
    }

    fn optimizer(gamma: f64) -> PortfolioOptimizer {
        PortfolioOptimizer::new(OptimizerConfig {
            gamma,
            ..OptimizerConfig::default()
        })
    }

    #[test]
    fn test_unregularized_matches_tangency_portfolio() {
        // w ∝ Σ⁻¹μ = (2.5, 5)  =>  (1/3, 2/3)
        let (mu, cov) = two_asset();
        let res = optimizer(0.0).optimize(&mu, &cov, 0.0).unwrap();
        assert_abs_diff_eq!(res.weights.get("A").unwrap(), 1.0 / 3.0, epsilon = 1e-4);
        assert_abs_diff_eq!(res.weights.get("B").unwrap(), 2.0 / 3.0, epsilon = 1e-4);
        assert!(res.fallback.is_none());
    }

    #[test]
    fn test_regularization_shrinks_largest_weight() {
        // w ∝ (Σ + 0.1 I)⁻¹μ = (0.1/0.14, 0.05/0.11)
        let (mu, cov) = two_asset();
        let plain = optimizer(0.0).optimize(&mu, &cov, 0.0).unwrap();
        let reg = optimizer(0.1).optimize(&mu, &cov, 0.0).unwrap();
        let a = 0.1 / 0.14;
        let b = 0.05 / 0.11;
        assert_abs_diff_eq!(reg.weights.get("A").unwrap(), a / (a + b), epsilon = 1e-4);
        let max_plain = plain.weights.weights.max();
        let max_reg = reg.weights.weights.max();
        assert!(max_reg < max_plain);
    }

    #[test]
    fn test_weights_sum_to_one_within_bounds() {
        let s = syms(&["A", "B", "C", "D"]);
        let cov = CovarianceMatrix::from_rows(
            s.clone(),
            &[
                vec![0.040, 0.006, 0.004, 0.002],
                vec![0.006, 0.090, 0.010, 0.003],
                vec![0.004, 0.010, 0.025, 0.001],
                vec![0.002, 0.003, 0.001, 0.060],
            ],
        )
        .unwrap();
        let mu = ExpectedReturns::new(s, DVector::from_vec(vec![0.08, 0.12, 0.06, 0.02])).unwrap();
        let opt = PortfolioOptimizer::new(OptimizerConfig {
            gamma: 0.0,
            bounds: WeightBounds {
                lower: 0.0,
                upper: 0.4,
            },
            ..OptimizerConfig::default()
        });
        let res = opt.optimize(&mu, &cov, 0.0).unwrap();
        assert_abs_diff_eq!(res.weights.sum(), 1.0, epsilon = 1e-6);
        for (_, w) in res.weights.iter() {
            assert!(w >= -1e-9 && w <= 0.4);
        }
    }

    #[test]
    fn test_small_weights_are_exactly_zero() {
        let (mu, cov) = two_asset();
        let res = optimizer(1.0).optimize(&mu, &cov, 0.0).unwrap();
        for (_, w) in res.weights.iter() {
            assert!(w == 0.0 || w >= 1e-4);
        }
        assert_abs_diff_eq!(res.weights.sum(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_no_positive_excess_is_infeasible() {
        let (_, cov) = two_asset();
        let mu = ExpectedReturns::new(syms(&["A", "B"]), DVector::from_vec(vec![0.01, 0.02])).unwrap();
        let err = optimizer(1.0).optimize(&mu, &cov, 0.05).unwrap_err();
        assert!(matches!(err, LittermanError::Infeasible(_)));
    }

    #[test]
    fn test_infeasible_custom_bounds_fall_back_to_long_only() {
        let (mu, cov) = two_asset();
        let opt = PortfolioOptimizer::new(OptimizerConfig {
            bounds: WeightBounds {
                lower: 0.0,
                upper: 0.3,
            },
            ..OptimizerConfig::default()
        });
        let res = opt.optimize(&mu, &cov, 0.0).unwrap();
        assert_eq!(res.fallback, Some(OptimizerFallback::DefaultBounds));
        assert_abs_diff_eq!(res.weights.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_solver_failure_retries_unregularized_with_doubled_cap() {
        let opt = optimizer(0.5);
        let mut calls = Vec::new();
        let res = opt
            .with_retries(|gamma, bounds, settings| {
                calls.push((gamma, settings.max_iterations));
                if gamma > 0.0 {
                    return Err(LittermanError::Optimization {
                        solver: "dense_admm".into(),
                        iterations: settings.max_iterations,
                        last_residual: 1.0,
                    });
                }
                Ok(OptimizationResult {
                    weights: WeightVector::equal_weight(&syms(&["A", "B"])),
                    expected_return: 0.075,
                    volatility: 0.1,
                    sharpe_ratio: 0.75,
                    gamma,
                    bounds,
                    iterations: 7,
                    fallback: None,
                })
            })
            .unwrap();
        assert_eq!(res.fallback, Some(OptimizerFallback::Unregularized));
        assert_eq!(res.gamma, 0.0);
        assert_eq!(calls, vec![(0.5, 10_000), (0.0, 20_000)]);
    }

    #[test]
    fn test_failed_unregularized_retry_surfaces_first_error() {
        let (mu, cov) = two_asset();
        let opt = PortfolioOptimizer::new(OptimizerConfig {
            solver: AdmmSettings {
                max_iterations: 1,
                adaptive_rho_interval: 0,
                ..AdmmSettings::default()
            },
            ..OptimizerConfig::default()
        });
        match opt.optimize(&mu, &cov, 0.0).unwrap_err() {
            // The retry ran with a cap of 2; the error is the first attempt's
            LittermanError::Optimization { iterations, .. } => assert_eq!(iterations, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_single_asset_takes_everything() {
        let s = syms(&["A"]);
        let cov = CovarianceMatrix::from_rows(s.clone(), &[vec![0.04]]).unwrap();
        let mu = ExpectedReturns::new(s, DVector::from_vec(vec![0.07])).unwrap();
        let res = optimizer(1.0).optimize(&mu, &cov, 0.0).unwrap();
        assert_eq!(res.weights.get("A"), Some(1.0));
    }

    #[test]
    fn test_deterministic() {
        let (mu, cov) = two_asset();
        let a = optimizer(1.0).optimize(&mu, &cov, 0.0).unwrap();
        let b = optimizer(1.0).optimize(&mu, &cov, 0.0).unwrap();
        assert_eq!(a, b);
    }
}
