//! Dense ADMM solver for convex quadratic programs.
//!
//! Solves
//!
//! ```text
//! minimize    ½ xᵀPx + qᵀx
//! subject to  l ≤ Ax ≤ u
//! ```
//!
//! with the operator-splitting iteration popularized by OSQP: a cached
//! Cholesky factor of `P + σI + Aᵀ diag(ρ) A`, over-relaxation `α`, and a
//! step size `ρ` rebalanced every few iterations from the ratio of primal
//! to dual residuals. Equality rows (`l == u`) get a stiffer `ρ`.
//!
//! P must be positive semidefinite. Problems here are small and dense
//! (one variable per asset plus a scale), so no sparsity is exploited.

use nalgebra::{Cholesky, DMatrix, DVector, Dyn};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::LittermanError;
use crate::linalg;
use crate::LittermanResult;

const SOLVER_NAME: &str = "dense_admm";
const RHO_MIN: f64 = 1e-6;
const RHO_MAX: f64 = 1e6;
/// Relative change in ρ that triggers a refactorization.
const RHO_ADAPT_THRESHOLD: f64 = 5.0;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmmSettings {
    pub rho: f64,
    pub sigma: f64,
    /// Over-relaxation in (0, 2).
    pub alpha: f64,
    pub eps_abs: f64,
    pub eps_rel: f64,
    pub max_iterations: u32,
    /// Iterations between step-size updates (0 disables adaptation).
    pub adaptive_rho_interval: u32,
    pub equality_rho_scale: f64,
}

impl Default for AdmmSettings {
    fn default() -> Self {
        Self {
            rho: 0.1,
            sigma: 1e-6,
            alpha: 1.6,
            eps_abs: 1e-7,
            eps_rel: 1e-7,
            max_iterations: 10_000,
            adaptive_rho_interval: 25,
            equality_rho_scale: 1e3,
        }
    }
}

impl AdmmSettings {
    pub fn validate(&self) -> LittermanResult<()> {
        let positive = [
            ("rho", self.rho),
            ("sigma", self.sigma),
            ("eps_abs", self.eps_abs),
            ("equality_rho_scale", self.equality_rho_scale),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(LittermanError::InvalidInput {
                    field: format!("solver.{}", field),
                    reason: format!("Must be positive, got {}", value),
                });
            }
        }
        if !(self.eps_rel.is_finite() && self.eps_rel >= 0.0) {
            return Err(LittermanError::InvalidInput {
                field: "solver.eps_rel".into(),
                reason: format!("Must be non-negative, got {}", self.eps_rel),
            });
        }
        if !(self.alpha > 0.0 && self.alpha < 2.0) {
            return Err(LittermanError::InvalidInput {
                field: "solver.alpha".into(),
                reason: format!("Must be in (0, 2), got {}", self.alpha),
            });
        }
        if self.max_iterations == 0 {
            return Err(LittermanError::InvalidInput {
                field: "solver.max_iterations".into(),
                reason: "Must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct QpProblem {
    pub p: DMatrix<f64>,
    pub q: DVector<f64>,
    pub a: DMatrix<f64>,
    pub lower: DVector<f64>,
    pub upper: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct QpSolution {
    pub x: DVector<f64>,
    /// Constraint multipliers.
    pub y: DVector<f64>,
    pub iterations: u32,
    pub primal_residual: f64,
    pub dual_residual: f64,
}

// ---------------------------------------------------------------------------
// Solver
// ---------------------------------------------------------------------------

impl QpProblem {
    fn validate(&self) -> LittermanResult<()> {
        let n = self.p.nrows();
        let m = self.a.nrows();
        let shapes_ok = self.p.ncols() == n
            && self.q.len() == n
            && self.a.ncols() == n
            && self.lower.len() == m
            && self.upper.len() == m;
        if !shapes_ok {
            return Err(LittermanError::InvalidInput {
                field: "qp".into(),
                reason: "Inconsistent problem dimensions".into(),
            });
        }
        if !linalg::all_finite(&self.p) || !linalg::all_finite(&self.a) || !linalg::vector_finite(&self.q) {
            return Err(LittermanError::InvalidInput {
                field: "qp".into(),
                reason: "P, q and A must be finite".into(),
            });
        }
        if let Some(i) = (0..m).find(|&i| self.lower[i] > self.upper[i]) {
            return Err(LittermanError::Infeasible(format!(
                "Constraint {} has lower bound {} above upper bound {}",
                i, self.lower[i], self.upper[i]
            )));
        }
        Ok(())
    }

    fn rho_vector(&self, rho: f64, equality_scale: f64) -> DVector<f64> {
        DVector::from_fn(self.a.nrows(), |i, _| {
            if self.lower[i] == self.upper[i] {
                rho * equality_scale
            } else {
                rho
            }
        })
    }

    fn factor(&self, rho: &DVector<f64>, sigma: f64) -> LittermanResult<Cholesky<f64, Dyn>> {
        let n = self.p.nrows();
        let kkt = &self.p
            + DMatrix::identity(n, n) * sigma
            + self.a.transpose() * DMatrix::from_diagonal(rho) * &self.a;
        Cholesky::new(linalg::symmetrize(&kkt)).ok_or_else(|| LittermanError::SingularMatrix {
            context: "ADMM linear system".into(),
        })
    }

    fn project(&self, v: DVector<f64>) -> DVector<f64> {
        DVector::from_fn(v.len(), |i, _| v[i].max(self.lower[i]).min(self.upper[i]))
    }
}

fn inf_norm(v: &DVector<f64>) -> f64 {
    v.iter().fold(0.0_f64, |acc, x| acc.max(x.abs()))
}

/// Run ADMM until both residuals meet tolerance or the iteration cap.
pub fn solve(problem: &QpProblem, settings: &AdmmSettings) -> LittermanResult<QpSolution> {
    problem.validate()?;
    settings.validate()?;

    let n = problem.p.nrows();
    let m = problem.a.nrows();
    let at = problem.a.transpose();
    let alpha = settings.alpha;

    let mut rho = settings.rho;
    let mut rho_vec = problem.rho_vector(rho, settings.equality_rho_scale);
    let mut chol = problem.factor(&rho_vec, settings.sigma)?;

    let mut x = DVector::zeros(n);
    let mut z = DVector::zeros(m);
    let mut y = DVector::zeros(m);
    let mut primal = f64::INFINITY;
    let mut dual = f64::INFINITY;

    for iteration in 1..=settings.max_iterations {
        let rhs = &x * settings.sigma - &problem.q + &at * (rho_vec.component_mul(&z) - &y);
        let x_tilde = chol.solve(&rhs);
        let z_tilde = &problem.a * &x_tilde;

        let x_next = &x_tilde * alpha + &x * (1.0 - alpha);
        let z_relaxed = &z_tilde * alpha + &z * (1.0 - alpha);
        let z_next = problem.project(&z_relaxed + y.component_div(&rho_vec));
        y += rho_vec.component_mul(&(&z_relaxed - &z_next));
        x = x_next;
        z = z_next;

        let ax = &problem.a * &x;
        let px = &problem.p * &x;
        let aty = &at * &y;
        primal = inf_norm(&(&ax - &z));
        dual = inf_norm(&(&px + &problem.q + &aty));

        let primal_scale = inf_norm(&ax).max(inf_norm(&z));
        let dual_scale = inf_norm(&px).max(inf_norm(&aty)).max(inf_norm(&problem.q));
        let eps_primal = settings.eps_abs + settings.eps_rel * primal_scale;
        let eps_dual = settings.eps_abs + settings.eps_rel * dual_scale;

        if !primal.is_finite() || !dual.is_finite() {
            break;
        }
        if primal <= eps_primal && dual <= eps_dual {
            trace!(iteration, primal, dual, rho, "admm converged");
            return Ok(QpSolution {
                x,
                y,
                iterations: iteration,
                primal_residual: primal,
                dual_residual: dual,
            });
        }

        if settings.adaptive_rho_interval > 0 && iteration % settings.adaptive_rho_interval == 0 {
            let primal_norm = primal / primal_scale.max(f64::MIN_POSITIVE);
            let dual_norm = dual / dual_scale.max(f64::MIN_POSITIVE);
            let proposed =
                (rho * (primal_norm / dual_norm.max(f64::MIN_POSITIVE)).sqrt()).clamp(RHO_MIN, RHO_MAX);
            if proposed > rho * RHO_ADAPT_THRESHOLD || proposed < rho / RHO_ADAPT_THRESHOLD {
                rho = proposed;
                rho_vec = problem.rho_vector(rho, settings.equality_rho_scale);
                chol = problem.factor(&rho_vec, settings.sigma)?;
            }
        }
    }

    Err(LittermanError::Optimization {
        solver: SOLVER_NAME.into(),
        iterations: settings.max_iterations,
        last_residual: primal.max(dual),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
