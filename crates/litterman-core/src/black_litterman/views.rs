//! Investor views and their uncertainty.
//!
//! A [`ViewSet`] is the pick matrix P (k x n), the view vector Q (k) and
//! the rule that produces the uncertainty matrix Ω. Columns of P follow
//! the symbol order of the covariance the views are blended against.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::LittermanError;
use crate::linalg;
use crate::types::{matrix_serde, Rate, Symbol};
use crate::LittermanResult;

/// Ω entry used for a view held with zero confidence.
pub const ZERO_CONFIDENCE_OMEGA: f64 = 1e6;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single view expressed on symbols rather than matrix rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum View {
    /// `symbol` will return `expected_return` (annual).
    Absolute {
        symbol: Symbol,
        expected_return: Rate,
    },
    /// `long` will outperform `short` by `expected_return` (annual).
    Relative {
        long: Symbol,
        short: Symbol,
        expected_return: Rate,
    },
}

/// How Ω is derived for a view set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ViewUncertainty {
    /// Ω = diag(τ P Σ Pᵀ) (He & Litterman).
    #[default]
    Proportional,
    /// Per-view confidence in [0, 1] (Idzorek's percentage method).
    Idzorek { confidences: Vec<f64> },
    /// Explicit k x k Ω.
    Matrix {
        #[serde(with = "matrix_serde")]
        omega: DMatrix<f64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSet {
    pub symbols: Vec<Symbol>,
    #[serde(with = "matrix_serde")]
    pub pick: DMatrix<f64>,
    #[serde(with = "matrix_serde::vector")]
    pub q: DVector<f64>,
    #[serde(default)]
    pub uncertainty: ViewUncertainty,
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

impl ViewSet {
    /// No views over `symbols`; blending returns the prior unchanged.
    pub fn empty(symbols: &[Symbol]) -> Self {
        Self {
            symbols: symbols.to_vec(),
            pick: DMatrix::zeros(0, symbols.len()),
            q: DVector::zeros(0),
            uncertainty: ViewUncertainty::Proportional,
        }
    }

    pub fn new(
        symbols: Vec<Symbol>,
        pick: DMatrix<f64>,
        q: DVector<f64>,
        uncertainty: ViewUncertainty,
    ) -> LittermanResult<Self> {
        let set = Self {
            symbols,
            pick,
            q,
            uncertainty,
        };
        set.validate()?;
        Ok(set)
    }

    /// Map typed views onto `symbols` order.
    pub fn from_views(
        symbols: &[Symbol],
        views: &[View],
        uncertainty: ViewUncertainty,
    ) -> LittermanResult<Self> {
        let n = symbols.len();
        let column = |s: &str| -> LittermanResult<usize> {
            symbols.iter().position(|x| x == s).ok_or_else(|| {
                LittermanError::Alignment(format!("View references {} which is not in the universe", s))
            })
        };

        let mut pick = DMatrix::zeros(views.len(), n);
        let mut q = DVector::zeros(views.len());
        for (row, view) in views.iter().enumerate() {
            match view {
                View::Absolute {
                    symbol,
                    expected_return,
                } => {
                    pick[(row, column(symbol)?)] = 1.0;
                    q[row] = *expected_return;
                }
                View::Relative {
                    long,
                    short,
                    expected_return,
                } => {
                    if long == short {
                        return Err(LittermanError::InvalidInput {
                            field: format!("views[{}]", row),
                            reason: format!("Relative view pits {} against itself", long),
                        });
                    }
                    pick[(row, column(long)?)] = 1.0;
                    pick[(row, column(short)?)] = -1.0;
                    q[row] = *expected_return;
                }
            }
        }

        Self::new(symbols.to_vec(), pick, q, uncertainty)
    }

    pub fn len(&self) -> usize {
        self.q.len()
    }

    pub fn is_empty(&self) -> bool {
        self.q.is_empty()
    }

    /// Shape and value checks independent of any covariance.
    pub fn validate(&self) -> LittermanResult<()> {
        let k = self.q.len();
        if self.pick.nrows() != k {
            return Err(LittermanError::Alignment(format!(
                "Pick matrix has {} rows but {} view returns",
                self.pick.nrows(),
                k
            )));
        }
        if self.pick.ncols() != self.symbols.len() {
            return Err(LittermanError::Alignment(format!(
                "Pick matrix has {} columns but {} symbols",
                self.pick.ncols(),
                self.symbols.len()
            )));
        }
        if !linalg::all_finite(&self.pick) || !linalg::vector_finite(&self.q) {
            return Err(LittermanError::InvalidInput {
                field: "views".into(),
                reason: "P and Q must be finite".into(),
            });
        }
        match &self.uncertainty {
            ViewUncertainty::Proportional => {}
            ViewUncertainty::Idzorek { confidences } => {
                if confidences.len() != k {
                    return Err(LittermanError::Alignment(format!(
                        "{} confidences for {} views",
                        confidences.len(),
                        k
                    )));
                }
                if let Some((i, c)) = confidences
                    .iter()
                    .enumerate()
                    .find(|(_, c)| !(0.0..=1.0).contains(*c))
                {
                    return Err(LittermanError::InvalidInput {
                        field: format!("confidences[{}]", i),
                        reason: format!("Must be in [0, 1], got {}", c),
                    });
                }
            }
            ViewUncertainty::Matrix { omega } => {
                if omega.nrows() != k || omega.ncols() != k {
                    return Err(LittermanError::Alignment(format!(
                        "Omega is {}x{} but there are {} views",
                        omega.nrows(),
                        omega.ncols(),
                        k
                    )));
                }
                if !linalg::all_finite(omega) || omega.diagonal().iter().any(|v| *v < 0.0) {
                    return Err(LittermanError::InvalidInput {
                        field: "omega".into(),
                        reason: "Must be finite with a non-negative diagonal".into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Views must be expressed on exactly `symbols`, in the same order.
    pub fn check_alignment(&self, symbols: &[Symbol]) -> LittermanResult<()> {
        if self.symbols.as_slice() != symbols {
            return Err(LittermanError::Alignment(format!(
                "Views are over [{}] but the covariance is over [{}]",
                self.symbols.join(", "),
                symbols.join(", ")
            )));
        }
        Ok(())
    }

    /// Ω for these views against covariance `cov` and scalar `tau`.
    pub fn omega(&self, cov: &DMatrix<f64>, tau: f64) -> DMatrix<f64> {
        let k = self.len();
        let view_variance = |i: usize| -> f64 {
            let p_i = self.pick.row(i);
            (p_i * cov * p_i.transpose())[(0, 0)]
        };
        match &self.uncertainty {
            ViewUncertainty::Proportional => {
                DMatrix::from_fn(k, k, |i, j| if i == j { tau * view_variance(i) } else { 0.0 })
            }
            ViewUncertainty::Idzorek { confidences } => DMatrix::from_fn(k, k, |i, j| {
                if i != j {
                    0.0
                } else if confidences[i] == 0.0 {
                    ZERO_CONFIDENCE_OMEGA
                } else {
                    let alpha = (1.0 - confidences[i]) / confidences[i];
                    tau * alpha * view_variance(i)
                }
            }),
            ViewUncertainty::Matrix { omega } => omega.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
