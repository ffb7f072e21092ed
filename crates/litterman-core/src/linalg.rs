//! Thin wrappers over `nalgebra` for the symmetric matrices that flow
//! through the pipeline (covariances, precision matrices, view
//! uncertainty). Every inverse goes through here so singularity is always
//! reported as [`LittermanError::SingularMatrix`].

use nalgebra::{DMatrix, DVector, SymmetricEigen};

use crate::error::LittermanError;
use crate::LittermanResult;

/// Reciprocal condition number below which a symmetric matrix is treated
/// as singular.
pub const RCOND_FLOOR: f64 = 1e-12;

/// (A + Aᵀ) / 2
pub fn symmetrize(m: &DMatrix<f64>) -> DMatrix<f64> {
    (m + m.transpose()) * 0.5
}

pub fn all_finite(m: &DMatrix<f64>) -> bool {
    m.iter().all(|v| v.is_finite())
}

pub fn vector_finite(v: &DVector<f64>) -> bool {
    v.iter().all(|x| x.is_finite())
}

/// Eigenvalues of the symmetric part of `m`, ascending.
pub fn symmetric_eigenvalues(m: &DMatrix<f64>) -> Vec<f64> {
    if m.nrows() == 0 {
        return Vec::new();
    }
    let eigen = SymmetricEigen::new(symmetrize(m));
    let mut values: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

pub fn min_eigenvalue(m: &DMatrix<f64>) -> Option<f64> {
    symmetric_eigenvalues(m).first().copied()
}

/// Replace negative eigenvalues with zero and rebuild the matrix.
pub fn clip_to_psd(m: &DMatrix<f64>) -> DMatrix<f64> {
    let eigen = SymmetricEigen::new(symmetrize(m));
    let clipped = eigen.eigenvalues.map(|l| l.max(0.0));
    let v = &eigen.eigenvectors;
    symmetrize(&(v * DMatrix::from_diagonal(&clipped) * v.transpose()))
}

/// Inverse of a symmetric matrix through its eigendecomposition.
///
/// Fails when the matrix is empty of information (all-zero) or its
/// reciprocal condition number falls under [`RCOND_FLOOR`].
pub fn invert_symmetric(m: &DMatrix<f64>, context: &str) -> LittermanResult<DMatrix<f64>> {
    let n = m.nrows();
    if n != m.ncols() {
        return Err(LittermanError::InvalidInput {
            field: context.into(),
            reason: format!("expected a square matrix, got {}x{}", n, m.ncols()),
        });
    }
    if n == 0 {
        return Ok(DMatrix::zeros(0, 0));
    }
    if !all_finite(m) {
        return Err(LittermanError::SingularMatrix {
            context: format!("{} (non-finite entries)", context),
        });
    }

    let eigen = SymmetricEigen::new(symmetrize(m));
    let max_abs = eigen
        .eigenvalues
        .iter()
        .fold(0.0_f64, |acc, l| acc.max(l.abs()));
    let min_abs = eigen
        .eigenvalues
        .iter()
        .fold(f64::INFINITY, |acc, l| acc.min(l.abs()));

    if max_abs == 0.0 || min_abs / max_abs < RCOND_FLOOR {
        return Err(LittermanError::SingularMatrix {
            context: context.into(),
        });
    }

    let inv_diag = eigen.eigenvalues.map(|l| 1.0 / l);
    let v = &eigen.eigenvectors;
    Ok(symmetrize(
        &(v * DMatrix::from_diagonal(&inv_diag) * v.transpose()),
    ))
}
