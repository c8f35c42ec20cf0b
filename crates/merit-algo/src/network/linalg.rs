//! Dense linear algebra with singular-matrix fallbacks.
//!
//! The reduced susceptance matrix is singular when the network is split into
//! islands. Neither inversion nor angle recovery treats that as an error:
//! inversion falls back to the Moore–Penrose pseudo-inverse and linear solves
//! fall back to SVD least squares.

use nalgebra::{DMatrix, DVector};
use tracing::warn;

/// Singular values below this are treated as zero by the fallbacks.
const SVD_EPS: f64 = 1e-10;

/// How a matrix operation was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Factorization {
    /// LU succeeded
    Direct,
    /// Matrix was singular; pseudo-inverse or least squares used
    Fallback,
}

fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite())
}

/// Inverse of `matrix`, or its pseudo-inverse when singular.
pub fn invert_or_pinv(matrix: &DMatrix<f64>) -> (DMatrix<f64>, Factorization) {
    if let Some(inv) = matrix.clone().try_inverse() {
        if all_finite(inv.as_slice()) {
            return (inv, Factorization::Direct);
        }
    }

    warn!(
        dim = matrix.nrows(),
        "reduced susceptance matrix is singular; using pseudo-inverse"
    );
    let pinv = matrix
        .clone()
        .pseudo_inverse(SVD_EPS)
        .unwrap_or_else(|_| DMatrix::zeros(matrix.ncols(), matrix.nrows()));
    (pinv, Factorization::Fallback)
}

/// Solve `matrix · x = rhs`, falling back to least squares when singular.
pub fn solve_or_lstsq(matrix: &DMatrix<f64>, rhs: &DVector<f64>) -> (DVector<f64>, Factorization) {
    if let Some(x) = matrix.clone().lu().solve(rhs) {
        if all_finite(x.as_slice()) {
            return (x, Factorization::Direct);
        }
    }

    warn!(
        dim = matrix.nrows(),
        "angle system is singular; using least-squares solution"
    );
    let x = matrix
        .clone()
        .svd(true, true)
        .solve(rhs, SVD_EPS)
        .unwrap_or_else(|_| DVector::zeros(matrix.ncols()));
    (x, Factorization::Fallback)
}
