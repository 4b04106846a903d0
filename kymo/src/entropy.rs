//! Spectral entropy reduction of self-similarity matrices.
//!
//! Reduces an MxM symmetric similarity matrix to a single scalar describing
//! how mutually similar its M constituent frames are. The matrix of M
//! near-identical frames has one dominant eigenvalue (~M) and entropy near
//! the minimum; mutually dissimilar frames spread the spectrum and push the
//! entropy toward the maximum.

use crate::error::KymoError;
use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::Array2;

/// Eigenvalues of a symmetric matrix in ascending order.
///
/// Fails with [`KymoError::Numerical`] when the decomposition yields
/// non-finite values; for well-formed symmetric similarity matrices this
/// does not happen in practice and is treated as fatal rather than retried.
pub fn symmetric_eigenvalues(matrix: &Array2<f64>) -> Result<Vec<f64>, KymoError> {
    let (rows, cols) = matrix.dim();
    if rows != cols {
        return Err(KymoError::Numerical(format!(
            "expected square matrix, got {rows}x{cols}"
        )));
    }
    if matrix.iter().any(|v| !v.is_finite()) {
        return Err(KymoError::Numerical(
            "matrix contains non-finite entries".into(),
        ));
    }

    let na_matrix = DMatrix::from_fn(rows, cols, |i, j| matrix[[i, j]]);
    let eigen = SymmetricEigen::new(na_matrix);

    let mut eigenvalues: Vec<f64> = eigen.eigenvalues.iter().copied().collect();
    if eigenvalues.iter().any(|v| !v.is_finite()) {
        return Err(KymoError::Numerical(
            "eigen-decomposition produced non-finite eigenvalues".into(),
        ));
    }
    eigenvalues.sort_by(|a, b| a.partial_cmp(b).expect("finite eigenvalues"));
    Ok(eigenvalues)
}

/// Shannon entropy of the normalized eigenvalue spectrum, scaled to \[0,1\].
///
/// `H = -sum(p_i * ln p_i) / ln(M)` with `p_i = max(lambda_i, 0) / sum`.
/// An all-ones matrix (identical frames) gives 0.0; an identity matrix
/// (mutually orthogonal signals) gives 1.0. Continuous in the matrix
/// entries and deterministic.
pub fn spectral_entropy(matrix: &Array2<f64>) -> Result<f64, KymoError> {
    let m = matrix.nrows();
    if m < 2 {
        return Err(KymoError::Numerical(format!(
            "spectral entropy needs a matrix of order >= 2, got {m}"
        )));
    }

    let eigenvalues = symmetric_eigenvalues(matrix)?;
    let clamped: Vec<f64> = eigenvalues.iter().map(|&v| v.max(0.0)).collect();
    let total: f64 = clamped.iter().sum();
    if total <= 0.0 {
        return Err(KymoError::Numerical(
            "eigenvalue spectrum has no positive mass".into(),
        ));
    }

    let mut entropy = 0.0;
    for &lambda in &clamped {
        let p = lambda / total;
        if p > 1e-300 {
            entropy -= p * p.ln();
        }
    }
    Ok(entropy / (m as f64).ln())
}
