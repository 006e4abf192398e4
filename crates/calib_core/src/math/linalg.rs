//! Dense linear algebra on `nalgebra` matrices.

use nalgebra::DMatrix;
use num_traits::Zero;

use crate::types::{Dual, LinalgError};

/// Solve `A X = B` for square `A` by LU decomposition.
///
/// # Errors
///
/// Returns [`LinalgError::DimensionMismatch`] for non-conforming operands and
/// [`LinalgError::Singular`] when `A` cannot be factorised.
///
/// # Examples
///
/// ```
/// use calib_core::math::solve;
/// use nalgebra::DMatrix;
///
/// let a = DMatrix::from_row_slice(2, 2, &[2.0, 0.0, 0.0, 4.0]);
/// let b = DMatrix::from_row_slice(2, 1, &[1.0, 1.0]);
/// let x = solve(&a, &b).unwrap();
/// assert!((x[(1, 0)] - 0.25).abs() < 1e-15);
/// ```
pub fn solve(a: &DMatrix<f64>, b: &DMatrix<f64>) -> Result<DMatrix<f64>, LinalgError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(LinalgError::dimension_mismatch(n, a.ncols()));
    }
    if b.nrows() != n {
        return Err(LinalgError::dimension_mismatch(n, b.nrows()));
    }
    a.clone().lu().solve(b).ok_or(LinalgError::singular(n))
}

/// Moore-Penrose pseudo-inverse via SVD.
///
/// Singular values below `max(rows, cols) * eps * sigma_max` are treated as zero.
///
/// # Errors
///
/// Returns [`LinalgError::PseudoInverse`] if the decomposition fails.
pub fn pseudo_inverse(m: &DMatrix<f64>) -> Result<DMatrix<f64>, LinalgError> {
    let svd = m.clone().svd(true, true);
    let sigma_max = svd.singular_values.iter().copied().fold(0.0, f64::max);
    let tol = m.nrows().max(m.ncols()) as f64 * f64::EPSILON * sigma_max;
    svd.pseudo_inverse(tol)
        .map_err(|e| LinalgError::PseudoInverse(e.to_string()))
}

/// Solve `A x = b` where `b` carries derivatives.
///
/// `A` is real, so `x = A⁻¹ b` is a linear combination of the entries of
/// `b` and inherits their derivatives exactly.
///
/// # Errors
///
/// Returns [`LinalgError::DimensionMismatch`] or [`LinalgError::Singular`].
///
/// # Examples
///
/// ```
/// use calib_core::math::dual_solve;
/// use calib_core::types::Dual;
/// use nalgebra::DMatrix;
///
/// let a = DMatrix::from_row_slice(2, 2, &[1.0, 1.0, 0.0, 2.0]);
/// let b = vec![Dual::variable(3.0, "s0"), Dual::variable(2.0, "s1")];
/// let x = dual_solve(&a, &b).unwrap();
/// assert!((x[0].real() - 2.0).abs() < 1e-14);
/// assert_eq!(x[0].gradient(&["s0", "s1"]), vec![1.0, -0.5]);
/// ```
pub fn dual_solve(a: &DMatrix<f64>, b: &[Dual]) -> Result<Vec<Dual>, LinalgError> {
    let n = a.nrows();
    if a.ncols() != n {
        return Err(LinalgError::dimension_mismatch(n, a.ncols()));
    }
    if b.len() != n {
        return Err(LinalgError::dimension_mismatch(n, b.len()));
    }
    let inv = a.clone().lu().try_inverse().ok_or(LinalgError::singular(n))?;
    Ok((0..n)
        .map(|i| {
            (0..n)
                .filter(|&j| !inv[(i, j)].is_zero())
                .map(|j| &b[j] * inv[(i, j)])
                .sum()
        })
        .collect())
}

/// Matrix of first derivatives `M[i, j] = ∂values[j] / ∂vars[i]`.
///
/// Rows follow `vars`, columns follow `values`.
pub fn gradient_matrix<S: AsRef<str>>(values: &[Dual], vars: &[S]) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(vars.len(), values.len());
    for (j, value) in values.iter().enumerate() {
        for (i, g) in value.gradient(vars).into_iter().enumerate() {
            out[(i, j)] = g;
        }
    }
    out
}
