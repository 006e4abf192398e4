//! Weighted least-squares objective.

use calib_core::types::Dual;

/// Errors `x_i = r_i − s_i`.
pub fn errors(rates: &[Dual], targets: &[Dual]) -> Vec<Dual> {
    rates.iter().zip(targets).map(|(r, s)| r - s).collect()
}

/// Objective `f = Σ_i w_i x_i²`, carrying the derivatives of the errors.
///
/// # Examples
///
/// ```
/// use calib_core::types::Dual;
/// use calib_optimiser::objective::objective;
///
/// let x = vec![Dual::variable(2.0, "v"), Dual::constant(1.0)];
/// let f = objective(&x, &[1.0, 3.0]);
/// assert_eq!(f.real(), 7.0);
/// assert_eq!(f.gradient(&["v"]), vec![4.0]);
/// ```
pub fn objective(errors: &[Dual], weights: &[f64]) -> Dual {
    errors
        .iter()
        .zip(weights)
        .filter(|(_, w)| **w != 0.0)
        .map(|(x, w)| x * x * *w)
        .sum()
}
