//! Solver error types.
//!
//! Structured errors for solver construction, iteration and sensitivity
//! requests, wrapping the lower-level core errors.

use calib_core::market_data::{CurveError, FxError};
use calib_core::types::{AdOrder, DualError, LinalgError, PricingError};
use thiserror::Error;

/// Errors raised by the calibration solver.
///
/// # Examples
///
/// ```
/// use calib_optimiser::SolverError;
///
/// let err = SolverError::length_mismatch("weights", 3, 2);
/// assert!(err.is_length_mismatch());
/// assert!(format!("{}", err).contains("weights"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SolverError {
    /// An input sequence does not match the instrument count.
    #[error("Length mismatch for {what}: expected {expected}, got {got}")]
    LengthMismatch {
        /// Which input is mis-sized
        what: &'static str,
        /// Expected length
        expected: usize,
        /// Supplied length
        got: usize,
    },

    /// The same curve identifier appears twice across the dependency chain.
    #[error("Duplicate curve id '{0}' across the solver dependency chain")]
    DuplicateCurveId(String),

    /// Algorithm name not recognised.
    #[error(
        "Unknown algorithm '{0}': expected gradient_descent, gauss_newton or levenberg_marquardt"
    )]
    UnknownAlgorithm(String),

    /// A quantity needs a different differentiation order than the solver carries.
    #[error("Differentiation order {required} required but solver is at order {current}")]
    AdOrderRequired {
        /// Order needed
        required: AdOrder,
        /// Order currently set
        current: AdOrder,
    },

    /// A weight is negative or not finite.
    #[error("Invalid weight {weight} at index {index}")]
    InvalidWeight {
        /// Position of the weight
        index: usize,
        /// The offending value
        weight: f64,
    },

    /// Iteration budget exhausted, raised only on explicit request.
    #[error("Not converged after {iterations} iterations: objective = {objective}")]
    NotConverged {
        /// Iterations performed
        iterations: usize,
        /// Final objective value
        objective: f64,
    },

    /// Wrapped instrument pricing error.
    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    /// Wrapped linear algebra error.
    #[error("Linear algebra error: {0}")]
    Linalg(#[from] LinalgError),

    /// Wrapped AD error.
    #[error("Dual error: {0}")]
    Dual(#[from] DualError),

    /// Wrapped curve error.
    #[error("Curve error: {0}")]
    Curve(#[from] CurveError),

    /// Wrapped FX error.
    #[error("FX error: {0}")]
    Fx(#[from] FxError),
}

impl SolverError {
    /// Create a length mismatch error.
    pub fn length_mismatch(what: &'static str, expected: usize, got: usize) -> Self {
        Self::LengthMismatch {
            what,
            expected,
            got,
        }
    }

    /// Create a differentiation order error.
    pub fn ad_order_required(required: AdOrder, current: AdOrder) -> Self {
        Self::AdOrderRequired { required, current }
    }

    /// Create an unknown algorithm error.
    pub fn unknown_algorithm(name: impl Into<String>) -> Self {
        Self::UnknownAlgorithm(name.into())
    }

    /// Check if this is a length mismatch error.
    pub fn is_length_mismatch(&self) -> bool {
        matches!(self, Self::LengthMismatch { .. })
    }

    /// Check if this is a duplicate curve error.
    pub fn is_duplicate_curve_id(&self) -> bool {
        matches!(self, Self::DuplicateCurveId(_))
    }

    /// Check if this is a differentiation order error.
    pub fn is_ad_order_required(&self) -> bool {
        matches!(self, Self::AdOrderRequired { .. })
    }

    /// Check if this is a non-convergence error.
    pub fn is_not_converged(&self) -> bool {
        matches!(self, Self::NotConverged { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========================================
    // Display Tests
    // ========================================

    #[test]
    fn test_length_mismatch_display() {
        let err = SolverError::length_mismatch("targets", 4, 3);
        let display = format!("{}", err);
        assert!(display.contains("targets"));
        assert!(display.contains("4"));
        assert!(display.contains("3"));
    }

    #[test]
    fn test_unknown_algorithm_names_value() {
        let err = SolverError::unknown_algorithm("newton_raphson");
        assert!(format!("{}", err).contains("newton_raphson"));
    }

    #[test]
    fn test_ad_order_display() {
        let err = SolverError::ad_order_required(AdOrder::Two, AdOrder::One);
        assert!(err.is_ad_order_required());
        assert_eq!(
            format!("{}", err),
            "Differentiation order 2 required but solver is at order 1"
        );
    }

    #[test]
    fn test_duplicate_curve_display() {
        let err = SolverError::DuplicateCurveId("usd".into());
        assert!(err.is_duplicate_curve_id());
        assert!(!err.is_length_mismatch());
        assert!(format!("{}", err).contains("usd"));
    }

    // ========================================
    // From Trait Tests
    // ========================================

    #[test]
    fn test_from_pricing_error() {
        let err: SolverError = PricingError::missing_curve("eur").into();
        assert!(matches!(err, SolverError::Pricing(PricingError::MissingCurve(_))));
    }

    #[test]
    fn test_from_dual_error() {
        let err: SolverError = DualError::SecondOrderUnavailable.into();
        assert!(matches!(err, SolverError::Dual(_)));
    }

    #[test]
    fn test_clone_and_equality() {
        let err1 = SolverError::NotConverged {
            iterations: 100,
            objective: 1e-3,
        };
        let err2 = err1.clone();
        assert_eq!(err1, err2);
        assert!(err1.is_not_converged());
    }
}
