//! Error types for structured error handling.
//!
//! This module provides:
//! - `DualError`: Errors from AD scalar queries
//! - `CurrencyError`: Errors from currency parsing
//! - `LinalgError`: Errors from dense linear solves
//! - `PricingError`: Errors from instrument rate evaluation

use thiserror::Error;

use crate::market_data::{CurveError, FxError};

/// Errors raised when querying derivatives of a [`Dual`](super::Dual).
///
/// # Examples
/// ```
/// use calib_core::types::DualError;
///
/// let err = DualError::SecondOrderUnavailable;
/// assert!(format!("{}", err).contains("second-order"));
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DualError {
    /// A Hessian was requested from a first-order scalar.
    #[error("second-order derivatives requested from a first-order dual number")]
    SecondOrderUnavailable,
}

/// Currency-related errors.
///
/// # Examples
/// ```
/// use calib_core::types::CurrencyError;
///
/// let err = CurrencyError::UnknownCurrency("XYZ".to_string());
/// assert_eq!(format!("{}", err), "Unknown currency code: XYZ");
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CurrencyError {
    /// Unknown or unsupported ISO 4217 currency code.
    #[error("Unknown currency code: {0}")]
    UnknownCurrency(String),
}

/// Errors from dense linear solves.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinalgError {
    /// Operand dimensions do not agree.
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Expected dimension
        expected: usize,
        /// Supplied dimension
        got: usize,
    },

    /// The system matrix could not be factorised.
    #[error("Singular matrix of size {size}")]
    Singular {
        /// Number of rows of the square matrix
        size: usize,
    },

    /// The singular value decomposition did not produce a pseudo-inverse.
    #[error("Pseudo-inverse failed: {0}")]
    PseudoInverse(String),
}

impl LinalgError {
    /// Create a dimension mismatch error.
    pub fn dimension_mismatch(expected: usize, got: usize) -> Self {
        Self::DimensionMismatch { expected, got }
    }

    /// Create a singular matrix error.
    pub fn singular(size: usize) -> Self {
        Self::Singular { size }
    }

    /// Check if this is a singular matrix error.
    pub fn is_singular(&self) -> bool {
        matches!(self, Self::Singular { .. })
    }
}

/// Errors raised while evaluating an instrument rate.
///
/// # Examples
/// ```
/// use calib_core::types::PricingError;
///
/// let err = PricingError::missing_curve("usd_ois");
/// assert!(err.is_missing_curve());
/// assert!(format!("{}", err).contains("usd_ois"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PricingError {
    /// No curve with the requested identifier is visible from the pricing context.
    #[error("Curve '{0}' is not available in the pricing context")]
    MissingCurve(String),

    /// The instrument needs FX rates but the context carries none.
    #[error("No FX rates available in the pricing context")]
    MissingFx,

    /// A required keyword parameter was not supplied.
    #[error("Missing pricing parameter '{0}'")]
    MissingParameter(String),

    /// Instrument definition is invalid.
    #[error("Invalid instrument: {0}")]
    InvalidInstrument(String),

    /// Wrapped curve evaluation error.
    #[error("Curve error: {0}")]
    Curve(#[from] CurveError),

    /// Wrapped FX error.
    #[error("FX error: {0}")]
    Fx(#[from] FxError),
}

impl PricingError {
    /// Create a missing curve error.
    pub fn missing_curve(id: impl Into<String>) -> Self {
        Self::MissingCurve(id.into())
    }

    /// Create an invalid instrument error.
    pub fn invalid_instrument(message: impl Into<String>) -> Self {
        Self::InvalidInstrument(message.into())
    }

    /// Check if this is a missing curve error.
    pub fn is_missing_curve(&self) -> bool {
        matches!(self, Self::MissingCurve(_))
    }

    /// Check if this is a missing FX error.
    pub fn is_missing_fx(&self) -> bool {
        matches!(self, Self::MissingFx)
    }
}
