//! Risk aggregation errors.

use calib_core::market_data::FxError;
use calib_core::types::{Currency, DualError};
use calib_optimiser::SolverError;
use thiserror::Error;

/// Errors raised while building risk reports.
///
/// # Examples
///
/// ```
/// use calib_core::types::Currency;
/// use calib_risk::RiskError;
///
/// let err = RiskError::missing_fx(Currency::USD);
/// assert!(err.is_missing_fx());
/// assert!(err.to_string().contains("USD"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    /// A base currency was requested but neither the caller nor the solver
    /// chain supplies FX rates.
    #[error("Base currency {base} requested but no FX source is available")]
    MissingFx {
        /// Requested reporting currency
        base: Currency,
    },

    /// Wrapped solver error.
    #[error("Solver error: {0}")]
    Solver(#[from] SolverError),

    /// Wrapped FX error.
    #[error("FX error: {0}")]
    Fx(#[from] FxError),

    /// Wrapped AD error.
    #[error("Dual error: {0}")]
    Dual(#[from] DualError),
}

impl RiskError {
    /// Create a missing FX error.
    pub fn missing_fx(base: Currency) -> Self {
        Self::MissingFx { base }
    }

    /// Check if this is a missing FX error.
    pub fn is_missing_fx(&self) -> bool {
        matches!(self, Self::MissingFx { .. })
    }

    /// Check if the underlying cause is a differentiation order mismatch.
    pub fn is_ad_order_required(&self) -> bool {
        matches!(self, Self::Solver(e) if e.is_ad_order_required())
    }
}
