//! Market data error types.
//!
//! This module provides structured error handling for curve construction,
//! node mutation and FX rate lookups.

use thiserror::Error;

use crate::types::{Currency, CurrencyError};

/// Curve construction and mutation errors.
///
/// # Examples
///
/// ```
/// use calib_core::market_data::CurveError;
///
/// let err = CurveError::node_index_out_of_range("usd", 5, 3);
/// assert!(err.is_node_index_out_of_range());
/// assert!(format!("{}", err).contains("usd"));
/// ```
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CurveError {
    /// Node index beyond the curve's node count.
    #[error("Node index {index} out of range for curve '{curve}' with {len} nodes")]
    NodeIndexOutOfRange {
        /// Curve identifier
        curve: String,
        /// Requested node index
        index: usize,
        /// Number of nodes on the curve
        len: usize,
    },

    /// Node layout is unusable.
    #[error("Invalid nodes for curve '{curve}': {reason}")]
    InvalidNodes {
        /// Curve identifier
        curve: String,
        /// What is wrong with the nodes
        reason: String,
    },

    /// Query point outside the curve's domain.
    #[error("Invalid abscissa for curve '{curve}': x = {x}")]
    InvalidAbscissa {
        /// Curve identifier
        curve: String,
        /// The offending query point
        x: f64,
    },
}

impl CurveError {
    /// Create a node index out of range error.
    pub fn node_index_out_of_range(curve: impl Into<String>, index: usize, len: usize) -> Self {
        Self::NodeIndexOutOfRange {
            curve: curve.into(),
            index,
            len,
        }
    }

    /// Create an invalid nodes error.
    pub fn invalid_nodes(curve: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodes {
            curve: curve.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a node index out of range error.
    pub fn is_node_index_out_of_range(&self) -> bool {
        matches!(self, Self::NodeIndexOutOfRange { .. })
    }

    /// Check if this is an invalid nodes error.
    pub fn is_invalid_nodes(&self) -> bool {
        matches!(self, Self::InvalidNodes { .. })
    }
}

/// FX rate lookup errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FxError {
    /// Pair string is not two concatenated currency codes.
    #[error("Invalid FX pair '{0}'")]
    InvalidPair(String),

    /// No direct, inverse or one-hop cross route between the currencies.
    #[error("No FX route from {lhs} to {rhs}")]
    NoRoute {
        /// Base currency
        lhs: Currency,
        /// Quote currency
        rhs: Currency,
    },

    /// Wrapped currency parsing error.
    #[error("Currency error: {0}")]
    Currency(#[from] CurrencyError),
}

impl FxError {
    /// Create a no route error.
    pub fn no_route(lhs: Currency, rhs: Currency) -> Self {
        Self::NoRoute { lhs, rhs }
    }

    /// Check if this is a no route error.
    pub fn is_no_route(&self) -> bool {
        matches!(self, Self::NoRoute { .. })
    }
}
