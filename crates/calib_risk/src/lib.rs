//! # calib_risk
//!
//! Risk reports built on calibrated solvers.
//!
//! Once a [`Solver`] has converged, the sensitivities of its curve nodes to
//! the calibrating quotes turn the curve-variable derivatives carried by any
//! valuation into risk against market instruments:
//!
//! - delta per basis point to every instrument in the dependency chain, and
//!   per pip to FX quotes
//! - cross-gamma between instruments (solver at differentiation order two)
//! - the Jacobian between two solvers' instrument sets
//!
//! ## Architecture Position
//!
//! Layer 3 of the calibration stack. Depends on `calib_core` (L1) and
//! `calib_optimiser` (L2).
//!
//! ## Example
//!
//! ```rust
//! use calib_core::instruments::{PricingArgs, Value, ZeroRate};
//! use calib_core::market_data::NodeCurve;
//! use calib_core::types::Currency;
//! use calib_optimiser::Solver;
//! use calib_risk::{Bucket, SolverRisk, Valuation};
//!
//! let curve = NodeCurve::discount("usd", vec![0.0, 1.0, 2.0], vec![1.0, 0.99, 0.98]).unwrap();
//! let solver = Solver::builder()
//!     .curve(curve)
//!     .instrument(ZeroRate::new("usd", 1.0))
//!     .instrument(ZeroRate::new("usd", 2.0))
//!     .targets(vec![3.0, 3.5])
//!     .build()
//!     .unwrap();
//!
//! let df = solver.price(&Value::new("usd", 2.0), &PricingArgs::new()).unwrap();
//! let npv = Valuation::single(Currency::USD, df * 1_000_000.0);
//! let delta = solver.delta(&npv, None, None).unwrap();
//!
//! let risk = delta.instruments(Bucket::Local(Currency::USD), Currency::USD).unwrap();
//! assert_eq!(risk.len(), 2);
//! assert!(risk[1] < 0.0);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: serialisation of reports

#![deny(missing_docs)]

pub mod report;
pub mod valuation;

mod delta;
mod error;
mod gamma;
mod jacobian;

pub use delta::FX_SCALAR;
pub use error::RiskError;
pub use report::{
    Bucket, DeltaColumn, DeltaReport, GammaBlock, GammaReport, JacobianReport, RiskFactor,
};
pub use valuation::Valuation;

use calib_core::market_data::FxSource;
use calib_core::types::Currency;
use calib_optimiser::Solver;

/// Risk reports on a calibrated solver.
pub trait SolverRisk {
    /// First-order risk of `valuation` to every instrument of the chain and
    /// to FX quotes.
    ///
    /// Each currency bucket yields a local column. With `base`, buckets in
    /// other currencies are also converted into `base`, and an
    /// [`Bucket::All`] column sums everything displayed in `base`. A supplied
    /// `fx` takes precedence over the solver's own.
    ///
    /// # Errors
    ///
    /// Returns [`RiskError::MissingFx`] when `base` is given but no FX source
    /// is available; propagates solver and FX failures.
    fn delta(
        &self,
        valuation: &Valuation,
        base: Option<Currency>,
        fx: Option<&dyn FxSource>,
    ) -> Result<DeltaReport, RiskError>;

    /// Instrument cross-gamma of `valuation`.
    ///
    /// # Errors
    ///
    /// Fails unless the solver is at differentiation order two; otherwise as
    /// [`SolverRisk::delta`].
    fn gamma(
        &self,
        valuation: &Valuation,
        base: Option<Currency>,
        fx: Option<&dyn FxSource>,
    ) -> Result<GammaReport, RiskError>;

    /// Sensitivity of this solver's instruments to `other`'s.
    ///
    /// Re-targets this solver to its own instruments priced under `other`
    /// and re-solves before differentiating, so the solver is left
    /// calibrated to `other`'s market.
    ///
    /// # Errors
    ///
    /// Propagates pricing and solver failures.
    fn jacobian(&mut self, other: &Solver) -> Result<JacobianReport, RiskError>;
}

impl SolverRisk for Solver {
    fn delta(
        &self,
        valuation: &Valuation,
        base: Option<Currency>,
        fx: Option<&dyn FxSource>,
    ) -> Result<DeltaReport, RiskError> {
        delta::delta(self, valuation, base, fx)
    }

    fn gamma(
        &self,
        valuation: &Valuation,
        base: Option<Currency>,
        fx: Option<&dyn FxSource>,
    ) -> Result<GammaReport, RiskError> {
        gamma::gamma(self, valuation, base, fx)
    }

    fn jacobian(&mut self, other: &Solver) -> Result<JacobianReport, RiskError> {
        jacobian::jacobian(self, other)
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::report::{Bucket, DeltaReport, GammaReport, JacobianReport};
    pub use crate::valuation::Valuation;
    pub use crate::{RiskError, SolverRisk};
}
