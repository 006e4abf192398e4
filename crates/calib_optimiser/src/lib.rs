//! # calib_optimiser
//!
//! Multi-curve calibration and target sensitivities.
//!
//! This crate sits between the numerical foundation (L1) and risk
//! aggregation (L3): it solves the inverse problem of finding curve node
//! values that reprice a set of instruments to their market quotes, then
//! differentiates the solution with respect to those quotes.
//!
//! ## Architecture Position
//!
//! Layer 2 of the calibration stack. Depends on `calib_core` (L1) only.
//!
//! ## Modules
//!
//! - `variables`: Ordered variable space across a dependency chain of solvers
//! - `objective`: Weighted least-squares errors and objective
//! - `algorithms`: Gradient descent, Gauss-Newton and Levenberg-Marquardt steps
//! - `iteration`: Iteration controller and convergence reporting
//! - `sensitivity`: First-order `∇_s vᵀ`, local and chain-aggregated
//! - `second_order`: Rate Hessians and `∇_s∇_s vᵀ`
//!
//! ## Example
//!
//! ```rust
//! use calib_core::instruments::ZeroRate;
//! use calib_core::market_data::NodeCurve;
//! use calib_optimiser::prelude::*;
//!
//! let curve = NodeCurve::discount("usd", vec![0.0, 1.0, 2.0], vec![1.0, 0.99, 0.98]).unwrap();
//! let solver = Solver::builder()
//!     .curve(curve)
//!     .instrument(ZeroRate::new("usd", 1.0))
//!     .instrument(ZeroRate::new("usd", 2.0))
//!     .targets(vec![4.0, 4.2])
//!     .build()
//!     .unwrap();
//!
//! let g = solver.sensitivity().unwrap();
//! assert_eq!(g.shape(), (2, 2));
//! ```
//!
//! ## Feature Flags
//!
//! - `parallel` (default): re-solve bumped copies concurrently in the
//!   forward-difference second-order method
//! - `serde`: serialisation of configuration and reports

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod algorithms;
pub mod config;
pub mod iteration;
pub mod objective;
pub mod second_order;
pub mod sensitivity;
pub mod solver;
pub mod variables;

mod cache;
mod error;

pub use algorithms::{Algorithm, Damping, StepInputs, StepRule};
pub use config::{SolverConfig, SolverConfigBuilder};
pub use error::SolverError;
pub use iteration::{ConvergenceState, IterationReport};
pub use sensitivity::SensitivityMethod;
pub use solver::{Solver, SolverBuilder};
pub use variables::{ChainBlock, InstrumentLabel, VariableSpace};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::algorithms::Algorithm;
    pub use crate::config::SolverConfig;
    pub use crate::iteration::{ConvergenceState, IterationReport};
    pub use crate::sensitivity::SensitivityMethod;
    pub use crate::solver::{Solver, SolverBuilder};
    pub use crate::SolverError;
}
