//! # calib_core: Numerical Foundation for Curve Calibration
//!
//! ## Layer 1 (Foundation) Role
//!
//! calib_core is the bottom layer of the calibration stack, providing:
//! - Named-variable dual numbers with optional second order (`types::dual`)
//! - Currency codes (`types::currency`)
//! - Error types: `DualError`, `CurrencyError`, `LinalgError`, `PricingError` (`types::error`)
//! - Node curves and FX rates with AD-tagged parameters (`market_data`)
//! - Rate instruments and the pricing context they are evaluated in (`instruments`)
//! - Dense linear algebra helpers and rank-3 tensors (`math`)
//!
//! ## Zero Dependency Principle
//!
//! Layer 1 has no dependencies on other calib_* crates, with minimal external dependencies:
//! - num-traits: `Zero`/`One` for the dual scalar
//! - num-dual: exact first and second derivatives of elementary functions
//! - nalgebra: dense matrices, LU and SVD
//! - serde: Serialisation support (optional)
//!
//! ## Usage Examples
//!
//! ```rust
//! use calib_core::types::{AdOrder, Dual};
//!
//! let x = Dual::variable(2.0, "x");
//! let y = Dual::variable(3.0, "y");
//! let z = &x * &y + x.exp();
//!
//! let grad = z.gradient(&["x", "y"]);
//! assert!((grad[0] - (3.0 + 2.0_f64.exp())).abs() < 1e-12);
//! assert!((grad[1] - 2.0).abs() < 1e-12);
//! assert_eq!(z.order(), AdOrder::One);
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialisation for `Currency` and `AdOrder`

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod instruments;
pub mod market_data;
pub mod math;
pub mod types;
