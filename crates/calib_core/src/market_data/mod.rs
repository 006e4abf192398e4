//! Calibratable market data: node curves and FX rates.
//!
//! Every parameter here is held as a [`Dual`](crate::types::Dual) tagged with
//! a stable variable name, so that anything priced from these objects carries
//! derivatives back to the parameters a solver controls.
//!
//! # Components
//!
//! - [`curves`]: Curve trait and the node-interpolated [`NodeCurve`]
//! - [`fx`]: FX source trait and spot [`FxRates`]
//! - [`error`]: Curve and FX error types
//!
//! # Example
//!
//! ```
//! use calib_core::market_data::{Curve, NodeCurve};
//!
//! let curve = NodeCurve::discount("usd", vec![0.0, 1.0, 2.0], vec![1.0, 0.97, 0.94]).unwrap();
//! assert_eq!(curve.variable_tags(), vec!["usd_1".to_string(), "usd_2".to_string()]);
//! let df = curve.value(1.5).unwrap();
//! assert!(df < 0.97 && df > 0.94);
//! ```

pub mod curves;
pub mod error;
pub mod fx;

pub use curves::{node_tag, Curve, Interpolation, NodeCurve};
pub use error::{CurveError, FxError};
pub use fx::{FxRates, FxSource};
