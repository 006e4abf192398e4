//! Curves whose nodes a solver can overwrite.
//!
//! - [`Curve`]: the contract a solver relies on (node access, re-tagging,
//!   recomputation of derived state, evaluation)
//! - [`NodeCurve`]: linear or log-linear interpolation between node values

mod node;
mod traits;

pub use node::{Interpolation, NodeCurve};
pub use traits::{node_tag, Curve};
