//! Dense numerics used by the solver and sensitivity engines.
//!
//! - [`linalg`]: LU solves, SVD pseudo-inverse, AD-aware solves and Jacobian assembly
//! - [`tensor`]: fixed-shape rank-3 tensors for second-order sensitivities

pub mod linalg;
pub mod tensor;

pub use linalg::{dual_solve, gradient_matrix, pseudo_inverse, solve};
pub use tensor::Tensor3;
