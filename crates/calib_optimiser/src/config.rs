//! Solver configuration types.
//!
//! Controls the optimisation algorithm and the stopping rules of the
//! iteration loop.

use crate::algorithms::Algorithm;

/// Configuration for a calibration solver.
///
/// # Examples
///
/// ```
/// use calib_optimiser::{Algorithm, SolverConfig};
///
/// let config = SolverConfig::default();
/// assert_eq!(config.max_iter, 100);
/// assert_eq!(config.algorithm, Algorithm::GaussNewton);
///
/// let config = SolverConfig::builder()
///     .algorithm(Algorithm::LevenbergMarquardt)
///     .func_tol(1e-14)
///     .build();
/// assert_eq!(config.algorithm, Algorithm::LevenbergMarquardt);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverConfig {
    /// Optimisation algorithm.
    ///
    /// Default: GaussNewton
    pub algorithm: Algorithm,

    /// Maximum number of iteration cycles.
    ///
    /// Exhausting the budget is reported, not raised.
    /// Default: 100
    pub max_iter: usize,

    /// Objective value below which the solve is converged.
    ///
    /// Default: 1e-11
    pub func_tol: f64,

    /// Objective improvement below which the solve is converged.
    ///
    /// Default: 1e-14
    pub conv_tol: f64,

    /// Initial Levenberg-Marquardt damping.
    ///
    /// Default: 1000
    pub initial_lambda: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::GaussNewton,
            max_iter: 100,
            func_tol: 1e-11,
            conv_tol: 1e-14,
            initial_lambda: 1000.0,
        }
    }
}

impl SolverConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration builder for fluent construction.
    pub fn builder() -> SolverConfigBuilder {
        SolverConfigBuilder::new()
    }

    /// Create a high-precision configuration.
    ///
    /// Uses tighter tolerances and 500 iterations.
    pub fn high_precision() -> Self {
        Self {
            max_iter: 500,
            func_tol: 1e-16,
            conv_tol: 1e-18,
            ..Self::default()
        }
    }

    /// Create a fast configuration for interactive use.
    ///
    /// Uses relaxed tolerances and 50 iterations.
    pub fn fast() -> Self {
        Self {
            max_iter: 50,
            func_tol: 1e-8,
            conv_tol: 1e-10,
            ..Self::default()
        }
    }

    /// Set the algorithm.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the iteration budget.
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Set the objective tolerance.
    pub fn with_func_tol(mut self, func_tol: f64) -> Self {
        self.func_tol = func_tol;
        self
    }

    /// Set the improvement tolerance.
    pub fn with_conv_tol(mut self, conv_tol: f64) -> Self {
        self.conv_tol = conv_tol;
        self
    }

    /// Set the initial damping.
    pub fn with_initial_lambda(mut self, initial_lambda: f64) -> Self {
        self.initial_lambda = initial_lambda;
        self
    }
}

/// Builder for `SolverConfig`.
#[derive(Debug, Clone, Default)]
pub struct SolverConfigBuilder {
    config: SolverConfig,
}

impl SolverConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the algorithm.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.config.algorithm = algorithm;
        self
    }

    /// Set the iteration budget.
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    /// Set the objective tolerance.
    pub fn func_tol(mut self, func_tol: f64) -> Self {
        self.config.func_tol = func_tol;
        self
    }

    /// Set the improvement tolerance.
    pub fn conv_tol(mut self, conv_tol: f64) -> Self {
        self.config.conv_tol = conv_tol;
        self
    }

    /// Set the initial damping.
    pub fn initial_lambda(mut self, initial_lambda: f64) -> Self {
        self.config.initial_lambda = initial_lambda;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> SolverConfig {
        self.config
    }
}
