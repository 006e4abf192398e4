//! Iteration controller.
//!
//! Drives a solver's step rule until the objective falls below `func_tol`,
//! stops improving by more than `conv_tol`, or the iteration budget runs
//! out. Running out of iterations is a reported outcome, not an error.

use std::fmt;
use std::time::{Duration, Instant};

use calib_core::types::Dual;
use tracing::{debug, info, warn};

use crate::algorithms::{Algorithm, Damping, StepInputs, StepRule};
use crate::cache::Invalidation;
use crate::error::SolverError;
use crate::solver::Solver;

/// State of the iteration loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConvergenceState {
    /// Not yet iterated, or still iterating.
    #[default]
    Running,
    /// Objective improvement fell below `conv_tol`.
    ConvergedTolerance,
    /// Objective fell below `func_tol`.
    ConvergedFunctionValue,
    /// `max_iter` cycles ran without meeting either tolerance.
    MaxIterationsExhausted,
}

impl fmt::Display for ConvergenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConvergenceState::Running => "running",
            ConvergenceState::ConvergedTolerance => "converged (conv_tol)",
            ConvergenceState::ConvergedFunctionValue => "converged (func_tol)",
            ConvergenceState::MaxIterationsExhausted => "max_iter exhausted",
        };
        f.write_str(name)
    }
}

/// Summary of one call to [`Solver::iterate`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IterationReport {
    /// Terminal state
    pub state: ConvergenceState,
    /// Steps taken
    pub iterations: usize,
    /// Final objective value
    pub objective: f64,
    /// Objective at the start of each cycle
    pub history: Vec<f64>,
    /// Wall time spent iterating
    pub elapsed: Duration,
    /// Algorithm used
    pub algorithm: Algorithm,
}

impl IterationReport {
    /// Empty report for a solver that has not iterated.
    pub fn new(algorithm: Algorithm) -> Self {
        Self {
            state: ConvergenceState::Running,
            iterations: 0,
            objective: f64::NAN,
            history: Vec::new(),
            elapsed: Duration::ZERO,
            algorithm,
        }
    }

    /// True when either tolerance was met.
    pub fn is_converged(&self) -> bool {
        matches!(
            self.state,
            ConvergenceState::ConvergedTolerance | ConvergenceState::ConvergedFunctionValue
        )
    }

    /// Turn an unconverged outcome into an error.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::NotConverged`] unless a tolerance was met.
    pub fn ensure_converged(&self) -> Result<(), SolverError> {
        if self.is_converged() {
            Ok(())
        } else {
            Err(SolverError::NotConverged {
                iterations: self.iterations,
                objective: self.objective,
            })
        }
    }
}

impl Solver {
    /// Calibrate the solver-controlled nodes to the current targets.
    ///
    /// Each cycle evaluates the objective, checks `func_tol` then `conv_tol`,
    /// and otherwise applies one step of the configured algorithm.
    ///
    /// # Errors
    ///
    /// Propagates pricing and linear algebra failures. Exhausting the
    /// iteration budget is not an error; inspect the returned report.
    pub fn iterate(&mut self) -> Result<&IterationReport, SolverError> {
        let start = Instant::now();
        let algorithm = self.config.algorithm;
        let mut damping = Damping::new(self.config.initial_lambda);
        let mut previous = f64::INFINITY;
        let mut history = Vec::new();
        let mut state = ConvergenceState::Running;
        let mut iterations = 0;

        self.invalidate(Invalidation::Nodes);
        self.update_fx();

        for i in 0..self.config.max_iter {
            let f = self.objective()?.real();
            history.push(f);
            debug!(solver = %self.id, iteration = i, objective = f, "iteration cycle");

            if f < self.config.func_tol {
                state = ConvergenceState::ConvergedFunctionValue;
                break;
            }
            let improvement = previous - f;
            if improvement > 0.0 && improvement < self.config.conv_tol {
                state = ConvergenceState::ConvergedTolerance;
                break;
            }

            if algorithm == Algorithm::LevenbergMarquardt {
                damping.update(f, previous);
            }
            let v1 = self.step(StepRule::for_algorithm(algorithm, &damping))?;
            self.apply_step(&v1)?;
            previous = f;
            iterations = i + 1;
        }

        let objective = self.objective()?.real();
        if state == ConvergenceState::Running {
            state = ConvergenceState::MaxIterationsExhausted;
            warn!(
                solver = %self.id,
                algorithm = %algorithm,
                max_iter = self.config.max_iter,
                objective,
                "iteration budget exhausted before convergence"
            );
        }

        self.report = IterationReport {
            state,
            iterations,
            objective,
            history,
            elapsed: start.elapsed(),
            algorithm,
        };
        if self.report.is_converged() {
            info!(
                solver = %self.id,
                algorithm = %algorithm,
                iterations,
                objective,
                elapsed_ms = self.report.elapsed.as_secs_f64() * 1e3,
                "calibration converged: {}",
                state
            );
        }
        Ok(&self.report)
    }

    /// New variable values from one application of `rule`.
    pub(crate) fn step(&self, rule: StepRule) -> Result<Vec<Dual>, SolverError> {
        let inputs = StepInputs {
            variables: self.variables(),
            v: self.v(),
            errors: self.errors()?,
            objective: self.objective()?,
            jacobian: self.rate_jacobian()?,
            weights: &self.weights,
        };
        rule.step(&inputs)
    }
}
