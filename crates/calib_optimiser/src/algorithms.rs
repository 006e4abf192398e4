//! Step rules for the calibration iteration.
//!
//! Each rule maps the current variable vector, errors, objective and
//! Jacobian to a new variable vector. The three optimisation rules work on
//! real parts; [`StepRule::ExactGaussNewton`] keeps the derivatives of the
//! errors so the returned step is differentiable with respect to any tags
//! the targets carry.
//!
//! Notation: `J` is `variables × instruments`, `x` the error vector, `W`
//! the diagonal weight matrix and `∇f` the objective gradient.

use std::fmt;
use std::str::FromStr;

use calib_core::math::{dual_solve, pseudo_inverse, solve};
use calib_core::types::Dual;
use nalgebra::{DMatrix, DVector};

use crate::error::SolverError;

/// Optimisation algorithm selected for a solver.
///
/// # Examples
///
/// ```
/// use calib_optimiser::Algorithm;
///
/// let alg: Algorithm = "gauss_newton".parse().unwrap();
/// assert_eq!(alg, Algorithm::GaussNewton);
/// assert!("newton".parse::<Algorithm>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Algorithm {
    /// Steepest descent with an exact line search on the linearised errors.
    GradientDescent,
    /// Gauss-Newton.
    #[default]
    GaussNewton,
    /// Levenberg-Marquardt with adaptive damping.
    LevenbergMarquardt,
}

impl Algorithm {
    /// Canonical snake-case name.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::GradientDescent => "gradient_descent",
            Algorithm::GaussNewton => "gauss_newton",
            Algorithm::LevenbergMarquardt => "levenberg_marquardt",
        }
    }
}

impl FromStr for Algorithm {
    type Err = SolverError;

    fn from_str(s: &str) -> Result<Self, SolverError> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "gradient_descent" => Ok(Algorithm::GradientDescent),
            "gauss_newton" => Ok(Algorithm::GaussNewton),
            "levenberg_marquardt" => Ok(Algorithm::LevenbergMarquardt),
            _ => Err(SolverError::unknown_algorithm(s)),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Levenberg-Marquardt damping state carried across iteration cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Damping {
    lambda: f64,
}

impl Damping {
    /// Start from `lambda`.
    pub fn new(lambda: f64) -> Self {
        Self { lambda }
    }

    /// Current damping factor.
    pub fn lambda(&self) -> f64 {
        self.lambda
    }

    /// Double when `objective` did not improve on `previous`, quarter otherwise.
    pub fn update(&mut self, objective: f64, previous: f64) {
        if objective < previous {
            self.lambda *= 0.25;
        } else {
            self.lambda *= 2.0;
        }
    }
}

/// Closed set of step rules.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StepRule {
    /// `v' = v − α∇f`, `α = (y·Wx)/(y·Wy)`, `y = Jᵀ∇f`.
    GradientDescent,
    /// Square: `Jᵀδ = −x`; otherwise `(J W Jᵀ) δ = −½∇f`.
    GaussNewton,
    /// `(J W Jᵀ + λI) δ = −½∇f`.
    LevenbergMarquardt {
        /// Damping factor for this step
        lambda: f64,
    },
    /// Gauss-Newton solved on dual errors so `δ` carries target derivatives.
    ///
    /// Square: `Jᵀδ = −x`; otherwise `δ = pinv(Jᵀ)(−x)`.
    ExactGaussNewton,
}

/// Borrowed solver state consumed by a step.
#[derive(Debug, Clone, Copy)]
pub struct StepInputs<'a> {
    /// Solver variable tags
    pub variables: &'a [String],
    /// Current variable values
    pub v: &'a [f64],
    /// Errors `r − s`
    pub errors: &'a [Dual],
    /// Objective `xᵀ W x`
    pub objective: &'a Dual,
    /// Jacobian `∂r/∂v`, variables × instruments
    pub jacobian: &'a DMatrix<f64>,
    /// Instrument weights
    pub weights: &'a [f64],
}

impl StepInputs<'_> {
    fn real_errors(&self) -> DVector<f64> {
        DVector::from_iterator(self.errors.len(), self.errors.iter().map(Dual::real))
    }

    fn objective_gradient(&self) -> DVector<f64> {
        DVector::from_vec(self.objective.gradient(self.variables))
    }

    fn weighted_normal_matrix(&self) -> DMatrix<f64> {
        let w = DMatrix::from_diagonal(&DVector::from_column_slice(self.weights));
        self.jacobian * w * self.jacobian.transpose()
    }

    fn is_square(&self) -> bool {
        self.jacobian.nrows() == self.jacobian.ncols()
    }
}

impl StepRule {
    /// Rule for an optimisation algorithm with the given damping.
    pub fn for_algorithm(algorithm: Algorithm, damping: &Damping) -> Self {
        match algorithm {
            Algorithm::GradientDescent => StepRule::GradientDescent,
            Algorithm::GaussNewton => StepRule::GaussNewton,
            Algorithm::LevenbergMarquardt => StepRule::LevenbergMarquardt {
                lambda: damping.lambda(),
            },
        }
    }

    /// New variable values.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Linalg`] when the step system is singular.
    pub fn step(&self, inputs: &StepInputs<'_>) -> Result<Vec<Dual>, SolverError> {
        let v = DVector::from_column_slice(inputs.v);
        let v1 = match self {
            StepRule::GradientDescent => gradient_descent(inputs, &v),
            StepRule::GaussNewton => gauss_newton(inputs, &v)?,
            StepRule::LevenbergMarquardt { lambda } => levenberg_marquardt(inputs, &v, *lambda)?,
            StepRule::ExactGaussNewton => return exact_gauss_newton(inputs),
        };
        Ok(v1.iter().map(|x| Dual::constant(*x)).collect())
    }
}

fn gradient_descent(inputs: &StepInputs<'_>, v: &DVector<f64>) -> DVector<f64> {
    let grad = inputs.objective_gradient();
    let x = inputs.real_errors();
    let y = inputs.jacobian.transpose() * &grad;
    let w = DVector::from_column_slice(inputs.weights);
    let denominator = y.dot(&w.component_mul(&y));
    if denominator == 0.0 {
        return v.clone();
    }
    let alpha = y.dot(&w.component_mul(&x)) / denominator;
    v - grad * alpha
}

fn gauss_newton(inputs: &StepInputs<'_>, v: &DVector<f64>) -> Result<DVector<f64>, SolverError> {
    let (a, b) = if inputs.is_square() {
        (inputs.jacobian.transpose(), -inputs.real_errors())
    } else {
        (inputs.weighted_normal_matrix(), inputs.objective_gradient() * -0.5)
    };
    let delta = solve(&a, &DMatrix::from_column_slice(b.len(), 1, b.as_slice()))?;
    Ok(v + delta.column(0))
}

fn levenberg_marquardt(
    inputs: &StepInputs<'_>,
    v: &DVector<f64>,
    lambda: f64,
) -> Result<DVector<f64>, SolverError> {
    let n = v.len();
    let a = inputs.weighted_normal_matrix() + DMatrix::identity(n, n) * lambda;
    let b = inputs.objective_gradient() * -0.5;
    let delta = solve(&a, &DMatrix::from_column_slice(n, 1, b.as_slice()))?;
    Ok(v + delta.column(0))
}

fn exact_gauss_newton(inputs: &StepInputs<'_>) -> Result<Vec<Dual>, SolverError> {
    let neg_x: Vec<Dual> = inputs.errors.iter().map(|x| -x).collect();
    let delta = if inputs.is_square() {
        dual_solve(&inputs.jacobian.transpose(), &neg_x)?
    } else {
        // Minimum-norm solution of Jᵀδ = −x, so ∂δ/∂s reproduces pinv(J)
        let p = pseudo_inverse(&inputs.jacobian.transpose())?;
        (0..p.nrows())
            .map(|j| (0..p.ncols()).map(|k| &neg_x[k] * p[(j, k)]).sum())
            .collect()
    };
    Ok(inputs
        .v
        .iter()
        .zip(delta)
        .map(|(v, d)| d + *v)
        .collect())
}
