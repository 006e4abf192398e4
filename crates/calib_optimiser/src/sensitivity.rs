//! First-order sensitivity of solver variables to targets.
//!
//! The central quantity is `G = ∇_s vᵀ`, instruments × variables, with
//! `G[i, j] = ∂v_j/∂s_i`. It can be obtained three ways:
//!
//! - analytically as the pseudo-inverse of the Jacobian (default)
//! - from the target derivatives of one exact Gauss-Newton step taken with
//!   tagged targets
//! - from the implicit function theorem applied to the stationarity of the
//!   objective, which needs second-order derivatives
//!
//! Chain versions assemble the upstream solvers' sensitivities into one
//! aggregate matrix.

use std::cell::OnceCell;

use calib_core::math::{gradient_matrix, pseudo_inverse, solve};
use calib_core::types::{AdOrder, Dual};
use nalgebra::{DMatrix, DVector};

use crate::algorithms::StepRule;
use crate::cache::{memo, TargetCells};
use crate::error::SolverError;
use crate::solver::Solver;

/// Strategy for computing `∇_s vᵀ`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SensitivityMethod {
    /// Moore-Penrose pseudo-inverse of the Jacobian.
    #[default]
    Analytical,
    /// Derivatives of an exact Gauss-Newton step with tagged targets.
    DualFinalIteration,
    /// Implicit differentiation of the objective's stationarity condition.
    ///
    /// On weighted overdetermined fits this is the weighted least-squares
    /// derivative rather than `pinv(J)`.
    FixedPoint,
}

fn target_tags(m: usize) -> Vec<String> {
    (0..m).map(|i| format!("s{i}")).collect()
}

impl Solver {
    /// `∇_s vᵀ` by the analytical method, instruments × variables.
    ///
    /// # Errors
    ///
    /// Propagates pricing and decomposition failures.
    pub fn sensitivity(&self) -> Result<&DMatrix<f64>, SolverError> {
        memo(&self.cache.targets.sensitivity, || {
            Ok(pseudo_inverse(self.rate_jacobian()?)?)
        })
    }

    /// `∇_s vᵀ` by `method`.
    ///
    /// The result replaces the cached sensitivity, so chain and second-order
    /// quantities computed afterwards are built on it.
    ///
    /// # Errors
    ///
    /// Propagates pricing and linear algebra failures.
    pub fn sensitivity_with(&mut self, method: SensitivityMethod) -> Result<DMatrix<f64>, SolverError> {
        let g = match method {
            SensitivityMethod::Analytical => return self.sensitivity().cloned(),
            SensitivityMethod::DualFinalIteration => self.dual_final_iteration_sensitivity()?,
            SensitivityMethod::FixedPoint => self.fixed_point_sensitivity()?,
        };
        self.cache.targets = TargetCells {
            sensitivity: OnceCell::from(g.clone()),
            ..TargetCells::default()
        };
        Ok(g)
    }

    fn dual_final_iteration_sensitivity(&mut self) -> Result<DMatrix<f64>, SolverError> {
        let tags = target_tags(self.instruments.len());
        self.with_tagged_targets(AdOrder::One, |s| {
            let v1 = s.step(StepRule::ExactGaussNewton)?;
            Ok(gradient_matrix(&v1, &tags))
        })
    }

    fn fixed_point_sensitivity(&mut self) -> Result<DMatrix<f64>, SolverError> {
        let m = self.instruments.len();
        let tags = target_tags(m);
        self.with_ad_order(AdOrder::Two, |s| {
            s.with_tagged_targets(AdOrder::Two, |s| {
                let n = s.variables().len();
                let all: Vec<&str> = s
                    .variables()
                    .iter()
                    .chain(&tags)
                    .map(String::as_str)
                    .collect();
                let h = s.objective()?.hessian(&all)?;
                let h_vv = h.view((0, 0), (n, n)).into_owned();
                let h_sv = h.view((n, 0), (m, n)).into_owned();
                let x = solve(&h_vv, &(-h_sv.transpose()))?;
                Ok(x.transpose())
            })
        })
    }

    /// Rates of every solver in the chain followed by this solver's rates.
    ///
    /// # Errors
    ///
    /// Propagates pricing failures.
    pub fn chain_rates(&self) -> Result<Vec<Dual>, SolverError> {
        let mut out = Vec::new();
        for pre in &self.pre_solvers {
            out.extend(pre.chain_rates()?);
        }
        out.extend_from_slice(self.rates()?);
        Ok(out)
    }

    /// `∇_s vᵀ` over the whole chain, aggregate instruments × aggregate variables.
    ///
    /// Upstream sensitivities sit on the block diagonal. The column block of
    /// this solver's variables in the rows of upstream solver `p` is
    /// `−G_p (∇_{v_p} rᵀ G)`, where `r` are this solver's rates.
    ///
    /// # Errors
    ///
    /// Propagates pricing and decomposition failures.
    pub fn sensitivity_chain(&self) -> Result<&DMatrix<f64>, SolverError> {
        memo(&self.cache.targets.sensitivity_chain, || {
            let g = self.sensitivity()?;
            if self.pre_solvers.is_empty() {
                return Ok(g.clone());
            }
            let space = &self.space;
            let m_agg = space.aggregate_labels().len();
            let n_agg = space.aggregate_variables().len();
            let (m, n) = g.shape();
            let rates = self.rates()?;

            let mut out = DMatrix::zeros(m_agg, n_agg);
            for (pre, block) in self.pre_solvers.iter().zip(space.blocks()) {
                let g_pre = pre.sensitivity_chain()?;
                out.view_mut(
                    (block.instruments.start, block.variables.start),
                    g_pre.shape(),
                )
                .copy_from(g_pre);

                let pre_vars = &space.aggregate_variables()[block.variables.clone()];
                let grad_v_r = gradient_matrix(rates, pre_vars);
                let cross = -(g_pre * (grad_v_r * g));
                out.view_mut((block.instruments.start, n_agg - n), (block.instruments.len(), n))
                    .copy_from(&cross);
            }
            out.view_mut((m_agg - m, n_agg - n), (m, n)).copy_from(g);
            Ok(out)
        })
    }

    /// `∇_f vᵀ` over the chain, FX variables × aggregate variables.
    ///
    /// Computed as `−∇_f rᵀ G_chain` with `r` the rates of the whole chain.
    ///
    /// # Errors
    ///
    /// Propagates pricing and decomposition failures.
    pub fn fx_sensitivity_chain<S: AsRef<str>>(&self, fx_vars: &[S]) -> Result<DMatrix<f64>, SolverError> {
        let grad_f_r = gradient_matrix(&self.chain_rates()?, fx_vars);
        Ok(-(grad_f_r * self.sensitivity_chain()?))
    }

    /// Total derivative of `value` with respect to FX variables.
    ///
    /// Includes the path through the curve variables that re-calibrate when
    /// FX rates move: `∇_f value + ∇_f vᵀ ∇_v value`.
    ///
    /// # Errors
    ///
    /// Propagates pricing and decomposition failures.
    pub fn fx_total_gradient<S: AsRef<str>>(
        &self,
        value: &Dual,
        fx_vars: &[S],
    ) -> Result<DVector<f64>, SolverError> {
        let direct = DVector::from_vec(value.gradient(fx_vars));
        let grad_v = DVector::from_vec(value.gradient(self.aggregate_variables()));
        Ok(direct + self.fx_sensitivity_chain(fx_vars)? * grad_v)
    }
}
