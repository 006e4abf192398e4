//! Second-order sensitivity of solver variables to targets.
//!
//! `J2[i, j, l] = ∂²r_l/∂v_i∂v_j` (variables × variables × instruments) and
//! `∇_s∇_s vᵀ[h, a, z] = ∂²v_z/∂s_h∂s_a` (instruments × instruments ×
//! variables). Both require the solver to be at differentiation order two.
//!
//! Differentiating `∇_s vᵀ J = I` once more gives
//!
//! ```text
//! ∂²v_z/∂s_h∂s_a = −Σ_{i,j} G[a, i] G[h, j] Σ_l J2[i, j, l] G[l, z]
//! ```
//!
//! which is evaluated as three nested contractions.

use calib_core::math::Tensor3;
use calib_core::types::{AdOrder, Dual};
use nalgebra::DMatrix;
use tracing::debug;

use crate::cache::memo;
use crate::error::SolverError;
use crate::solver::Solver;

fn hessian_tensor<S: AsRef<str>>(rates: &[Dual], vars: &[S]) -> Result<Tensor3, SolverError> {
    let n = vars.len();
    let mut t = Tensor3::zeros(n, n, rates.len());
    for (l, rate) in rates.iter().enumerate() {
        t.set_slice_last(l, &rate.hessian(vars)?)?;
    }
    Ok(t)
}

/// `C[h, a, z] = −Σ_j G[h, j] Σ_i G[a, i] Σ_l J2[i, j, l] G[l, z]`.
fn contract(j2: &Tensor3, g: &DMatrix<f64>) -> Tensor3 {
    let (n, _, m) = j2.shape();
    let a = Tensor3::from_fn(n, n, n, |i, j, z| {
        (0..m).map(|l| j2[(i, j, l)] * g[(l, z)]).sum()
    });
    let b = Tensor3::from_fn(m, n, n, |p, j, z| {
        (0..n).map(|i| g[(p, i)] * a[(i, j, z)]).sum()
    });
    Tensor3::from_fn(m, m, n, |h, p, z| {
        -(0..n).map(|j| g[(h, j)] * b[(p, j, z)]).sum::<f64>()
    })
}

impl Solver {
    fn require_second_order(&self) -> Result<(), SolverError> {
        if self.ad_order == AdOrder::Two {
            Ok(())
        } else {
            Err(SolverError::ad_order_required(AdOrder::Two, self.ad_order))
        }
    }

    /// Rate Hessian `J2`, variables × variables × instruments.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::AdOrderRequired`] unless the solver is at order two.
    pub fn rate_hessian(&self) -> Result<&Tensor3, SolverError> {
        self.require_second_order()?;
        memo(&self.cache.nodes.rate_hessian, || {
            hessian_tensor(self.rates()?, self.variables())
        })
    }

    /// Rate Hessian over the chain, aggregate variables² × aggregate instruments.
    ///
    /// Upstream tensors are embedded block-wise; the last slices hold this
    /// solver's rates differentiated with respect to every aggregate variable.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::AdOrderRequired`] unless the solver is at order two.
    pub fn rate_hessian_chain(&self) -> Result<&Tensor3, SolverError> {
        self.require_second_order()?;
        memo(&self.cache.nodes.rate_hessian_chain, || {
            if self.pre_solvers.is_empty() {
                return Ok(self.rate_hessian()?.clone());
            }
            let n_agg = self.aggregate_variables().len();
            let m_agg = self.aggregate_labels().len();
            let m = self.instruments.len();

            let mut out = Tensor3::zeros(n_agg, n_agg, m_agg);
            for (pre, block) in self.pre_solvers.iter().zip(self.space.blocks()) {
                let offset = (block.variables.start, block.variables.start, block.instruments.start);
                out.embed(offset, pre.rate_hessian_chain()?)?;
            }
            let local = hessian_tensor(self.rates()?, self.aggregate_variables())?;
            out.embed((0, 0, m_agg - m), &local)?;
            Ok(out)
        })
    }

    /// `∇_s∇_s vᵀ`, instruments × instruments × variables.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::AdOrderRequired`] unless the solver is at order two.
    pub fn second_sensitivity(&self) -> Result<&Tensor3, SolverError> {
        self.require_second_order()?;
        memo(&self.cache.targets.second_sensitivity, || {
            Ok(contract(self.rate_hessian()?, self.sensitivity()?))
        })
    }

    /// `∇_s∇_s vᵀ` over the chain.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::AdOrderRequired`] unless the solver is at order two.
    pub fn second_sensitivity_chain(&self) -> Result<&Tensor3, SolverError> {
        self.require_second_order()?;
        memo(&self.cache.targets.second_sensitivity_chain, || {
            if self.pre_solvers.is_empty() {
                return Ok(self.second_sensitivity()?.clone());
            }
            Ok(contract(self.rate_hessian_chain()?, self.sensitivity_chain()?))
        })
    }

    /// `∇_s∇_s vᵀ` by forward differences of the first-order sensitivity.
    ///
    /// Each target is bumped by `10^trunc(log10(func_tol) / 2)` on a copy of
    /// the solver, which is re-calibrated; the copies are discarded so this
    /// solver's targets and nodes are left untouched. The result is
    /// symmetrised in its leading axes. Works at either order.
    ///
    /// # Errors
    ///
    /// Propagates failures from re-calibration.
    pub fn second_sensitivity_forward_difference(&self) -> Result<Tensor3, SolverError> {
        let ds = 10f64.powi((self.config.func_tol.log10() / 2.0).trunc() as i32);
        let g0 = self.sensitivity()?.clone();
        let (m, n) = g0.shape();
        debug!(solver = %self.id, ds, "forward-difference second order");

        let bumped: Vec<Solver> = (0..m)
            .map(|i| {
                let mut solver = self.clone();
                solver.targets[i] = &solver.targets[i] + ds;
                solver
            })
            .collect();

        let resolve = |mut solver: Solver| -> Result<DMatrix<f64>, SolverError> {
            solver.iterate()?;
            Ok((solver.sensitivity()? - &g0) / ds)
        };

        #[cfg(feature = "parallel")]
        let columns: Result<Vec<_>, SolverError> = {
            use rayon::prelude::*;
            bumped.into_par_iter().map(resolve).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let columns: Result<Vec<_>, SolverError> = bumped.into_iter().map(resolve).collect();

        let mut out = Tensor3::zeros(m, m, n);
        for (i, d) in columns?.iter().enumerate() {
            for a in 0..m {
                for z in 0..n {
                    out[(a, i, z)] = d[(a, z)];
                }
            }
        }
        Ok(out.symmetrize_leading())
    }
}
