//! Cross-gamma to calibrating instruments.
//!
//! ```text
//! ∇_s∇_sᵀ P = G H_P Gᵀ + Σ_z ∇_s∇_s v_z ∂P/∂v_z
//! ```
//!
//! scaled by `scalar_i · scalar_j / 10000`. Only available at differentiation
//! order two.

use calib_core::market_data::FxSource;
use calib_core::types::{AdOrder, Currency, Dual};
use calib_optimiser::{Solver, SolverError};
use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::delta::resolve_fx;
use crate::error::RiskError;
use crate::report::{Bucket, GammaBlock, GammaReport};
use crate::valuation::Valuation;

fn cross_gamma(solver: &Solver, value: &Dual, scale: &DMatrix<f64>) -> Result<DMatrix<f64>, RiskError> {
    let vars = solver.aggregate_variables();
    let g = solver.sensitivity_chain()?;
    let t = solver.second_sensitivity_chain()?;
    let h = value.hessian(vars)?;
    let grad = value.gradient(vars);
    let out = g * h * g.transpose() + t.contract_last(&grad);
    Ok(out.component_mul(scale))
}

pub(crate) fn gamma(
    solver: &Solver,
    valuation: &Valuation,
    base: Option<Currency>,
    fx: Option<&dyn FxSource>,
) -> Result<GammaReport, RiskError> {
    if solver.ad_order() != AdOrder::Two {
        return Err(SolverError::ad_order_required(AdOrder::Two, solver.ad_order()).into());
    }
    let fx = resolve_fx(solver, base, fx)?;
    let scalars = DVector::from_column_slice(solver.variable_space().aggregate_rate_scalars());
    let scale = (&scalars * scalars.transpose()) / 10_000.0;
    debug!(solver = %solver.id(), buckets = valuation.len(), base = ?base, "gamma");

    let mut blocks = Vec::new();
    for (ccy, value) in valuation.iter() {
        blocks.push(GammaBlock {
            local: Bucket::Local(ccy),
            display: ccy,
            values: cross_gamma(solver, value, &scale)?,
        });

        let (Some(base), Some(fx)) = (base, fx) else {
            continue;
        };
        if base == ccy {
            continue;
        }
        let converted = value * &fx.rate(ccy, base)?;
        blocks.push(GammaBlock {
            local: Bucket::Local(ccy),
            display: base,
            values: cross_gamma(solver, &converted, &scale)?,
        });
    }

    if let Some(base) = base {
        let m = scalars.len();
        let all = blocks
            .iter()
            .filter(|b| b.display == base)
            .fold(DMatrix::zeros(m, m), |acc, b| acc + &b.values);
        blocks.push(GammaBlock {
            local: Bucket::All,
            display: base,
            values: all,
        });
    }

    Ok(GammaReport::new(solver.aggregate_labels(), blocks))
}
