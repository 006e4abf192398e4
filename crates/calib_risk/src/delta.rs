//! First-order risk aggregation.
//!
//! For a local-currency value `P`:
//!
//! ```text
//! instruments:  ∇_s P = G ∇_v P                      (× rate_scalar / 100)
//! fx:           ∇_f P + ∇_f vᵀ ∇_v P                 (× 1e-4)
//! ```
//!
//! with `G` the chain sensitivity of the solver. Displaying in another
//! currency applies the product rule to `P · f`, `f` being the rate from the
//! local to the base currency.

use std::ptr;

use calib_core::market_data::FxSource;
use calib_core::types::{Currency, Dual};
use calib_optimiser::Solver;
use nalgebra::DVector;
use tracing::{debug, warn};

use crate::error::RiskError;
use crate::report::{Bucket, DeltaColumn, DeltaReport};
use crate::valuation::Valuation;

/// FX quotes are reported per pip.
pub const FX_SCALAR: f64 = 1e-4;

/// FX source to use for a risk request.
///
/// A caller-supplied source wins over the one attached to the chain. When
/// both exist and differ a warning is logged, since the calibrated curves
/// were built against the attached rates.
pub(crate) fn resolve_fx<'a>(
    solver: &'a Solver,
    base: Option<Currency>,
    fx: Option<&'a dyn FxSource>,
) -> Result<Option<&'a dyn FxSource>, RiskError> {
    let attached = solver.fx();
    let resolved = match (fx, attached) {
        (Some(given), Some(attached)) => {
            if !ptr::addr_eq(given, attached) {
                warn!(
                    solver = %solver.id(),
                    "supplied FX source differs from the solver's; risk may be inconsistent"
                );
            }
            Some(given)
        }
        (Some(given), None) => Some(given),
        (None, attached) => attached,
    };
    match (base, resolved) {
        (Some(base), None) => Err(RiskError::missing_fx(base)),
        _ => Ok(resolved),
    }
}

/// `G ∇_v value` over the chain.
fn instrument_gradient(solver: &Solver, value: &Dual) -> Result<DVector<f64>, RiskError> {
    let grad_v = DVector::from_vec(value.gradient(solver.aggregate_variables()));
    Ok(solver.sensitivity_chain()? * grad_v)
}

fn fx_gradient(solver: &Solver, value: &Dual, fx_vars: &[String]) -> Result<DVector<f64>, RiskError> {
    if fx_vars.is_empty() {
        return Ok(DVector::zeros(0));
    }
    Ok(solver.fx_total_gradient(value, fx_vars)?)
}

fn stack(inst: &DVector<f64>, scalars: &DVector<f64>, fx: &DVector<f64>) -> DVector<f64> {
    let scaled = inst.component_mul(scalars);
    DVector::from_iterator(
        scaled.len() + fx.len(),
        scaled.iter().copied().chain(fx.iter().map(|x| x * FX_SCALAR)),
    )
}

pub(crate) fn delta(
    solver: &Solver,
    valuation: &Valuation,
    base: Option<Currency>,
    fx: Option<&dyn FxSource>,
) -> Result<DeltaReport, RiskError> {
    let fx = resolve_fx(solver, base, fx)?;
    let fx_vars = fx.map(|f| f.variables()).unwrap_or_default();
    let fx_pairs = fx.map(|f| f.pairs()).unwrap_or_default();
    let space = solver.variable_space();
    let scalars = DVector::from_iterator(
        space.aggregate_rate_scalars().len(),
        space.aggregate_rate_scalars().iter().map(|s| s / 100.0),
    );
    debug!(
        solver = %solver.id(),
        buckets = valuation.len(),
        base = ?base,
        fx_pairs = fx_pairs.len(),
        "delta"
    );

    let mut columns = Vec::new();
    for (ccy, value) in valuation.iter() {
        let grad_s = instrument_gradient(solver, value)?;
        let grad_f = fx_gradient(solver, value, &fx_vars)?;
        columns.push(DeltaColumn {
            local: Bucket::Local(ccy),
            display: ccy,
            values: stack(&grad_s, &scalars, &grad_f),
        });

        let (Some(base), Some(fx)) = (base, fx) else {
            continue;
        };
        if base == ccy {
            continue;
        }
        let f = fx.rate(ccy, base)?;
        let p = value.real();
        let inst = instrument_gradient(solver, &f)? * p + &grad_s * f.real();
        let fxd = &grad_f * f.real() + fx_gradient(solver, &f, &fx_vars)? * p;
        columns.push(DeltaColumn {
            local: Bucket::Local(ccy),
            display: base,
            values: stack(&inst, &scalars, &fxd),
        });
    }

    if let Some(base) = base {
        let rows = scalars.len() + fx_vars.len();
        let all = columns
            .iter()
            .filter(|c| c.display == base)
            .fold(DVector::zeros(rows), |acc, c| acc + &c.values);
        columns.push(DeltaColumn {
            local: Bucket::All,
            display: base,
            values: all,
        });
    }

    Ok(DeltaReport::new(solver.aggregate_labels(), fx_pairs, columns))
}
