//! Instrument-to-instrument Jacobian between two solvers.

use calib_core::math::gradient_matrix;
use calib_optimiser::Solver;
use tracing::debug;

use crate::error::RiskError;
use crate::report::JacobianReport;

/// Re-target `solver` to its instruments priced under `other`, re-solve, and
/// differentiate `other`'s instruments priced under the re-solved curves.
pub(crate) fn jacobian(solver: &mut Solver, other: &Solver) -> Result<JacobianReport, RiskError> {
    let targets = solver
        .instruments()
        .map(|(inst, args)| other.price(inst, args).map(|r| r.real()))
        .collect::<Result<Vec<_>, _>>()?;
    solver.set_targets(targets)?;
    let state = solver.iterate()?.state;
    debug!(
        solver = %solver.id(),
        other = %other.id(),
        state = %state,
        "re-calibrated to the other solver's market"
    );

    let rates = other
        .instruments()
        .map(|(inst, args)| solver.price(inst, args))
        .collect::<Result<Vec<_>, _>>()?;
    let grad_v_r = gradient_matrix(&rates, solver.variables());
    let values = solver.sensitivity()? * grad_v_r;

    Ok(JacobianReport {
        rows: solver.labels().to_vec(),
        columns: other.labels().to_vec(),
        values,
    })
}
