//! Memoised solver quantities.
//!
//! Cells are grouped by what they depend on. The node group holds values
//! derived from curve nodes and the differentiation order; the target group
//! holds values that additionally depend on the targets.

use std::cell::OnceCell;

use calib_core::math::Tensor3;
use calib_core::types::Dual;
use nalgebra::DMatrix;

/// Why cached state is being discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Invalidation {
    /// Curve nodes were overwritten.
    Nodes,
    /// Targets changed; node-derived values stay valid.
    Targets,
    /// Differentiation order changed.
    AdOrder,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct NodeCells {
    pub v: OnceCell<Vec<f64>>,
    pub rates: OnceCell<Vec<Dual>>,
    pub jacobian: OnceCell<DMatrix<f64>>,
    pub rate_hessian: OnceCell<Tensor3>,
    pub rate_hessian_chain: OnceCell<Tensor3>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct TargetCells {
    pub errors: OnceCell<Vec<Dual>>,
    pub objective: OnceCell<Dual>,
    pub sensitivity: OnceCell<DMatrix<f64>>,
    pub sensitivity_chain: OnceCell<DMatrix<f64>>,
    pub second_sensitivity: OnceCell<Tensor3>,
    pub second_sensitivity_chain: OnceCell<Tensor3>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct SolverCache {
    pub nodes: NodeCells,
    pub targets: TargetCells,
}

impl SolverCache {
    pub fn invalidate(&mut self, reason: Invalidation) {
        match reason {
            Invalidation::Targets => self.targets = TargetCells::default(),
            Invalidation::Nodes | Invalidation::AdOrder => *self = SolverCache::default(),
        }
    }
}

/// Value of `cell`, computing it with `init` on first access.
///
/// A failed `init` leaves the cell empty.
pub(crate) fn memo<'a, T, E>(
    cell: &'a OnceCell<T>,
    init: impl FnOnce() -> Result<T, E>,
) -> Result<&'a T, E> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}
