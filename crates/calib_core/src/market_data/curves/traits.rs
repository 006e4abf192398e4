//! Calibratable curve trait definition.

use std::fmt;

use crate::market_data::error::CurveError;
use crate::types::{AdOrder, Dual};

/// Variable tag of node `index` on curve `curve_id`.
///
/// Tags take the form `"{curve_id}_{index}"`; the numeric suffix keeps tags
/// of distinct curves disjoint as long as curve identifiers are unique.
///
/// ```
/// use calib_core::market_data::node_tag;
///
/// assert_eq!(node_tag("eur_ois", 3), "eur_ois_3");
/// ```
pub fn node_tag(curve_id: &str, index: usize) -> String {
    format!("{curve_id}_{index}")
}

/// A curve parameterised by nodes that a solver may overwrite in place.
///
/// # Contract
///
/// - `nodes()` exposes every node; the solver controls nodes
///   `solve_offset()..nodes().len()`
/// - `set_node_value(i, x)` replaces node `i` by `x` tagged with
///   [`node_tag`]`(id, i)` at the curve's current [`AdOrder`]
/// - `recompute()` must be called after node mutation and refreshes any
///   state derived from the nodes
/// - `set_ad_order(order)` re-tags every node at `order` without changing
///   real values
///
/// The default rate methods interpret `value(t)` as a discount factor.
///
/// # Example
///
/// ```
/// use calib_core::market_data::{Curve, NodeCurve};
///
/// let mut curve = NodeCurve::discount("usd", vec![0.0, 1.0], vec![1.0, 0.95]).unwrap();
/// curve.set_node_value(1, 0.96).unwrap();
/// curve.recompute();
/// assert!((curve.value(1.0).unwrap().real() - 0.96).abs() < 1e-14);
///
/// let zero = curve.zero_rate(1.0).unwrap();
/// assert!((zero.real() + 100.0 * 0.96_f64.ln()).abs() < 1e-12);
/// ```
pub trait Curve: fmt::Debug + Send + Sync {
    /// Unique curve identifier.
    fn id(&self) -> &str;

    /// All node values, including those the solver does not control.
    fn nodes(&self) -> &[Dual];

    /// Index of the first solver-controlled node.
    fn solve_offset(&self) -> usize {
        0
    }

    /// Differentiation order currently carried by the nodes.
    fn ad_order(&self) -> AdOrder;

    /// Re-tag every node at `order`.
    fn set_ad_order(&mut self, order: AdOrder);

    /// Overwrite node `index` with `value`, tagged at the current order.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::NodeIndexOutOfRange`] for an invalid index.
    fn set_node_value(&mut self, index: usize, value: f64) -> Result<(), CurveError>;

    /// Refresh state derived from the nodes.
    fn recompute(&mut self);

    /// Evaluate the curve at abscissa `x`.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::InvalidAbscissa`] when `x` is outside the domain.
    fn value(&self, x: f64) -> Result<Dual, CurveError>;

    /// Clone into a boxed trait object.
    fn box_clone(&self) -> Box<dyn Curve>;

    /// Variable tags of the solver-controlled nodes, in node order.
    fn variable_tags(&self) -> Vec<String> {
        (self.solve_offset()..self.nodes().len())
            .map(|i| node_tag(self.id(), i))
            .collect()
    }

    /// Continuously compounded zero rate to `t`, in percent.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::InvalidAbscissa`] if `t <= 0`.
    fn zero_rate(&self, t: f64) -> Result<Dual, CurveError> {
        if t <= 0.0 {
            return Err(CurveError::InvalidAbscissa {
                curve: self.id().to_string(),
                x: t,
            });
        }
        Ok(self.value(t)?.ln() * (-100.0 / t))
    }

    /// Simple forward rate between `t1` and `t2`, in percent.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::InvalidAbscissa`] if `t2 <= t1`.
    fn forward_rate(&self, t1: f64, t2: f64) -> Result<Dual, CurveError> {
        if t2 <= t1 {
            return Err(CurveError::InvalidAbscissa {
                curve: self.id().to_string(),
                x: t2,
            });
        }
        let df1 = self.value(t1)?;
        let df2 = self.value(t2)?;
        Ok((&df1 / &df2 - 1.0) * (100.0 / (t2 - t1)))
    }
}

impl Clone for Box<dyn Curve> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
