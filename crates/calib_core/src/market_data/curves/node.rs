//! Node-interpolated curve.

use crate::market_data::curves::traits::{node_tag, Curve};
use crate::market_data::error::CurveError;
use crate::types::{AdOrder, Dual};

/// Interpolation between adjacent nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Interpolation {
    /// Linear in node values.
    Linear,
    /// Linear in log node values (piecewise flat forwards for discount factors).
    #[default]
    LogLinear,
}

/// Curve defined by node values at increasing abscissae (knots, in years).
///
/// Outside the knot range the first or last segment is extended. A curve
/// with a single node is flat.
///
/// For [`Interpolation::LogLinear`] the log node values are derived state:
/// after [`Curve::set_node_value`] they are stale until [`Curve::recompute`].
///
/// # Examples
///
/// ```
/// use calib_core::market_data::{Curve, Interpolation, NodeCurve};
/// use calib_core::types::AdOrder;
///
/// let mut curve = NodeCurve::new("fwd", vec![0.0, 2.0], vec![1.0, 3.0], Interpolation::Linear)
///     .unwrap();
/// assert!((curve.value(1.0).unwrap().real() - 2.0).abs() < 1e-14);
///
/// curve.set_ad_order(AdOrder::Two);
/// let v = curve.value(1.0).unwrap();
/// assert_eq!(v.gradient(&["fwd_0", "fwd_1"]), vec![0.5, 0.5]);
/// ```
#[derive(Debug, Clone)]
pub struct NodeCurve {
    id: String,
    knots: Vec<f64>,
    nodes: Vec<Dual>,
    interpolation: Interpolation,
    solve_offset: usize,
    ad_order: AdOrder,
    log_nodes: Vec<Dual>,
}

impl NodeCurve {
    /// Create a curve with nodes tagged at first order and solve offset zero.
    ///
    /// # Arguments
    ///
    /// * `id` - Curve identifier, also the prefix of node variable tags
    /// * `knots` - Strictly increasing abscissae
    /// * `values` - Initial node values, one per knot
    /// * `interpolation` - Interpolation between nodes
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::InvalidNodes`] for empty or mismatched inputs,
    /// knots that are not strictly increasing, or non-positive values under
    /// log-linear interpolation.
    pub fn new(
        id: impl Into<String>,
        knots: Vec<f64>,
        values: Vec<f64>,
        interpolation: Interpolation,
    ) -> Result<Self, CurveError> {
        let id = id.into();
        if knots.is_empty() {
            return Err(CurveError::invalid_nodes(&id, "no nodes"));
        }
        if knots.len() != values.len() {
            return Err(CurveError::invalid_nodes(
                &id,
                format!("{} knots but {} values", knots.len(), values.len()),
            ));
        }
        if knots.windows(2).any(|w| w[1] <= w[0]) {
            return Err(CurveError::invalid_nodes(&id, "knots not strictly increasing"));
        }
        if interpolation == Interpolation::LogLinear && values.iter().any(|v| *v <= 0.0) {
            return Err(CurveError::invalid_nodes(
                &id,
                "log-linear interpolation requires positive node values",
            ));
        }

        let nodes = values.into_iter().map(Dual::constant).collect();
        let mut curve = Self {
            id,
            knots,
            nodes,
            interpolation,
            solve_offset: 0,
            ad_order: AdOrder::Zero,
            log_nodes: Vec::new(),
        };
        curve.set_ad_order(AdOrder::One);
        Ok(curve)
    }

    /// Log-linear discount curve whose first node (the anchor) is held fixed.
    pub fn discount(
        id: impl Into<String>,
        knots: Vec<f64>,
        values: Vec<f64>,
    ) -> Result<Self, CurveError> {
        Self::new(id, knots, values, Interpolation::LogLinear)?.with_solve_offset(1)
    }

    /// Linear curve with every node solver-controlled.
    pub fn line(id: impl Into<String>, knots: Vec<f64>, values: Vec<f64>) -> Result<Self, CurveError> {
        Self::new(id, knots, values, Interpolation::Linear)
    }

    /// Set the index of the first solver-controlled node.
    ///
    /// # Errors
    ///
    /// Returns [`CurveError::InvalidNodes`] if `offset` exceeds the node count.
    pub fn with_solve_offset(mut self, offset: usize) -> Result<Self, CurveError> {
        if offset > self.nodes.len() {
            return Err(CurveError::invalid_nodes(
                &self.id,
                format!("solve offset {} exceeds {} nodes", offset, self.nodes.len()),
            ));
        }
        self.solve_offset = offset;
        Ok(self)
    }

    /// Node abscissae.
    pub fn knots(&self) -> &[f64] {
        &self.knots
    }

    /// Interpolation method.
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }
}

impl Curve for NodeCurve {
    fn id(&self) -> &str {
        &self.id
    }

    fn nodes(&self) -> &[Dual] {
        &self.nodes
    }

    fn solve_offset(&self) -> usize {
        self.solve_offset
    }

    fn ad_order(&self) -> AdOrder {
        self.ad_order
    }

    fn set_ad_order(&mut self, order: AdOrder) {
        let id = &self.id;
        self.nodes = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| Dual::tagged(node.real(), node_tag(id, i), order))
            .collect();
        self.ad_order = order;
        self.recompute();
    }

    fn set_node_value(&mut self, index: usize, value: f64) -> Result<(), CurveError> {
        let len = self.nodes.len();
        let node = self
            .nodes
            .get_mut(index)
            .ok_or_else(|| CurveError::node_index_out_of_range(&self.id, index, len))?;
        *node = Dual::tagged(value, node_tag(&self.id, index), self.ad_order);
        Ok(())
    }

    fn recompute(&mut self) {
        self.log_nodes = match self.interpolation {
            Interpolation::LogLinear => self.nodes.iter().map(Dual::ln).collect(),
            Interpolation::Linear => Vec::new(),
        };
    }

    fn value(&self, x: f64) -> Result<Dual, CurveError> {
        if !x.is_finite() {
            return Err(CurveError::InvalidAbscissa {
                curve: self.id.clone(),
                x,
            });
        }
        let n = self.knots.len();
        if n == 1 {
            return Ok(self.nodes[0].clone());
        }
        let i = self.knots.partition_point(|&k| k <= x).clamp(1, n - 1) - 1;
        let w = (x - self.knots[i]) / (self.knots[i + 1] - self.knots[i]);
        let value = match self.interpolation {
            Interpolation::Linear => {
                &self.nodes[i] + &((&self.nodes[i + 1] - &self.nodes[i]) * w)
            }
            Interpolation::LogLinear => {
                let (l0, l1) = (&self.log_nodes[i], &self.log_nodes[i + 1]);
                (l0 + &((l1 - l0) * w)).exp()
            }
        };
        Ok(value)
    }

    fn box_clone(&self) -> Box<dyn Curve> {
        Box::new(self.clone())
    }
}
