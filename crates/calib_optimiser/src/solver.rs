//! Calibration solver.
//!
//! A [`Solver`] owns a set of curves and a set of instruments with target
//! quotes, and mutates the curves' solver-controlled nodes until the priced
//! rates match the targets in a weighted least-squares sense. Upstream
//! solvers passed as a dependency chain are owned read-only: their curves
//! can be priced against but are never mutated.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use calib_core::instruments::{CurveResolver, Instrument, PricingArgs, PricingContext};
use calib_core::market_data::{Curve, FxSource};
use calib_core::math::gradient_matrix;
use calib_core::types::{AdOrder, Dual};
use nalgebra::DMatrix;
use tracing::debug;

use crate::algorithms::Algorithm;
use crate::cache::{memo, Invalidation, SolverCache};
use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::iteration::IterationReport;
use crate::objective;
use crate::variables::{validate_unique_ids, InstrumentLabel, VariableSpace};

static SOLVER_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

fn next_solver_id() -> String {
    format!("solver{}", SOLVER_SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// An instrument together with the arguments it is priced with.
#[derive(Debug, Clone)]
pub(crate) struct CalibrationInstrument {
    pub instrument: Arc<dyn Instrument>,
    pub args: PricingArgs,
}

/// Multi-curve calibration solver.
///
/// Construction through [`SolverBuilder`] validates the inputs and runs the
/// iteration loop, so a built solver is already calibrated. Derived
/// quantities are computed lazily and cached until nodes, targets or the
/// differentiation order change.
///
/// # Examples
///
/// ```
/// use calib_core::instruments::ZeroRate;
/// use calib_core::market_data::NodeCurve;
/// use calib_optimiser::{Algorithm, Solver};
///
/// let curve = NodeCurve::discount("usd", vec![0.0, 1.0, 2.0], vec![1.0, 0.99, 0.98]).unwrap();
/// let solver = Solver::builder()
///     .id("usd")
///     .curve(curve)
///     .instrument(ZeroRate::new("usd", 1.0))
///     .instrument(ZeroRate::new("usd", 2.0))
///     .targets(vec![3.0, 3.5])
///     .algorithm(Algorithm::GaussNewton)
///     .build()
///     .unwrap();
///
/// assert!(solver.convergence().is_converged());
/// let rates = solver.rates().unwrap();
/// assert!((rates[1].real() - 3.5).abs() < 1e-8);
/// ```
#[derive(Debug, Clone)]
pub struct Solver {
    pub(crate) id: String,
    pub(crate) curves: Vec<Box<dyn Curve>>,
    pub(crate) instruments: Vec<CalibrationInstrument>,
    pub(crate) targets: Vec<Dual>,
    pub(crate) weights: Vec<f64>,
    pub(crate) labels: Vec<String>,
    pub(crate) fx: Option<Box<dyn FxSource>>,
    pub(crate) pre_solvers: Vec<Solver>,
    pub(crate) config: SolverConfig,
    pub(crate) space: VariableSpace,
    pub(crate) ad_order: AdOrder,
    pub(crate) cache: SolverCache,
    pub(crate) report: IterationReport,
}

impl Solver {
    /// Start building a solver.
    pub fn builder() -> SolverBuilder {
        SolverBuilder::new()
    }

    /// Solver identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Own variable tags.
    pub fn variables(&self) -> &[String] {
        self.space.variables()
    }

    /// Chain-wide variable tags, own tags last.
    pub fn aggregate_variables(&self) -> &[String] {
        self.space.aggregate_variables()
    }

    /// Variable layout including the dependency chain.
    pub fn variable_space(&self) -> &VariableSpace {
        &self.space
    }

    /// Own instrument labels.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Chain-wide instrument labels, own labels last.
    pub fn aggregate_labels(&self) -> &[InstrumentLabel] {
        self.space.aggregate_labels()
    }

    /// Instrument count.
    pub fn instrument_count(&self) -> usize {
        self.instruments.len()
    }

    /// Calibrating instruments with their pricing arguments.
    pub fn instruments(&self) -> impl Iterator<Item = (&dyn Instrument, &PricingArgs)> + '_ {
        self.instruments
            .iter()
            .map(|ci| (ci.instrument.as_ref(), &ci.args))
    }

    /// Target quotes.
    pub fn targets(&self) -> &[Dual] {
        &self.targets
    }

    /// Instrument weights.
    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    /// Solver configuration.
    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    /// Upstream solvers in chain order.
    pub fn pre_solvers(&self) -> &[Solver] {
        &self.pre_solvers
    }

    /// Current differentiation order.
    pub fn ad_order(&self) -> AdOrder {
        self.ad_order
    }

    /// Outcome of the latest iteration.
    pub fn convergence(&self) -> &IterationReport {
        &self.report
    }

    /// Curve `id` among own curves, then the dependency chain.
    pub fn curve(&self, id: &str) -> Option<&dyn Curve> {
        self.curves
            .iter()
            .find(|c| c.id() == id)
            .map(|c| c.as_ref())
            .or_else(|| self.pre_solvers.iter().find_map(|p| p.curve(id)))
    }

    /// Attached FX source, falling back to the first one in the chain.
    pub fn fx(&self) -> Option<&dyn FxSource> {
        self.fx
            .as_deref()
            .or_else(|| self.pre_solvers.iter().find_map(|p| p.fx()))
    }

    /// Identifiers of own curves and every curve in the chain.
    pub fn chain_curve_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .pre_solvers
            .iter()
            .flat_map(|p| p.chain_curve_ids())
            .collect();
        ids.extend(self.curves.iter().map(|c| c.id()));
        ids
    }

    /// Real values of the solver-controlled nodes, aligned with [`Solver::variables`].
    pub fn v(&self) -> &[f64] {
        self.cache.nodes.v.get_or_init(|| {
            self.curves
                .iter()
                .flat_map(|c| c.nodes()[c.solve_offset()..].iter().map(Dual::real))
                .collect()
        })
    }

    /// Instrument rates priced in this solver's context.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Pricing`] if an instrument cannot be priced.
    pub fn rates(&self) -> Result<&[Dual], SolverError> {
        memo(&self.cache.nodes.rates, || {
            self.instruments
                .iter()
                .map(|ci| self.price(ci.instrument.as_ref(), &ci.args))
                .collect()
        })
        .map(Vec::as_slice)
    }

    /// Errors `r − s`.
    ///
    /// # Errors
    ///
    /// Propagates pricing failures.
    pub fn errors(&self) -> Result<&[Dual], SolverError> {
        memo(&self.cache.targets.errors, || {
            Ok(objective::errors(self.rates()?, &self.targets))
        })
        .map(Vec::as_slice)
    }

    /// Weighted objective `xᵀ W x`.
    ///
    /// # Errors
    ///
    /// Propagates pricing failures.
    pub fn objective(&self) -> Result<&Dual, SolverError> {
        memo(&self.cache.targets.objective, || {
            Ok(objective::objective(self.errors()?, &self.weights))
        })
    }

    /// Jacobian `J[i, j] = ∂r_j/∂v_i`, variables × instruments.
    ///
    /// # Errors
    ///
    /// Propagates pricing failures.
    pub fn rate_jacobian(&self) -> Result<&DMatrix<f64>, SolverError> {
        memo(&self.cache.nodes.jacobian, || {
            Ok(gradient_matrix(self.rates()?, self.variables()))
        })
    }

    /// Price an arbitrary instrument in this solver's context.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::Pricing`] if a curve or FX rate is missing.
    pub fn price(&self, instrument: &dyn Instrument, args: &PricingArgs) -> Result<Dual, SolverError> {
        Ok(instrument.rate(&PricingContext::new(self, args))?)
    }

    /// Replace the targets.
    ///
    /// Node-derived quantities stay cached; call [`Solver::iterate`] to
    /// re-calibrate.
    ///
    /// # Errors
    ///
    /// Returns [`SolverError::LengthMismatch`] if the length differs from
    /// the instrument count.
    pub fn set_targets(&mut self, targets: Vec<f64>) -> Result<(), SolverError> {
        if targets.len() != self.instruments.len() {
            return Err(SolverError::length_mismatch(
                "targets",
                self.instruments.len(),
                targets.len(),
            ));
        }
        self.targets = targets.into_iter().map(Dual::constant).collect();
        self.invalidate(Invalidation::Targets);
        Ok(())
    }

    /// Switch the differentiation order of the whole chain.
    ///
    /// Upstream solvers, own curves and the FX source are re-tagged and all
    /// caches are discarded. Node real values do not change.
    pub fn set_ad_order(&mut self, order: AdOrder) {
        if order == self.ad_order {
            return;
        }
        for pre in &mut self.pre_solvers {
            pre.set_ad_order(order);
        }
        for curve in &mut self.curves {
            curve.set_ad_order(order);
        }
        if let Some(fx) = &mut self.fx {
            fx.set_ad_order(order);
        }
        self.ad_order = order;
        self.invalidate(Invalidation::AdOrder);
    }

    /// Run `f` with the targets re-tagged `s{i}` at `order`.
    ///
    /// The original targets are restored whether or not `f` succeeds.
    pub fn with_tagged_targets<R>(
        &mut self,
        order: AdOrder,
        f: impl FnOnce(&mut Self) -> Result<R, SolverError>,
    ) -> Result<R, SolverError> {
        let tagged = self
            .targets
            .iter()
            .enumerate()
            .map(|(i, s)| Dual::tagged(s.real(), format!("s{i}"), order))
            .collect();
        let original = std::mem::replace(&mut self.targets, tagged);
        self.invalidate(Invalidation::Targets);
        debug!(solver = %self.id, order = %order, "targets tagged");

        let result = f(self);

        self.targets = original;
        self.invalidate(Invalidation::Targets);
        result
    }

    /// Run `f` at differentiation order `order`, then restore the current order.
    pub fn with_ad_order<R>(
        &mut self,
        order: AdOrder,
        f: impl FnOnce(&mut Self) -> Result<R, SolverError>,
    ) -> Result<R, SolverError> {
        let previous = self.ad_order;
        if previous == order {
            return f(self);
        }
        self.set_ad_order(order);
        debug!(solver = %self.id, from = %previous, to = %order, "order switched");

        let result = f(self);

        self.set_ad_order(previous);
        result
    }

    /// Overwrite the solver-controlled nodes with the real parts of `v`.
    pub(crate) fn apply_step(&mut self, v: &[Dual]) -> Result<(), SolverError> {
        let expected = self.variables().len();
        if v.len() != expected {
            return Err(SolverError::length_mismatch("variables", expected, v.len()));
        }
        let mut values = v.iter().map(Dual::real);
        for curve in &mut self.curves {
            for index in curve.solve_offset()..curve.nodes().len() {
                if let Some(value) = values.next() {
                    curve.set_node_value(index, value)?;
                }
            }
            curve.recompute();
        }
        self.invalidate(Invalidation::Nodes);
        self.update_fx();
        Ok(())
    }

    pub(crate) fn update_fx(&mut self) {
        if let Some(fx) = &mut self.fx {
            fx.update();
        }
    }

    pub(crate) fn invalidate(&mut self, reason: Invalidation) {
        self.cache.invalidate(reason);
    }
}

impl CurveResolver for Solver {
    fn curve(&self, id: &str) -> Option<&dyn Curve> {
        Solver::curve(self, id)
    }

    fn fx(&self) -> Option<&dyn FxSource> {
        Solver::fx(self)
    }
}

/// Builder for [`Solver`].
#[derive(Debug, Default)]
pub struct SolverBuilder {
    id: Option<String>,
    curves: Vec<Box<dyn Curve>>,
    instruments: Vec<CalibrationInstrument>,
    targets: Vec<f64>,
    weights: Option<Vec<f64>>,
    labels: Option<Vec<String>>,
    fx: Option<Box<dyn FxSource>>,
    pre_solvers: Vec<Solver>,
    config: SolverConfig,
}

impl SolverBuilder {
    /// Empty builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the solver identifier.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Add a curve whose nodes this solver controls.
    pub fn curve<C: Curve + 'static>(self, curve: C) -> Self {
        self.boxed_curve(Box::new(curve))
    }

    /// Add an already boxed curve.
    pub fn boxed_curve(mut self, curve: Box<dyn Curve>) -> Self {
        self.curves.push(curve);
        self
    }

    /// Add a calibrating instrument priced with default arguments.
    pub fn instrument<I: Instrument + 'static>(self, instrument: I) -> Self {
        self.instrument_with_args(instrument, PricingArgs::default())
    }

    /// Add a calibrating instrument priced with `args`.
    pub fn instrument_with_args<I: Instrument + 'static>(
        mut self,
        instrument: I,
        args: PricingArgs,
    ) -> Self {
        self.instruments.push(CalibrationInstrument {
            instrument: Arc::new(instrument),
            args,
        });
        self
    }

    /// Set the target quotes, one per instrument.
    pub fn targets(mut self, targets: Vec<f64>) -> Self {
        self.targets = targets;
        self
    }

    /// Set the instrument weights. Defaults to all ones.
    pub fn weights(mut self, weights: Vec<f64>) -> Self {
        self.weights = Some(weights);
        self
    }

    /// Set the instrument labels. Defaults to `"{id}{i}"`.
    pub fn labels<S: Into<String>>(mut self, labels: impl IntoIterator<Item = S>) -> Self {
        self.labels = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    /// Attach an FX source.
    pub fn fx<F: FxSource + 'static>(mut self, fx: F) -> Self {
        self.fx = Some(Box::new(fx));
        self
    }

    /// Append an upstream solver to the dependency chain.
    pub fn pre_solver(mut self, solver: Solver) -> Self {
        self.pre_solvers.push(solver);
        self
    }

    /// Set the optimisation algorithm.
    pub fn algorithm(mut self, algorithm: Algorithm) -> Self {
        self.config.algorithm = algorithm;
        self
    }

    /// Set the iteration budget.
    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.config.max_iter = max_iter;
        self
    }

    /// Set the objective tolerance.
    pub fn func_tol(mut self, func_tol: f64) -> Self {
        self.config.func_tol = func_tol;
        self
    }

    /// Set the improvement tolerance.
    pub fn conv_tol(mut self, conv_tol: f64) -> Self {
        self.config.conv_tol = conv_tol;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: SolverConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the inputs and calibrate.
    ///
    /// # Errors
    ///
    /// - [`SolverError::LengthMismatch`] when targets, weights or labels do
    ///   not match the instrument count
    /// - [`SolverError::InvalidWeight`] for negative or non-finite weights
    /// - [`SolverError::DuplicateCurveId`] for a curve id repeated across
    ///   the chain
    /// - any error raised while iterating
    pub fn build(self) -> Result<Solver, SolverError> {
        let m = self.instruments.len();
        if self.targets.len() != m {
            return Err(SolverError::length_mismatch("targets", m, self.targets.len()));
        }
        let weights = self.weights.unwrap_or_else(|| vec![1.0; m]);
        if weights.len() != m {
            return Err(SolverError::length_mismatch("weights", m, weights.len()));
        }
        if let Some((index, &weight)) = weights
            .iter()
            .enumerate()
            .find(|(_, w)| !w.is_finite() || **w < 0.0)
        {
            return Err(SolverError::InvalidWeight { index, weight });
        }

        let id = self.id.unwrap_or_else(next_solver_id);
        let labels = match self.labels {
            Some(labels) if labels.len() != m => {
                return Err(SolverError::length_mismatch("labels", m, labels.len()));
            }
            Some(labels) => labels,
            None => (0..m).map(|i| format!("{id}{i}")).collect(),
        };

        let mut ids: Vec<&str> = self
            .pre_solvers
            .iter()
            .flat_map(|p| p.chain_curve_ids())
            .collect();
        ids.extend(self.curves.iter().map(|c| c.id()));
        validate_unique_ids(ids)?;

        let rate_scalars: Vec<f64> = self
            .instruments
            .iter()
            .map(|ci| ci.instrument.rate_scalar())
            .collect();
        let pre_spaces: Vec<&VariableSpace> = self.pre_solvers.iter().map(|p| &p.space).collect();
        let space = VariableSpace::new(&self.curves, &id, &labels, &rate_scalars, &pre_spaces);

        let mut curves = self.curves;
        for curve in &mut curves {
            curve.set_ad_order(AdOrder::One);
            curve.recompute();
        }
        let mut fx = self.fx;
        if let Some(fx) = &mut fx {
            fx.set_ad_order(AdOrder::One);
        }
        let mut pre_solvers = self.pre_solvers;
        for pre in &mut pre_solvers {
            pre.set_ad_order(AdOrder::One);
        }

        let mut solver = Solver {
            report: IterationReport::new(self.config.algorithm),
            id,
            curves,
            instruments: self.instruments,
            targets: self.targets.into_iter().map(Dual::constant).collect(),
            weights,
            labels,
            fx,
            pre_solvers,
            config: self.config,
            space,
            ad_order: AdOrder::One,
            cache: SolverCache::default(),
        };
        solver.iterate()?;
        Ok(solver)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use calib_core::instruments::Value;
    use calib_core::market_data::NodeCurve;

    fn line(id: &str, values: Vec<f64>) -> NodeCurve {
        let knots = (0..values.len()).map(|i| i as f64).collect();
        NodeCurve::line(id, knots, values).unwrap()
    }

    fn value_solver(id: &str) -> Solver {
        Solver::builder()
            .id(id)
            .curve(line(id, vec![0.0, 0.0]))
            .instrument(Value::new(id, 0.0))
            .instrument(Value::new(id, 1.0))
            .targets(vec![1.0, 2.0])
            .algorithm(Algorithm::GaussNewton)
            .build()
            .unwrap()
    }

    // ========================================
    // Construction Tests
    // ========================================

    #[test]
    fn test_build_calibrates() {
        let solver = value_solver("a");
        assert_eq!(solver.variables(), &["a_0", "a_1"]);
        assert_relative_eq!(solver.v()[0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(solver.v()[1], 2.0, epsilon = 1e-12);
        assert_eq!(solver.labels(), &["a0", "a1"]);
    }

    #[test]
    fn test_default_algorithm_is_gauss_newton() {
        let solver = Solver::builder()
            .curve(line("d", vec![0.0]))
            .instrument(Value::new("d", 0.0))
            .targets(vec![3.0])
            .build()
            .unwrap();
        assert_eq!(solver.config().algorithm, Algorithm::GaussNewton);
        assert_eq!(solver.convergence().algorithm, Algorithm::GaussNewton);
        assert_eq!(solver.convergence().history.len(), 2);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let err = Solver::builder()
            .curve(line("a", vec![0.0, 0.0]))
            .instrument(Value::new("a", 0.0))
            .targets(vec![1.0, 2.0])
            .build()
            .unwrap_err();
        assert_eq!(err, SolverError::length_mismatch("targets", 1, 2));

        let err = Solver::builder()
            .curve(line("a", vec![0.0]))
            .instrument(Value::new("a", 0.0))
            .targets(vec![1.0])
            .weights(vec![1.0, 1.0])
            .build()
            .unwrap_err();
        assert!(err.is_length_mismatch());

        let err = Solver::builder()
            .curve(line("a", vec![0.0]))
            .instrument(Value::new("a", 0.0))
            .targets(vec![1.0])
            .labels(["x", "y"])
            .build()
            .unwrap_err();
        assert!(err.is_length_mismatch());
    }

    #[test]
    fn test_negative_weight_rejected() {
        let err = Solver::builder()
            .curve(line("a", vec![0.0]))
            .instrument(Value::new("a", 0.0))
            .targets(vec![1.0])
            .weights(vec![-1.0])
            .build()
            .unwrap_err();
        assert!(matches!(err, SolverError::InvalidWeight { index: 0, .. }));
    }

    #[test]
    fn test_duplicate_curve_in_chain_rejected() {
        let pre = value_solver("a");
        let err = Solver::builder()
            .curve(line("a", vec![0.0]))
            .instrument(Value::new("a", 0.0))
            .targets(vec![1.0])
            .pre_solver(pre)
            .build()
            .unwrap_err();
        assert!(err.is_duplicate_curve_id());
    }

    #[test]
    fn test_default_ids_are_sequenced() {
        let a = Solver::builder().build().unwrap();
        let b = Solver::builder().build().unwrap();
        assert!(a.id().starts_with("solver"));
        assert_ne!(a.id(), b.id());
    }

    // ========================================
    // Cache and Scope Tests
    // ========================================

    #[test]
    fn test_set_targets_keeps_rates() {
        let mut solver = value_solver("a");
        let rates_before = solver.rates().unwrap().to_vec();
        solver.set_targets(vec![1.5, 2.0]).unwrap();
        assert!(solver.cache.nodes.rates.get().is_some());
        assert_eq!(solver.rates().unwrap(), rates_before.as_slice());
        assert_relative_eq!(solver.errors().unwrap()[0].real(), -0.5, epsilon = 1e-12);
        assert!(solver.set_targets(vec![1.0]).unwrap_err().is_length_mismatch());
    }

    #[test]
    fn test_tagged_targets_restored_on_error() {
        let mut solver = value_solver("a");
        let result: Result<(), SolverError> = solver.with_tagged_targets(AdOrder::One, |s| {
            assert_eq!(s.targets()[1].vars(), &["s1".to_string()]);
            Err(SolverError::unknown_algorithm("x"))
        });
        assert!(result.is_err());
        assert!(solver.targets().iter().all(Dual::is_constant));
    }

    #[test]
    fn test_ad_order_scope_restores() {
        let mut solver = value_solver("a");
        let order = solver
            .with_ad_order(AdOrder::Two, |s| {
                assert_eq!(s.rates()?[0].order(), AdOrder::Two);
                Ok(s.ad_order())
            })
            .unwrap();
        assert_eq!(order, AdOrder::Two);
        assert_eq!(solver.ad_order(), AdOrder::One);
        assert_eq!(solver.rates().unwrap()[0].order(), AdOrder::One);
    }

    #[test]
    fn test_curve_lookup_through_chain() {
        let pre = value_solver("a");
        let solver = Solver::builder()
            .id("b")
            .curve(line("b", vec![0.0]))
            .instrument(Value::new("b", 0.0))
            .targets(vec![1.0])
            .pre_solver(pre)
            .build()
            .unwrap();
        assert!(solver.curve("a").is_some());
        assert!(solver.curve("b").is_some());
        assert!(solver.curve("c").is_none());
        assert_eq!(solver.chain_curve_ids(), vec!["a", "b"]);
        assert_eq!(solver.aggregate_variables(), &["a_0", "a_1", "b_0"]);
    }
}
