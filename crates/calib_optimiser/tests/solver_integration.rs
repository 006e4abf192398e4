//! Integration tests for the calibration solver.
//!
//! These tests exercise calibration end to end: convergence of each
//! algorithm, agreement between the first-order sensitivity methods,
//! second-order sensitivities against finite differences, and chain
//! aggregation against an equivalent single solver.

use approx::{assert_abs_diff_eq, assert_relative_eq};
use calib_core::instruments::{ForwardRate, SpreadRate, Value, ZeroRate};
use calib_core::market_data::NodeCurve;
use calib_core::types::{AdOrder, Dual};
use calib_optimiser::prelude::*;
use nalgebra::{DMatrix, DVector};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("calib_optimiser=debug")
        .try_init();
}

fn line(id: &str, knots: Vec<f64>, values: Vec<f64>) -> NodeCurve {
    NodeCurve::line(id, knots, values).unwrap()
}

fn discount(id: &str, values: Vec<f64>) -> NodeCurve {
    let knots = (0..values.len()).map(|i| i as f64).collect();
    NodeCurve::discount(id, knots, values).unwrap()
}

/// Zero, forward and zero rate on a four-node discount curve.
fn usd_solver(nodes: Vec<f64>, targets: Vec<f64>, algorithm: Algorithm) -> Solver {
    Solver::builder()
        .id("usd")
        .curve(discount("usd", nodes))
        .instrument(ZeroRate::new("usd", 1.0))
        .instrument(ForwardRate::new("usd", 1.0, 2.0))
        .instrument(ZeroRate::new("usd", 3.0))
        .targets(targets)
        .algorithm(algorithm)
        .build()
        .unwrap()
}

/// Rates implied by discount nodes `[1, v1, v2, v3]`.
fn implied_targets(v: &[f64; 3]) -> Vec<f64> {
    vec![
        -100.0 * v[0].ln(),
        (v[0] / v[1] - 1.0) * 100.0,
        -100.0 * v[2].ln() / 3.0,
    ]
}

// ============================================================================
// Convergence Tests
// ============================================================================

/// A linear system is solved exactly by one Gauss-Newton cycle.
#[test]
fn test_linear_gauss_newton_one_cycle() {
    init_tracing();
    let solver = Solver::builder()
        .curve(line("a", vec![0.0, 1.0], vec![0.0, 0.0]))
        .instrument(Value::new("a", 0.25))
        .instrument(Value::new("a", 0.75))
        .targets(vec![1.5, 0.0])
        .algorithm(Algorithm::GaussNewton)
        .build()
        .unwrap();

    let report = solver.convergence();
    assert_eq!(report.state, ConvergenceState::ConvergedFunctionValue);
    assert_eq!(report.iterations, 1);
    assert_eq!(report.history.len(), 2);
    assert_relative_eq!(report.history[0], 2.25);
    assert!(report.history[1] < 1e-20);
    assert_eq!(report.algorithm, Algorithm::GaussNewton);
}

#[test]
fn test_levenberg_marquardt_converges() {
    init_tracing();
    let targets = vec![2.0, 2.6, 2.4];
    let solver = usd_solver(vec![1.0, 1.0, 1.0, 1.0], targets.clone(), Algorithm::LevenbergMarquardt);

    assert!(solver.convergence().is_converged());
    assert!(solver.convergence().iterations > 1);
    for (r, s) in solver.rates().unwrap().iter().zip(&targets) {
        assert_abs_diff_eq!(r.real(), *s, epsilon = 1e-5);
    }
}

#[test]
fn test_gradient_descent_converges_on_linear_problem() {
    let solver = Solver::builder()
        .curve(line("a", vec![0.0, 1.0], vec![0.0, 0.0]))
        .instrument(Value::new("a", 0.25))
        .instrument(Value::new("a", 0.75))
        .targets(vec![1.5, 0.5])
        .algorithm(Algorithm::GradientDescent)
        .max_iter(500)
        .build()
        .unwrap();

    assert!(solver.convergence().is_converged());
    assert_abs_diff_eq!(solver.v()[0], 2.0, epsilon = 1e-5);
    assert_abs_diff_eq!(solver.v()[1], 0.0, epsilon = 1e-5);
}

#[test]
fn test_overdetermined_weighted_fit() {
    let solver = Solver::builder()
        .curve(line("a", vec![0.0], vec![0.0]))
        .instrument(Value::new("a", 0.0))
        .instrument(Value::new("a", 0.0))
        .targets(vec![1.0, 4.0])
        .weights(vec![2.0, 1.0])
        .algorithm(Algorithm::GaussNewton)
        .max_iter(5)
        .build()
        .unwrap();

    // argmin 2 (v − 1)² + (v − 4)²  =  2
    assert_relative_eq!(solver.v()[0], 2.0, epsilon = 1e-10);
    assert_relative_eq!(solver.convergence().objective, 6.0, epsilon = 1e-10);
    let g = solver.sensitivity().unwrap();
    assert_eq!(g.shape(), (2, 1));
}

#[test]
fn test_max_iter_exhausted_is_not_an_error() {
    init_tracing();
    let solver = Solver::builder()
        .curve(discount("usd", vec![1.0, 1.0, 1.0, 1.0]))
        .instrument(ZeroRate::new("usd", 1.0))
        .instrument(ZeroRate::new("usd", 2.0))
        .instrument(ZeroRate::new("usd", 3.0))
        .targets(vec![5.0, 5.5, 6.0])
        .algorithm(Algorithm::GradientDescent)
        .max_iter(1)
        .build()
        .unwrap();

    let report = solver.convergence();
    assert_eq!(report.state, ConvergenceState::MaxIterationsExhausted);
    assert_eq!(report.iterations, 1);
    assert!(report.ensure_converged().unwrap_err().is_not_converged());
}

// ============================================================================
// Construction Error Tests
// ============================================================================

#[test]
fn test_construction_errors() {
    let err = Solver::builder()
        .curve(discount("usd", vec![1.0, 1.0]))
        .instrument(ZeroRate::new("usd", 1.0))
        .targets(vec![1.0, 2.0])
        .build()
        .unwrap_err();
    assert!(err.is_length_mismatch());

    let upstream = usd_solver(vec![1.0, 0.98, 0.96, 0.94], vec![2.0, 2.0, 2.0], Algorithm::GaussNewton);
    let err = Solver::builder()
        .curve(discount("usd", vec![1.0, 1.0]))
        .instrument(ZeroRate::new("usd", 1.0))
        .targets(vec![1.0])
        .pre_solver(upstream)
        .build()
        .unwrap_err();
    assert!(err.is_duplicate_curve_id());

    assert!(matches!(
        "newton".parse::<Algorithm>(),
        Err(SolverError::UnknownAlgorithm(name)) if name == "newton"
    ));
}

// ============================================================================
// First-Order Sensitivity Tests
// ============================================================================

#[test]
fn test_sensitivity_methods_agree() {
    let v = [0.98, 0.955, 0.93];
    let mut solver = usd_solver(vec![1.0, 0.99, 0.97, 0.95], implied_targets(&v), Algorithm::GaussNewton);

    let analytical = solver.sensitivity().unwrap().clone();
    let dual = solver
        .sensitivity_with(SensitivityMethod::DualFinalIteration)
        .unwrap();
    assert_abs_diff_eq!(analytical, dual, epsilon = 1e-8);

    let fixed = solver.sensitivity_with(SensitivityMethod::FixedPoint).unwrap();
    assert_abs_diff_eq!(analytical, fixed, epsilon = 1e-8);

    assert_eq!(solver.ad_order(), AdOrder::One);
    assert!(solver.targets().iter().all(Dual::is_constant));
}

#[test]
fn test_weighted_overdetermined_sensitivity_methods_agree() {
    let mut solver = Solver::builder()
        .id("w")
        .curve(discount("w", vec![1.0, 0.99, 0.97]))
        .instrument(ZeroRate::new("w", 1.0))
        .instrument(ForwardRate::new("w", 1.0, 2.0))
        .instrument(ZeroRate::new("w", 2.0))
        .targets(vec![2.0, 3.5, 2.5])
        .weights(vec![1.0, 5.0, 1.0])
        .algorithm(Algorithm::GaussNewton)
        .max_iter(20)
        .build()
        .unwrap();
    assert!(solver.objective().unwrap().real() > 1e-4);

    let analytical = solver.sensitivity().unwrap().clone();
    assert_eq!(analytical.shape(), (3, 2));
    let dual = solver
        .sensitivity_with(SensitivityMethod::DualFinalIteration)
        .unwrap();
    assert_abs_diff_eq!(analytical, dual, epsilon = 1e-8);
    assert!(solver.targets().iter().all(Dual::is_constant));
}

#[test]
fn test_weighted_fixed_point_is_weighted_least_squares_derivative() {
    let mut solver = Solver::builder()
        .id("w")
        .curve(line("w", vec![0.0, 1.0], vec![0.0, 0.0]))
        .instrument(Value::new("w", 0.0))
        .instrument(Value::new("w", 0.5))
        .instrument(Value::new("w", 1.0))
        .targets(vec![1.0, 2.0, 2.5])
        .weights(vec![1.0, 5.0, 1.0])
        .algorithm(Algorithm::GaussNewton)
        .max_iter(5)
        .build()
        .unwrap();

    let j = solver.rate_jacobian().unwrap().clone();
    let w = DMatrix::from_diagonal(&DVector::from_vec(vec![1.0, 5.0, 1.0]));
    let normal = (&j * &w * j.transpose()).try_inverse().unwrap();
    let expected = &w * j.transpose() * normal;

    let fixed = solver.sensitivity_with(SensitivityMethod::FixedPoint).unwrap();
    assert_abs_diff_eq!(fixed, expected, epsilon = 1e-10);
    assert_eq!(solver.ad_order(), AdOrder::One);
}

#[test]
fn test_sensitivity_matches_bump_and_resolve() {
    let v = [0.98, 0.955, 0.93];
    let targets = implied_targets(&v);
    let base = usd_solver(vec![1.0, v[0], v[1], v[2]], targets.clone(), Algorithm::GaussNewton);
    let g = base.sensitivity().unwrap().clone();

    let ds = 1e-6;
    for i in 0..3 {
        let mut bumped = base.clone();
        let mut t = targets.clone();
        t[i] += ds;
        bumped.set_targets(t).unwrap();
        bumped.iterate().unwrap();
        for j in 0..3 {
            let fd = (bumped.v()[j] - base.v()[j]) / ds;
            assert_abs_diff_eq!(fd, g[(i, j)], epsilon = 1e-7);
        }
    }
}

#[test]
fn test_bump_round_trip_restores_nodes() {
    let v = [0.98, 0.955, 0.93];
    let targets = implied_targets(&v);
    let mut solver = usd_solver(vec![1.0, 0.99, 0.97, 0.95], targets.clone(), Algorithm::GaussNewton);
    let v0 = solver.v().to_vec();

    let mut bumped = targets.clone();
    bumped[1] += 0.01;
    solver.set_targets(bumped).unwrap();
    solver.iterate().unwrap();
    assert!((solver.v()[1] - v0[1]).abs() > 1e-6);

    solver.set_targets(targets).unwrap();
    solver.iterate().unwrap();
    for (a, b) in solver.v().iter().zip(&v0) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-10);
    }
}

// ============================================================================
// Second-Order Sensitivity Tests
// ============================================================================

#[test]
fn test_second_order_matches_forward_difference() {
    init_tracing();
    let v = [0.98, 0.955, 0.93];
    let mut solver = usd_solver(vec![1.0, v[0], v[1], v[2]], implied_targets(&v), Algorithm::GaussNewton);
    let v_before = solver.v().to_vec();
    let s_before: Vec<f64> = solver.targets().iter().map(Dual::real).collect();

    solver.set_ad_order(AdOrder::Two);
    let analytical = solver.second_sensitivity().unwrap().clone();
    let fd = solver.second_sensitivity_forward_difference().unwrap();

    assert_eq!(analytical.shape(), (3, 3, 3));
    assert!(analytical.max_abs_diff(&fd) < 1e-7);
    assert!(analytical.as_slice().iter().any(|x| x.abs() > 1e-6));

    // The solver itself is left untouched.
    assert_eq!(solver.v(), v_before.as_slice());
    let s_after: Vec<f64> = solver.targets().iter().map(Dual::real).collect();
    assert_eq!(s_after, s_before);
}

#[test]
fn test_second_order_symmetric_in_targets() {
    let mut solver = usd_solver(vec![1.0, 0.99, 0.98, 0.97], vec![1.8, 2.4, 2.2], Algorithm::GaussNewton);
    solver.set_ad_order(AdOrder::Two);
    let t = solver.second_sensitivity().unwrap();
    let (m, _, n) = t.shape();
    for h in 0..m {
        for a in 0..m {
            for z in 0..n {
                assert_abs_diff_eq!(t[(h, a, z)], t[(a, h, z)], epsilon = 1e-14);
            }
        }
    }
}

#[test]
fn test_second_order_state_error_and_recovery() {
    let mut solver = usd_solver(vec![1.0, 0.99, 0.98, 0.97], vec![1.8, 2.4, 2.2], Algorithm::GaussNewton);
    let err = solver.second_sensitivity().unwrap_err();
    assert_eq!(
        err.to_string(),
        "Differentiation order 2 required but solver is at order 1"
    );

    solver.set_ad_order(AdOrder::Two);
    assert!(solver.second_sensitivity().is_ok());
    solver.set_ad_order(AdOrder::One);
    assert!(solver.rate_hessian().unwrap_err().is_ad_order_required());
}

// ============================================================================
// Dependency Chain Tests
// ============================================================================

fn chained() -> (Solver, Solver) {
    let a_targets = vec![2.0, 2.5];
    let b_targets = vec![15.0, 20.0];

    let upstream = Solver::builder()
        .id("A")
        .curve(discount("a", vec![1.0, 0.99, 0.98]))
        .instrument(ZeroRate::new("a", 1.0))
        .instrument(ZeroRate::new("a", 2.0))
        .targets(a_targets.clone())
        .algorithm(Algorithm::GaussNewton)
        .build()
        .unwrap();
    let downstream = Solver::builder()
        .id("B")
        .curve(discount("b", vec![1.0, 0.99, 0.98]))
        .instrument(SpreadRate::new("b", "a", 0.0, 1.0))
        .instrument(SpreadRate::new("b", "a", 1.0, 2.0))
        .targets(b_targets.clone())
        .algorithm(Algorithm::GaussNewton)
        .pre_solver(upstream)
        .build()
        .unwrap();

    let combined = Solver::builder()
        .id("C")
        .curve(discount("a", vec![1.0, 0.99, 0.98]))
        .curve(discount("b", vec![1.0, 0.99, 0.98]))
        .instrument(ZeroRate::new("a", 1.0))
        .instrument(ZeroRate::new("a", 2.0))
        .instrument(SpreadRate::new("b", "a", 0.0, 1.0))
        .instrument(SpreadRate::new("b", "a", 1.0, 2.0))
        .targets(a_targets.into_iter().chain(b_targets).collect())
        .algorithm(Algorithm::GaussNewton)
        .build()
        .unwrap();

    (downstream, combined)
}

#[test]
fn test_chain_layout() {
    let (downstream, combined) = chained();
    assert_eq!(downstream.aggregate_variables(), combined.variables());
    assert_eq!(downstream.variables(), &["b_1", "b_2"]);
    let labels: Vec<(&str, &str)> = downstream
        .aggregate_labels()
        .iter()
        .map(|l| (l.solver.as_str(), l.label.as_str()))
        .collect();
    assert_eq!(labels, vec![("A", "A0"), ("A", "A1"), ("B", "B0"), ("B", "B1")]);
    assert_eq!(
        downstream.variable_space().aggregate_rate_scalars(),
        &[1.0, 1.0, 100.0, 100.0]
    );
}

#[test]
fn test_chain_sensitivity_matches_combined_solver() {
    let (downstream, combined) = chained();
    let chain = downstream.sensitivity_chain().unwrap();
    let single = combined.sensitivity().unwrap();
    assert_eq!(chain.shape(), (4, 4));
    assert_abs_diff_eq!(chain, single, epsilon = 1e-8);

    // Upstream targets move downstream nodes; downstream targets leave upstream nodes alone.
    assert!(chain[(0, 2)].abs() > 1e-6);
    assert_eq!(chain[(2, 0)], 0.0);
}

#[test]
fn test_chain_second_order_matches_combined_solver() {
    let (mut downstream, mut combined) = chained();
    downstream.set_ad_order(AdOrder::Two);
    combined.set_ad_order(AdOrder::Two);
    assert_eq!(downstream.pre_solvers()[0].ad_order(), AdOrder::Two);

    let chain = downstream.second_sensitivity_chain().unwrap();
    let single = combined.second_sensitivity().unwrap();
    assert_eq!(chain.shape(), (4, 4, 4));
    assert!(chain.max_abs_diff(single) < 1e-8);

    let j2_chain = downstream.rate_hessian_chain().unwrap();
    let j2_single = combined.rate_hessian().unwrap();
    assert!(j2_chain.max_abs_diff(j2_single) < 1e-8);
}

#[test]
fn test_chain_rates_in_aggregate_order() {
    let (downstream, combined) = chained();
    let chain: Vec<f64> = downstream.chain_rates().unwrap().iter().map(Dual::real).collect();
    let single: Vec<f64> = combined.rates().unwrap().iter().map(Dual::real).collect();
    for (a, b) in chain.iter().zip(&single) {
        assert_abs_diff_eq!(*a, *b, epsilon = 1e-8);
    }
}

fn zero_link(id: &str, curve: &str, targets: Vec<f64>) -> Solver {
    Solver::builder()
        .id(id)
        .curve(discount(curve, vec![1.0, 0.99, 0.98]))
        .instrument(ZeroRate::new(curve, 1.0))
        .instrument(ZeroRate::new(curve, 2.0))
        .targets(targets)
        .build()
        .unwrap()
}

fn assert_chain_matches_combined(mut chain: Solver, mut combined: Solver) {
    assert_eq!(chain.aggregate_variables(), combined.variables());

    let g_chain = chain.sensitivity_chain().unwrap().clone();
    let g_single = combined.sensitivity().unwrap();
    assert_eq!(g_chain.shape(), g_single.shape());
    assert_abs_diff_eq!(g_chain, *g_single, epsilon = 1e-8);

    chain.set_ad_order(AdOrder::Two);
    combined.set_ad_order(AdOrder::Two);
    let j2_chain = chain.rate_hessian_chain().unwrap();
    let j2_single = combined.rate_hessian().unwrap();
    assert!(j2_chain.max_abs_diff(j2_single) < 1e-8);

    let h_chain = chain.second_sensitivity_chain().unwrap();
    let h_single = combined.second_sensitivity().unwrap();
    assert_eq!(h_chain.shape(), h_single.shape());
    assert!(h_chain.max_abs_diff(h_single) < 1e-8);
}

#[test]
fn test_nested_chain_matches_combined_solver() {
    let a = zero_link("A", "a", vec![2.0, 2.5]);
    let b = Solver::builder()
        .id("B")
        .curve(discount("b", vec![1.0, 0.99, 0.98]))
        .instrument(SpreadRate::new("b", "a", 0.0, 1.0))
        .instrument(SpreadRate::new("b", "a", 1.0, 2.0))
        .targets(vec![15.0, 20.0])
        .pre_solver(a)
        .build()
        .unwrap();
    let c = Solver::builder()
        .id("C")
        .curve(discount("c", vec![1.0, 0.99, 0.98]))
        .instrument(SpreadRate::new("c", "b", 0.0, 1.0))
        .instrument(SpreadRate::new("c", "b", 1.0, 2.0))
        .targets(vec![10.0, 12.0])
        .pre_solver(b)
        .build()
        .unwrap();
    assert!(c.convergence().is_converged());

    let labels: Vec<&str> = c.aggregate_labels().iter().map(|l| l.solver.as_str()).collect();
    assert_eq!(labels, vec!["A", "A", "B", "B", "C", "C"]);

    // A's targets reach C's nodes through B.
    let g = c.sensitivity_chain().unwrap();
    assert!(g[(0, 4)].abs() > 1e-6);
    assert_eq!(g[(4, 0)], 0.0);

    let combined = Solver::builder()
        .id("ABC")
        .curve(discount("a", vec![1.0, 0.99, 0.98]))
        .curve(discount("b", vec![1.0, 0.99, 0.98]))
        .curve(discount("c", vec![1.0, 0.99, 0.98]))
        .instrument(ZeroRate::new("a", 1.0))
        .instrument(ZeroRate::new("a", 2.0))
        .instrument(SpreadRate::new("b", "a", 0.0, 1.0))
        .instrument(SpreadRate::new("b", "a", 1.0, 2.0))
        .instrument(SpreadRate::new("c", "b", 0.0, 1.0))
        .instrument(SpreadRate::new("c", "b", 1.0, 2.0))
        .targets(vec![2.0, 2.5, 15.0, 20.0, 10.0, 12.0])
        .build()
        .unwrap();

    assert_chain_matches_combined(c, combined);
}

#[test]
fn test_fan_in_chain_matches_combined_solver() {
    let a = zero_link("A", "a", vec![2.0, 2.5]);
    let d = zero_link("D", "d", vec![3.0, 3.2]);
    let e = Solver::builder()
        .id("E")
        .curve(discount("e", vec![1.0, 0.99, 0.98]))
        .instrument(SpreadRate::new("e", "a", 0.0, 1.0))
        .instrument(SpreadRate::new("e", "d", 1.0, 2.0))
        .targets(vec![15.0, 20.0])
        .pre_solver(a)
        .pre_solver(d)
        .build()
        .unwrap();
    assert_eq!(e.aggregate_variables(), &["a_1", "a_2", "d_1", "d_2", "e_1", "e_2"]);
    assert_eq!(e.variable_space().blocks().len(), 2);

    // Sibling upstream solvers do not see each other's targets.
    let g = e.sensitivity_chain().unwrap();
    for i in 0..2 {
        for j in 2..4 {
            assert_eq!(g[(i, j)], 0.0);
            assert_eq!(g[(j, i)], 0.0);
        }
    }

    let combined = Solver::builder()
        .id("ADE")
        .curve(discount("a", vec![1.0, 0.99, 0.98]))
        .curve(discount("d", vec![1.0, 0.99, 0.98]))
        .curve(discount("e", vec![1.0, 0.99, 0.98]))
        .instrument(ZeroRate::new("a", 1.0))
        .instrument(ZeroRate::new("a", 2.0))
        .instrument(ZeroRate::new("d", 1.0))
        .instrument(ZeroRate::new("d", 2.0))
        .instrument(SpreadRate::new("e", "a", 0.0, 1.0))
        .instrument(SpreadRate::new("e", "d", 1.0, 2.0))
        .targets(vec![2.0, 2.5, 3.0, 3.2, 15.0, 20.0])
        .build()
        .unwrap();

    assert_chain_matches_combined(e, combined);
}

#[test]
fn test_pseudo_inverse_is_right_inverse_for_square_system() {
    let solver = usd_solver(vec![1.0, 0.99, 0.98, 0.97], vec![1.8, 2.4, 2.2], Algorithm::GaussNewton);
    let j = solver.rate_jacobian().unwrap();
    let g = solver.sensitivity().unwrap();
    assert_abs_diff_eq!(j * g, DMatrix::identity(3, 3), epsilon = 1e-10);
}
