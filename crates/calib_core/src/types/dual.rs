//! Named-variable forward-mode dual numbers.
//!
//! [`Dual`] carries a real value together with its gradient (and optionally
//! its full Hessian) with respect to a set of string-tagged variables. Two
//! duals over different variable sets combine over the union of their tags,
//! so curve nodes, FX spots and calibration targets can each be tagged
//! independently and still flow through one expression.
//!
//! Derivatives of elementary functions (`exp`, `ln`, `sqrt`, `powf`, ...)
//! are taken from [`num_dual::Dual2_64`] evaluated at the real part and then
//! chained over every tag.
//!
//! # Examples
//!
//! ```
//! use calib_core::types::{AdOrder, Dual};
//!
//! let x = Dual::tagged(1.5, "x", AdOrder::Two);
//! let y = &x * &x * 2.0;
//!
//! assert!((y.gradient(&["x"])[0] - 6.0).abs() < 1e-12);
//! assert!((y.hessian(&["x"]).unwrap()[(0, 0)] - 4.0).abs() < 1e-12);
//! ```

use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Div, Mul, MulAssign, Neg, Sub, SubAssign};
use std::sync::Arc;

use nalgebra::DMatrix;
use num_dual::{Dual2_64, DualNum};
use num_traits::{One, Zero};

use super::error::DualError;

/// Differentiation order carried by curve nodes, FX spots and priced rates.
///
/// - `Zero`: plain floats, no derivative information
/// - `One`: gradients only
/// - `Two`: gradients and Hessians
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AdOrder {
    /// No derivatives.
    Zero,
    /// First derivatives.
    #[default]
    One,
    /// First and second derivatives.
    Two,
}

impl AdOrder {
    /// Numeric order.
    pub fn as_u8(self) -> u8 {
        match self {
            AdOrder::Zero => 0,
            AdOrder::One => 1,
            AdOrder::Two => 2,
        }
    }
}

impl fmt::Display for AdOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Forward-mode AD scalar over named variables.
///
/// The Hessian, when present, is stored in full (not halved) in row-major
/// order over `vars`.
#[derive(Clone, Debug)]
pub struct Dual {
    real: f64,
    vars: Arc<[String]>,
    grad: Vec<f64>,
    hess: Option<Vec<f64>>,
}

/// First and second partial derivatives of a binary operation `f(a, b)`.
struct Partials {
    real: f64,
    fa: f64,
    fb: f64,
    faa: f64,
    fab: f64,
    fbb: f64,
}

impl Partials {
    fn linear(real: f64, fa: f64, fb: f64) -> Self {
        Self {
            real,
            fa,
            fb,
            faa: 0.0,
            fab: 0.0,
            fbb: 0.0,
        }
    }

    fn add(a: f64, b: f64) -> Self {
        Self::linear(a + b, 1.0, 1.0)
    }

    fn sub(a: f64, b: f64) -> Self {
        Self::linear(a - b, 1.0, -1.0)
    }

    fn mul(a: f64, b: f64) -> Self {
        Self {
            fab: 1.0,
            ..Self::linear(a * b, b, a)
        }
    }

    fn div(a: f64, b: f64) -> Self {
        let inv = 1.0 / b;
        Self {
            real: a * inv,
            fa: inv,
            fb: -a * inv * inv,
            faa: 0.0,
            fab: -inv * inv,
            fbb: 2.0 * a * inv * inv * inv,
        }
    }
}

impl Dual {
    /// Create a constant with no variables.
    pub fn constant(real: f64) -> Self {
        Self {
            real,
            vars: empty_vars(),
            grad: Vec::new(),
            hess: None,
        }
    }

    /// Create a first-order variable with unit derivative on `tag`.
    pub fn variable(real: f64, tag: impl Into<String>) -> Self {
        Self {
            real,
            vars: Arc::from(vec![tag.into()]),
            grad: vec![1.0],
            hess: None,
        }
    }

    /// Create a value tagged with `tag` at the requested differentiation order.
    ///
    /// Order zero yields a constant; order two attaches a zero Hessian.
    pub fn tagged(real: f64, tag: impl Into<String>, order: AdOrder) -> Self {
        match order {
            AdOrder::Zero => Self::constant(real),
            AdOrder::One => Self::variable(real, tag),
            AdOrder::Two => Self {
                hess: Some(vec![0.0]),
                ..Self::variable(real, tag)
            },
        }
    }

    /// Real part.
    pub fn real(&self) -> f64 {
        self.real
    }

    /// Variable tags this value carries derivatives for.
    pub fn vars(&self) -> &[String] {
        &self.vars
    }

    /// Differentiation order carried by this value.
    pub fn order(&self) -> AdOrder {
        if self.hess.is_some() {
            AdOrder::Two
        } else if self.vars.is_empty() {
            AdOrder::Zero
        } else {
            AdOrder::One
        }
    }

    /// True when no variable tags are attached.
    pub fn is_constant(&self) -> bool {
        self.vars.is_empty()
    }

    /// Convert to the requested order, dropping or zero-filling the Hessian.
    pub fn to_order(&self, order: AdOrder) -> Self {
        match order {
            AdOrder::Zero => Self::constant(self.real),
            AdOrder::One => Self {
                hess: None,
                ..self.clone()
            },
            AdOrder::Two => {
                let n = self.vars.len();
                Self {
                    hess: Some(self.hess.clone().unwrap_or_else(|| vec![0.0; n * n])),
                    ..self.clone()
                }
            }
        }
    }

    /// First derivatives with respect to `vars`, zero for unknown tags.
    pub fn gradient<S: AsRef<str>>(&self, vars: &[S]) -> Vec<f64> {
        self.positions(vars)
            .into_iter()
            .map(|pos| pos.map_or(0.0, |i| self.grad[i]))
            .collect()
    }

    /// Second derivatives with respect to `vars`.
    ///
    /// # Errors
    ///
    /// Returns [`DualError::SecondOrderUnavailable`] when the value carries
    /// variables but no second-order information.
    pub fn hessian<S: AsRef<str>>(&self, vars: &[S]) -> Result<DMatrix<f64>, DualError> {
        let k = vars.len();
        let Some(hess) = &self.hess else {
            if self.vars.is_empty() {
                return Ok(DMatrix::zeros(k, k));
            }
            return Err(DualError::SecondOrderUnavailable);
        };
        let n = self.vars.len();
        let pos = self.positions(vars);
        Ok(DMatrix::from_fn(k, k, |i, j| match (pos[i], pos[j]) {
            (Some(a), Some(b)) => hess[a * n + b],
            _ => 0.0,
        }))
    }

    /// `e^x`.
    pub fn exp(&self) -> Self {
        self.apply(|x| x.exp())
    }

    /// Natural logarithm.
    pub fn ln(&self) -> Self {
        self.apply(|x| x.ln())
    }

    /// Square root.
    pub fn sqrt(&self) -> Self {
        self.apply(|x| x.sqrt())
    }

    /// `1 / x`.
    pub fn recip(&self) -> Self {
        self.apply(|x| x.recip())
    }

    /// Real power.
    pub fn powf(&self, n: f64) -> Self {
        self.apply(|x| x.powf(n))
    }

    /// Integer power.
    pub fn powi(&self, n: i32) -> Self {
        self.apply(|x| x.powi(n))
    }

    /// Absolute value; the derivative sign follows the real part.
    pub fn abs(&self) -> Self {
        if self.real < 0.0 {
            -self
        } else {
            self.clone()
        }
    }

    fn apply(&self, f: impl Fn(Dual2_64) -> Dual2_64) -> Self {
        let d = f(Dual2_64::new(self.real, 1.0, 0.0));
        self.chain(d.re, d.v1, d.v2)
    }

    /// Compose with a scalar function given its value and first two derivatives.
    fn chain(&self, f0: f64, f1: f64, f2: f64) -> Self {
        let grad: Vec<f64> = self.grad.iter().map(|g| f1 * g).collect();
        let hess = self.hess.as_ref().map(|h| {
            let n = self.vars.len();
            let mut out = vec![0.0; n * n];
            for i in 0..n {
                for j in 0..n {
                    let k = i * n + j;
                    out[k] = f1 * h[k] + f2 * self.grad[i] * self.grad[j];
                }
            }
            out
        });
        Self {
            real: f0,
            vars: Arc::clone(&self.vars),
            grad,
            hess,
        }
    }

    fn scale(mut self, c: f64) -> Self {
        self.real *= c;
        self.grad.iter_mut().for_each(|g| *g *= c);
        if let Some(h) = self.hess.as_mut() {
            h.iter_mut().for_each(|x| *x *= c);
        }
        self
    }

    fn positions<S: AsRef<str>>(&self, vars: &[S]) -> Vec<Option<usize>> {
        if self.vars.is_empty() {
            return vec![None; vars.len()];
        }
        let index: HashMap<&str, usize> = self
            .vars
            .iter()
            .enumerate()
            .map(|(i, v)| (v.as_str(), i))
            .collect();
        vars.iter().map(|v| index.get(v.as_ref()).copied()).collect()
    }

    /// Gradient and (when `second`) Hessian laid out over `vars`, which must
    /// contain every tag of `self`.
    fn aligned(&self, vars: &Arc<[String]>, second: bool) -> (Cow<'_, [f64]>, Option<Cow<'_, [f64]>>) {
        let n = vars.len();
        if same_vars(&self.vars, vars) {
            let hess = second.then(|| match &self.hess {
                Some(h) => Cow::Borrowed(h.as_slice()),
                None => Cow::Owned(vec![0.0; n * n]),
            });
            return (Cow::Borrowed(self.grad.as_slice()), hess);
        }

        let index: HashMap<&str, usize> =
            vars.iter().enumerate().map(|(i, v)| (v.as_str(), i)).collect();
        let map: Vec<usize> = self
            .vars
            .iter()
            .map(|v| index.get(v.as_str()).copied().unwrap_or(0))
            .collect();

        let mut grad = vec![0.0; n];
        for (i, &m) in map.iter().enumerate() {
            grad[m] = self.grad[i];
        }
        let hess = second.then(|| {
            let mut out = vec![0.0; n * n];
            if let Some(h) = &self.hess {
                let own = self.vars.len();
                for (i, &mi) in map.iter().enumerate() {
                    for (j, &mj) in map.iter().enumerate() {
                        out[mi * n + mj] = h[i * own + j];
                    }
                }
            }
            Cow::Owned(out)
        });
        (Cow::Owned(grad), hess)
    }

    fn combine(a: &Dual, b: &Dual, p: Partials) -> Dual {
        let vars = union_vars(&a.vars, &b.vars);
        let second = a.hess.is_some() || b.hess.is_some();
        let n = vars.len();
        let (ga, ha) = a.aligned(&vars, second);
        let (gb, hb) = b.aligned(&vars, second);

        let grad: Vec<f64> = (0..n).map(|i| p.fa * ga[i] + p.fb * gb[i]).collect();
        let hess = match (ha, hb) {
            (Some(ha), Some(hb)) => {
                let mut out = vec![0.0; n * n];
                for i in 0..n {
                    for j in 0..n {
                        let k = i * n + j;
                        out[k] = p.fa * ha[k]
                            + p.fb * hb[k]
                            + p.faa * ga[i] * ga[j]
                            + p.fbb * gb[i] * gb[j]
                            + p.fab * (ga[i] * gb[j] + gb[i] * ga[j]);
                    }
                }
                Some(out)
            }
            _ => None,
        };
        Dual {
            real: p.real,
            vars,
            grad,
            hess,
        }
    }
}

fn empty_vars() -> Arc<[String]> {
    Arc::from(Vec::<String>::new())
}

fn same_vars(a: &Arc<[String]>, b: &Arc<[String]>) -> bool {
    Arc::ptr_eq(a, b) || a[..] == b[..]
}

fn union_vars(a: &Arc<[String]>, b: &Arc<[String]>) -> Arc<[String]> {
    if b.is_empty() || same_vars(a, b) {
        return Arc::clone(a);
    }
    if a.is_empty() {
        return Arc::clone(b);
    }
    let mut seen: HashSet<&str> = a.iter().map(String::as_str).collect();
    let mut out: Vec<String> = a.to_vec();
    for tag in b.iter() {
        if seen.insert(tag.as_str()) {
            out.push(tag.clone());
        }
    }
    Arc::from(out)
}

impl Default for Dual {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

impl From<f64> for Dual {
    fn from(real: f64) -> Self {
        Self::constant(real)
    }
}

impl PartialEq for Dual {
    /// Equal when real parts and all derivatives agree over the union of tags.
    fn eq(&self, other: &Self) -> bool {
        if self.real != other.real {
            return false;
        }
        let vars = union_vars(&self.vars, &other.vars);
        let second = self.hess.is_some() || other.hess.is_some();
        let (ga, ha) = self.aligned(&vars, second);
        let (gb, hb) = other.aligned(&vars, second);
        ga == gb && ha == hb
    }
}

impl PartialEq<f64> for Dual {
    /// Compares real parts only.
    fn eq(&self, other: &f64) -> bool {
        self.real == *other
    }
}

impl PartialOrd<f64> for Dual {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.real.partial_cmp(other)
    }
}

impl fmt::Display for Dual {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Dual: {:.6}, ({}), [", self.real, self.vars.join(", "))?;
        for (i, g) in self.grad.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{:.1}", g)?;
        }
        write!(f, "]>")
    }
}

// Dual (op) Dual

macro_rules! impl_dual_binop {
    ($trait:ident, $method:ident, $partials:path) => {
        impl $trait<&Dual> for &Dual {
            type Output = Dual;
            fn $method(self, rhs: &Dual) -> Dual {
                Dual::combine(self, rhs, $partials(self.real, rhs.real))
            }
        }

        impl $trait<Dual> for Dual {
            type Output = Dual;
            fn $method(self, rhs: Dual) -> Dual {
                (&self).$method(&rhs)
            }
        }

        impl $trait<&Dual> for Dual {
            type Output = Dual;
            fn $method(self, rhs: &Dual) -> Dual {
                (&self).$method(rhs)
            }
        }

        impl $trait<Dual> for &Dual {
            type Output = Dual;
            fn $method(self, rhs: Dual) -> Dual {
                self.$method(&rhs)
            }
        }
    };
}

impl_dual_binop!(Add, add, Partials::add);
impl_dual_binop!(Sub, sub, Partials::sub);
impl_dual_binop!(Mul, mul, Partials::mul);
impl_dual_binop!(Div, div, Partials::div);

// Dual (op) f64

impl Add<f64> for Dual {
    type Output = Dual;
    fn add(mut self, rhs: f64) -> Dual {
        self.real += rhs;
        self
    }
}

impl Add<f64> for &Dual {
    type Output = Dual;
    fn add(self, rhs: f64) -> Dual {
        self.clone() + rhs
    }
}

impl Sub<f64> for Dual {
    type Output = Dual;
    fn sub(mut self, rhs: f64) -> Dual {
        self.real -= rhs;
        self
    }
}

impl Sub<f64> for &Dual {
    type Output = Dual;
    fn sub(self, rhs: f64) -> Dual {
        self.clone() - rhs
    }
}

impl Mul<f64> for Dual {
    type Output = Dual;
    fn mul(self, rhs: f64) -> Dual {
        self.scale(rhs)
    }
}

impl Mul<f64> for &Dual {
    type Output = Dual;
    fn mul(self, rhs: f64) -> Dual {
        self.clone().scale(rhs)
    }
}

impl Div<f64> for Dual {
    type Output = Dual;
    fn div(self, rhs: f64) -> Dual {
        self.scale(1.0 / rhs)
    }
}

impl Div<f64> for &Dual {
    type Output = Dual;
    fn div(self, rhs: f64) -> Dual {
        self.clone().scale(1.0 / rhs)
    }
}

// f64 (op) Dual

impl Add<Dual> for f64 {
    type Output = Dual;
    fn add(self, rhs: Dual) -> Dual {
        rhs + self
    }
}

impl Add<&Dual> for f64 {
    type Output = Dual;
    fn add(self, rhs: &Dual) -> Dual {
        rhs + self
    }
}

impl Sub<Dual> for f64 {
    type Output = Dual;
    fn sub(self, rhs: Dual) -> Dual {
        -rhs + self
    }
}

impl Sub<&Dual> for f64 {
    type Output = Dual;
    fn sub(self, rhs: &Dual) -> Dual {
        -rhs + self
    }
}

impl Mul<Dual> for f64 {
    type Output = Dual;
    fn mul(self, rhs: Dual) -> Dual {
        rhs.scale(self)
    }
}

impl Mul<&Dual> for f64 {
    type Output = Dual;
    fn mul(self, rhs: &Dual) -> Dual {
        rhs.clone().scale(self)
    }
}

impl Div<Dual> for f64 {
    type Output = Dual;
    fn div(self, rhs: Dual) -> Dual {
        rhs.recip().scale(self)
    }
}

impl Div<&Dual> for f64 {
    type Output = Dual;
    fn div(self, rhs: &Dual) -> Dual {
        rhs.recip().scale(self)
    }
}

impl Neg for Dual {
    type Output = Dual;
    fn neg(self) -> Dual {
        self.scale(-1.0)
    }
}

impl Neg for &Dual {
    type Output = Dual;
    fn neg(self) -> Dual {
        self.clone().scale(-1.0)
    }
}

impl AddAssign<&Dual> for Dual {
    fn add_assign(&mut self, rhs: &Dual) {
        *self = &*self + rhs;
    }
}

impl AddAssign<Dual> for Dual {
    fn add_assign(&mut self, rhs: Dual) {
        *self = &*self + &rhs;
    }
}

impl SubAssign<&Dual> for Dual {
    fn sub_assign(&mut self, rhs: &Dual) {
        *self = &*self - rhs;
    }
}

impl AddAssign<f64> for Dual {
    fn add_assign(&mut self, rhs: f64) {
        self.real += rhs;
    }
}

impl MulAssign<f64> for Dual {
    fn mul_assign(&mut self, rhs: f64) {
        *self = std::mem::take(self).scale(rhs);
    }
}

impl Sum for Dual {
    fn sum<I: Iterator<Item = Dual>>(iter: I) -> Dual {
        iter.fold(Dual::zero(), |acc, x| acc + x)
    }
}

impl<'a> Sum<&'a Dual> for Dual {
    fn sum<I: Iterator<Item = &'a Dual>>(iter: I) -> Dual {
        iter.fold(Dual::zero(), |acc, x| acc + x)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::constant(0.0)
    }

    fn is_zero(&self) -> bool {
        self.real == 0.0
            && self.grad.iter().all(|g| *g == 0.0)
            && self.hess.as_ref().map_or(true, |h| h.iter().all(|x| *x == 0.0))
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::constant(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    // ========================================
    // Construction Tests
    // ========================================

    #[test]
    fn test_constant_has_no_vars() {
        let c = Dual::constant(3.0);
        assert_eq!(c.real(), 3.0);
        assert!(c.is_constant());
        assert_eq!(c.order(), AdOrder::Zero);
        assert_eq!(c.gradient(&["x"]), vec![0.0]);
    }

    #[test]
    fn test_tagged_orders() {
        assert_eq!(Dual::tagged(1.0, "x", AdOrder::Zero).order(), AdOrder::Zero);
        assert_eq!(Dual::tagged(1.0, "x", AdOrder::One).order(), AdOrder::One);
        assert_eq!(Dual::tagged(1.0, "x", AdOrder::Two).order(), AdOrder::Two);
    }

    #[test]
    fn test_gradient_unknown_tag_is_zero() {
        let x = Dual::variable(2.0, "x");
        assert_eq!(x.gradient(&["y", "x"]), vec![0.0, 1.0]);
    }

    #[test]
    fn test_hessian_requires_second_order() {
        let x = Dual::variable(2.0, "x");
        assert_eq!(x.hessian(&["x"]), Err(DualError::SecondOrderUnavailable));
        assert!(Dual::constant(1.0).hessian(&["x"]).is_ok());
    }

    #[test]
    fn test_to_order_roundtrip() {
        let x = Dual::variable(2.0, "x");
        let x2 = x.to_order(AdOrder::Two);
        assert_eq!(x2.order(), AdOrder::Two);
        assert_eq!(x2.to_order(AdOrder::One), x);
        assert_eq!(x.to_order(AdOrder::Zero).order(), AdOrder::Zero);
    }

    // ========================================
    // Arithmetic Tests
    // ========================================

    #[test]
    fn test_mixed_variable_sets() {
        let x = Dual::variable(2.0, "x");
        let y = Dual::variable(5.0, "y");
        let z = &x * &y + &x;
        assert_relative_eq!(z.real(), 12.0);
        assert_eq!(z.vars(), &["x".to_string(), "y".to_string()]);
        assert_eq!(z.gradient(&["x", "y"]), vec![6.0, 2.0]);
    }

    #[test]
    fn test_division_gradient() {
        let x = Dual::variable(3.0, "x");
        let y = Dual::variable(4.0, "y");
        let z = &x / &y;
        let g = z.gradient(&["x", "y"]);
        assert_relative_eq!(g[0], 0.25);
        assert_relative_eq!(g[1], -3.0 / 16.0);
    }

    #[test]
    fn test_scalar_operations() {
        let x = Dual::variable(2.0, "x");
        let z = 3.0 - &x * 2.0 + 1.0;
        assert_relative_eq!(z.real(), 0.0);
        assert_eq!(z.gradient(&["x"]), vec![-2.0]);

        let w = 1.0 / &x;
        assert_relative_eq!(w.gradient(&["x"])[0], -0.25);
    }

    #[test]
    fn test_second_order_product() {
        let x = Dual::tagged(2.0, "x", AdOrder::Two);
        let y = Dual::tagged(3.0, "y", AdOrder::Two);
        let z = &x * &y * &x;
        let h = z.hessian(&["x", "y"]).unwrap();
        assert_relative_eq!(h[(0, 0)], 6.0);
        assert_relative_eq!(h[(0, 1)], 4.0);
        assert_relative_eq!(h[(1, 0)], 4.0);
        assert_relative_eq!(h[(1, 1)], 0.0);
    }

    #[test]
    fn test_mixed_order_promotes() {
        let x = Dual::tagged(2.0, "x", AdOrder::Two);
        let y = Dual::variable(3.0, "y");
        let z = &x * &y;
        assert_eq!(z.order(), AdOrder::Two);
        let h = z.hessian(&["x", "y"]).unwrap();
        assert_relative_eq!(h[(0, 1)], 1.0);
    }

    #[test]
    fn test_second_order_quotient() {
        let x = Dual::tagged(2.0, "x", AdOrder::Two);
        let z = 1.0 / &x;
        let h = z.hessian(&["x"]).unwrap();
        assert_relative_eq!(h[(0, 0)], 2.0 / 8.0, epsilon = 1e-14);
    }

    // ========================================
    // Elementary Function Tests
    // ========================================

    #[test]
    fn test_exp_ln_derivatives() {
        let x = Dual::tagged(0.7, "x", AdOrder::Two);
        let e = x.exp();
        assert_relative_eq!(e.gradient(&["x"])[0], 0.7_f64.exp(), epsilon = 1e-14);
        assert_relative_eq!(e.hessian(&["x"]).unwrap()[(0, 0)], 0.7_f64.exp(), epsilon = 1e-14);

        let l = x.ln();
        assert_relative_eq!(l.gradient(&["x"])[0], 1.0 / 0.7, epsilon = 1e-14);
        assert_relative_eq!(l.hessian(&["x"]).unwrap()[(0, 0)], -1.0 / 0.49, epsilon = 1e-12);
    }

    #[test]
    fn test_chain_rule_over_two_vars() {
        let x = Dual::tagged(1.0, "x", AdOrder::Two);
        let y = Dual::tagged(2.0, "y", AdOrder::Two);
        // f = exp(x * y)
        let f = (&x * &y).exp();
        let h = f.hessian(&["x", "y"]).unwrap();
        let e2 = 2.0_f64.exp();
        assert_relative_eq!(h[(0, 0)], 4.0 * e2, epsilon = 1e-12);
        assert_relative_eq!(h[(0, 1)], e2 + 2.0 * e2, epsilon = 1e-12);
        assert_relative_eq!(h[(1, 1)], e2, epsilon = 1e-12);
    }

    #[test]
    fn test_sqrt_and_powf() {
        let x = Dual::variable(4.0, "x");
        assert_relative_eq!(x.sqrt().gradient(&["x"])[0], 0.25);
        assert_relative_eq!(x.powf(3.0).gradient(&["x"])[0], 48.0, epsilon = 1e-12);
        assert_relative_eq!(x.powi(2).real(), 16.0);
    }

    // ========================================
    // Comparison and Trait Tests
    // ========================================

    #[test]
    fn test_compare_with_float() {
        let x = Dual::variable(2.0, "x");
        assert!(x > 1.0);
        assert!(x < 3.0);
        assert!(x == 2.0);
    }

    #[test]
    fn test_equality_over_union() {
        let a = Dual::variable(1.0, "x") + Dual::constant(0.0) * Dual::variable(0.0, "y");
        let b = Dual::variable(1.0, "x");
        assert_eq!(a, b);
    }

    #[test]
    fn test_sum_and_zero() {
        let xs = vec![Dual::variable(1.0, "a"), Dual::variable(2.0, "b")];
        let total: Dual = xs.iter().sum();
        assert_relative_eq!(total.real(), 3.0);
        assert_eq!(total.gradient(&["a", "b"]), vec![1.0, 1.0]);
        assert!(Dual::zero().is_zero());
        assert!(!total.is_zero());
    }

    #[test]
    fn test_display() {
        let x = Dual::variable(1.5, "x");
        let s = format!("{}", x);
        assert!(s.contains("1.5"));
        assert!(s.contains("x"));
    }

    // ========================================
    // Property Tests
    // ========================================

    proptest! {
        #[test]
        fn prop_product_rule(a in -10.0..10.0f64, b in -10.0..10.0f64) {
            let x = Dual::variable(a, "x");
            let y = Dual::variable(b, "y");
            let g = (&x * &y).gradient(&["x", "y"]);
            prop_assert!((g[0] - b).abs() < 1e-12);
            prop_assert!((g[1] - a).abs() < 1e-12);
        }

        #[test]
        fn prop_quotient_inverts_product(a in -10.0..10.0f64, b in 0.5..10.0f64) {
            let x = Dual::tagged(a, "x", AdOrder::Two);
            let y = Dual::tagged(b, "y", AdOrder::Two);
            let z = &(&x * &y) / &y;
            let g = z.gradient(&["x", "y"]);
            prop_assert!((z.real() - a).abs() < 1e-10);
            prop_assert!((g[0] - 1.0).abs() < 1e-10);
            prop_assert!(g[1].abs() < 1e-10);
        }

        #[test]
        fn prop_hessian_symmetric(a in 0.1..3.0f64, b in 0.1..3.0f64) {
            let x = Dual::tagged(a, "x", AdOrder::Two);
            let y = Dual::tagged(b, "y", AdOrder::Two);
            let f = (&x * &y).ln() * &x + y.sqrt();
            let h = f.hessian(&["x", "y"]).unwrap();
            prop_assert!((h[(0, 1)] - h[(1, 0)]).abs() < 1e-12);
        }

        #[test]
        fn prop_exp_ln_identity(a in 0.1..5.0f64) {
            let x = Dual::tagged(a, "x", AdOrder::Two);
            let y = x.ln().exp();
            prop_assert!((y.real() - a).abs() < 1e-12);
            prop_assert!((y.gradient(&["x"])[0] - 1.0).abs() < 1e-12);
            prop_assert!(y.hessian(&["x"]).unwrap()[(0, 0)].abs() < 1e-10);
        }
    }
}
