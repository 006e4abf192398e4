//! Minimal rate instruments for curve calibration.
//!
//! Curves are read through positional slots of the pricing context, so each
//! instrument's curves can be redirected with
//! [`PricingArgs::with_curve`](super::PricingArgs::with_curve).

use super::{Instrument, PricingContext};
use crate::types::{Dual, PricingError};

/// Raw curve value at an abscissa.
///
/// Slot 0: the curve.
#[derive(Debug, Clone, PartialEq)]
pub struct Value {
    curve: String,
    x: f64,
}

impl Value {
    /// Value of `curve` at `x`.
    pub fn new(curve: impl Into<String>, x: f64) -> Self {
        Self {
            curve: curve.into(),
            x,
        }
    }
}

impl Instrument for Value {
    fn rate(&self, ctx: &PricingContext<'_>) -> Result<Dual, PricingError> {
        Ok(ctx.curve(0, &self.curve)?.value(self.x)?)
    }
}

/// Continuously compounded zero rate in percent.
///
/// Slot 0: the discount curve.
#[derive(Debug, Clone, PartialEq)]
pub struct ZeroRate {
    curve: String,
    tenor: f64,
}

impl ZeroRate {
    /// Zero rate to `tenor` years on `curve`.
    pub fn new(curve: impl Into<String>, tenor: f64) -> Self {
        Self {
            curve: curve.into(),
            tenor,
        }
    }
}

impl Instrument for ZeroRate {
    fn rate(&self, ctx: &PricingContext<'_>) -> Result<Dual, PricingError> {
        Ok(ctx.curve(0, &self.curve)?.zero_rate(self.tenor)?)
    }
}

/// Simple forward rate in percent.
///
/// Slot 0: the projection curve.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardRate {
    curve: String,
    start: f64,
    end: f64,
}

impl ForwardRate {
    /// Forward rate on `curve` between `start` and `end` years.
    pub fn new(curve: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            curve: curve.into(),
            start,
            end,
        }
    }
}

impl Instrument for ForwardRate {
    fn rate(&self, ctx: &PricingContext<'_>) -> Result<Dual, PricingError> {
        Ok(ctx.curve(0, &self.curve)?.forward_rate(self.start, self.end)?)
    }
}

/// Forward spread between two curves, quoted in basis points.
///
/// Slot 0: the spread curve. Slot 1: the reference curve.
#[derive(Debug, Clone, PartialEq)]
pub struct SpreadRate {
    curve: String,
    reference: String,
    start: f64,
    end: f64,
}

impl SpreadRate {
    /// Forward spread of `curve` over `reference` between `start` and `end`.
    pub fn new(curve: impl Into<String>, reference: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            curve: curve.into(),
            reference: reference.into(),
            start,
            end,
        }
    }
}

impl Instrument for SpreadRate {
    fn rate(&self, ctx: &PricingContext<'_>) -> Result<Dual, PricingError> {
        let lhs = ctx.curve(0, &self.curve)?.forward_rate(self.start, self.end)?;
        let rhs = ctx.curve(1, &self.reference)?.forward_rate(self.start, self.end)?;
        Ok((lhs - rhs) * 100.0)
    }

    fn rate_scalar(&self) -> f64 {
        100.0
    }
}
