//! Calibration instruments and the context they are priced in.
//!
//! An [`Instrument`] maps market state to a single quoted rate. The pricing
//! context resolves curves by identifier through a [`CurveResolver`] (in
//! practice a solver and its upstream chain) and exposes the FX source, so
//! instrument definitions stay free of ownership concerns.
//!
//! # Components
//!
//! - [`context`]: [`CurveResolver`], [`PricingArgs`], [`PricingContext`]
//! - [`rates`]: [`Value`], [`ZeroRate`], [`ForwardRate`], [`SpreadRate`]

pub mod context;
pub mod rates;

pub use context::{CurveResolver, PricingArgs, PricingContext};
pub use rates::{ForwardRate, SpreadRate, Value, ZeroRate};

use std::fmt;

use crate::types::{Dual, PricingError};

/// Something that can be priced to a single quoted rate.
pub trait Instrument: fmt::Debug + Send + Sync {
    /// Quoted rate under the given context.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError`] when a curve or FX rate cannot be resolved.
    fn rate(&self, ctx: &PricingContext<'_>) -> Result<Dual, PricingError>;

    /// Quote units per basis point times 100.
    ///
    /// Percent-quoted rates use `1.0`; basis-point-quoted spreads use `100.0`.
    fn rate_scalar(&self) -> f64 {
        1.0
    }
}
