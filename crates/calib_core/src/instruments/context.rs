//! Pricing context passed to [`Instrument::rate`](super::Instrument::rate).

use std::collections::BTreeMap;

use crate::market_data::{Curve, FxSource};
use crate::types::PricingError;

/// Resolves curves by identifier and provides the FX source.
pub trait CurveResolver {
    /// Curve with identifier `id`, if visible.
    fn curve(&self, id: &str) -> Option<&dyn Curve>;

    /// FX source, if any.
    fn fx(&self) -> Option<&dyn FxSource>;
}

/// Per-instrument pricing arguments.
///
/// Positional curve overrides replace the curve identifiers an instrument
/// was defined with, position by position. Keyword parameters are free-form
/// numeric inputs.
///
/// # Examples
///
/// ```
/// use calib_core::instruments::PricingArgs;
///
/// let args = PricingArgs::new().with_curve("eur_ois").with_param("notional", 1e6);
/// assert_eq!(args.curves(), &["eur_ois".to_string()]);
/// assert_eq!(args.param("notional"), Some(1e6));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PricingArgs {
    curves: Vec<String>,
    params: BTreeMap<String, f64>,
}

impl PricingArgs {
    /// Empty arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a positional curve override.
    pub fn with_curve(mut self, id: impl Into<String>) -> Self {
        self.curves.push(id.into());
        self
    }

    /// Set a keyword parameter.
    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Positional curve overrides.
    pub fn curves(&self) -> &[String] {
        &self.curves
    }

    /// Keyword parameter by name.
    pub fn param(&self, name: &str) -> Option<f64> {
        self.params.get(name).copied()
    }
}

/// Borrowed view used while pricing one instrument.
#[derive(Clone, Copy)]
pub struct PricingContext<'a> {
    resolver: &'a dyn CurveResolver,
    args: &'a PricingArgs,
}

impl<'a> PricingContext<'a> {
    /// Create a context over `resolver` with instrument arguments `args`.
    pub fn new(resolver: &'a dyn CurveResolver, args: &'a PricingArgs) -> Self {
        Self { resolver, args }
    }

    /// Curve at `position`, honouring overrides, falling back to `default`.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::MissingCurve`] if the identifier is unknown.
    pub fn curve(&self, position: usize, default: &str) -> Result<&'a dyn Curve, PricingError> {
        let id = self
            .args
            .curves()
            .get(position)
            .map(String::as_str)
            .unwrap_or(default);
        self.resolver
            .curve(id)
            .ok_or_else(|| PricingError::missing_curve(id))
    }

    /// FX source of the context.
    ///
    /// # Errors
    ///
    /// Returns [`PricingError::MissingFx`] when none is attached.
    pub fn fx(&self) -> Result<&'a dyn FxSource, PricingError> {
        self.resolver.fx().ok_or(PricingError::MissingFx)
    }

    /// Keyword parameter, or `default` when absent.
    pub fn param_or(&self, name: &str, default: f64) -> f64 {
        self.args.param(name).unwrap_or(default)
    }
}
