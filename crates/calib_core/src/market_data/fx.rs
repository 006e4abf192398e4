//! FX rates with AD-tagged spot quotes.
//!
//! An [`FxSource`] exposes rates between currencies as [`Dual`] values whose
//! variables are the FX quotes themselves (`fx_{pair}`), so valuations
//! converted through it carry FX sensitivities.

use std::fmt;
use std::str::FromStr;

use crate::market_data::error::FxError;
use crate::types::{AdOrder, Currency, Dual};

/// Source of FX rates consumed by pricing and risk aggregation.
pub trait FxSource: fmt::Debug + Send + Sync {
    /// Pair names such as `"eurusd"`, in quotation order.
    fn pairs(&self) -> Vec<String>;

    /// Variable tags of the FX quotes, aligned with [`FxSource::pairs`].
    fn variables(&self) -> Vec<String> {
        self.pairs().iter().map(|p| format!("fx_{p}")).collect()
    }

    /// Units of `rhs` per unit of `lhs`.
    ///
    /// # Errors
    ///
    /// Returns [`FxError::NoRoute`] when the rate cannot be formed.
    fn rate(&self, lhs: Currency, rhs: Currency) -> Result<Dual, FxError>;

    /// Refresh derived rates after curve nodes have changed.
    fn update(&mut self) {}

    /// Re-tag every quote at `order`.
    fn set_ad_order(&mut self, order: AdOrder);

    /// Clone into a boxed trait object.
    fn box_clone(&self) -> Box<dyn FxSource>;
}

impl Clone for Box<dyn FxSource> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Spot FX quotes.
///
/// Rates are resolved directly, by inversion, or through one intermediate
/// currency.
///
/// # Examples
///
/// ```
/// use calib_core::market_data::{FxRates, FxSource};
/// use calib_core::types::Currency;
///
/// let fx = FxRates::new(&[("eurusd", 1.10), ("gbpusd", 1.25)]).unwrap();
/// let eurgbp = fx.rate(Currency::EUR, Currency::GBP).unwrap();
/// assert!((eurgbp.real() - 1.10 / 1.25).abs() < 1e-14);
/// assert_eq!(fx.variables(), vec!["fx_eurusd", "fx_gbpusd"]);
/// ```
#[derive(Debug, Clone)]
pub struct FxRates {
    pairs: Vec<(Currency, Currency)>,
    quotes: Vec<Dual>,
    ad_order: AdOrder,
}

impl FxRates {
    /// Create from `(pair, quote)` entries such as `("eurusd", 1.10)`.
    ///
    /// # Errors
    ///
    /// Returns [`FxError::InvalidPair`] or [`FxError::Currency`] for
    /// malformed pair names.
    pub fn new(quotes: &[(&str, f64)]) -> Result<Self, FxError> {
        let pairs = quotes
            .iter()
            .map(|(pair, _)| parse_pair(pair))
            .collect::<Result<Vec<_>, _>>()?;
        let mut fx = Self {
            pairs,
            quotes: quotes.iter().map(|(_, q)| Dual::constant(*q)).collect(),
            ad_order: AdOrder::Zero,
        };
        fx.set_ad_order(AdOrder::One);
        Ok(fx)
    }

    /// Differentiation order of the quotes.
    pub fn ad_order(&self) -> AdOrder {
        self.ad_order
    }

    fn direct(&self, lhs: Currency, rhs: Currency) -> Option<Dual> {
        self.pairs.iter().zip(&self.quotes).find_map(|(&(l, r), q)| {
            if (l, r) == (lhs, rhs) {
                Some(q.clone())
            } else if (r, l) == (lhs, rhs) {
                Some(q.recip())
            } else {
                None
            }
        })
    }

    fn currencies(&self) -> Vec<Currency> {
        let mut out: Vec<Currency> = self.pairs.iter().flat_map(|&(l, r)| [l, r]).collect();
        out.sort();
        out.dedup();
        out
    }
}

fn parse_pair(pair: &str) -> Result<(Currency, Currency), FxError> {
    if pair.len() != 6 || !pair.is_ascii() {
        return Err(FxError::InvalidPair(pair.to_string()));
    }
    let lhs = Currency::from_str(&pair[..3])?;
    let rhs = Currency::from_str(&pair[3..])?;
    if lhs == rhs {
        return Err(FxError::InvalidPair(pair.to_string()));
    }
    Ok((lhs, rhs))
}

impl FxSource for FxRates {
    fn pairs(&self) -> Vec<String> {
        self.pairs
            .iter()
            .map(|(l, r)| format!("{}{}", l.pair_code(), r.pair_code()))
            .collect()
    }

    fn rate(&self, lhs: Currency, rhs: Currency) -> Result<Dual, FxError> {
        if lhs == rhs {
            return Ok(Dual::constant(1.0));
        }
        if let Some(rate) = self.direct(lhs, rhs) {
            return Ok(rate);
        }
        self.currencies()
            .into_iter()
            .find_map(|via| {
                let first = self.direct(lhs, via)?;
                let second = self.direct(via, rhs)?;
                Some(&first * &second)
            })
            .ok_or_else(|| FxError::no_route(lhs, rhs))
    }

    fn set_ad_order(&mut self, order: AdOrder) {
        let tags = self.variables();
        self.quotes = self
            .quotes
            .iter()
            .zip(tags)
            .map(|(q, tag)| Dual::tagged(q.real(), tag, order))
            .collect();
        self.ad_order = order;
    }

    fn box_clone(&self) -> Box<dyn FxSource> {
        Box::new(self.clone())
    }
}
