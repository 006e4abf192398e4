//! Multi-currency valuations.

use std::collections::btree_map;
use std::collections::BTreeMap;

use calib_core::types::{Currency, Dual};

/// A value split into per-currency buckets.
///
/// Each bucket carries the derivatives of the local-currency amount with
/// respect to curve and FX variables. Buckets iterate in currency order.
///
/// # Examples
///
/// ```
/// use calib_core::types::{Currency, Dual};
/// use calib_risk::Valuation;
///
/// let mut npv = Valuation::single(Currency::EUR, Dual::variable(100.0, "eur_1"));
/// npv.add(Currency::EUR, Dual::constant(5.0));
/// npv.add(Currency::USD, Dual::constant(-20.0));
///
/// assert_eq!(npv.len(), 2);
/// assert_eq!(npv.get(Currency::EUR).unwrap().real(), 105.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Valuation {
    buckets: BTreeMap<Currency, Dual>,
}

impl Valuation {
    /// Empty valuation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Valuation with a single currency bucket.
    pub fn single(currency: Currency, value: Dual) -> Self {
        let mut out = Self::new();
        out.add(currency, value);
        out
    }

    /// Add `value` to the `currency` bucket, creating it if absent.
    pub fn add(&mut self, currency: Currency, value: Dual) {
        match self.buckets.entry(currency) {
            btree_map::Entry::Occupied(mut e) => {
                let sum = e.get() + &value;
                e.insert(sum);
            }
            btree_map::Entry::Vacant(e) => {
                e.insert(value);
            }
        }
    }

    /// Bucket for `currency`.
    pub fn get(&self, currency: Currency) -> Option<&Dual> {
        self.buckets.get(&currency)
    }

    /// Currencies present, in order.
    pub fn currencies(&self) -> impl Iterator<Item = Currency> + '_ {
        self.buckets.keys().copied()
    }

    /// `(currency, value)` pairs, in currency order.
    pub fn iter(&self) -> impl Iterator<Item = (Currency, &Dual)> + '_ {
        self.buckets.iter().map(|(c, v)| (*c, v))
    }

    /// Number of buckets.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// True when there are no buckets.
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

impl FromIterator<(Currency, Dual)> for Valuation {
    fn from_iter<I: IntoIterator<Item = (Currency, Dual)>>(iter: I) -> Self {
        let mut out = Self::new();
        for (ccy, value) in iter {
            out.add(ccy, value);
        }
        out
    }
}
