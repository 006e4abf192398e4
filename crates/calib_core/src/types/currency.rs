//! Currency types for valuation buckets and FX pairs.
//!
//! This module provides ISO 4217 currency codes used to key valuations
//! by settlement currency and to name FX pairs.
//!
//! # Examples
//!
//! ```
//! use calib_core::types::currency::Currency;
//!
//! let usd = Currency::USD;
//! assert_eq!(usd.code(), "USD");
//! assert_eq!(usd.pair_code(), "usd");
//! ```

use std::fmt;
use std::str::FromStr;

use super::error::CurrencyError;

/// ISO 4217 currency codes.
///
/// Ordering follows declaration order and is used to lay out report
/// columns deterministically.
///
/// # Examples
///
/// ```
/// use calib_core::types::currency::Currency;
///
/// // Parse from string (case-insensitive)
/// let eur: Currency = "eur".parse().unwrap();
/// assert_eq!(eur, Currency::EUR);
///
/// let result: Result<Currency, _> = "XYZ".parse();
/// assert!(result.is_err());
/// ```
#[non_exhaustive]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Currency {
    /// United States Dollar
    USD,
    /// Euro
    EUR,
    /// British Pound Sterling
    GBP,
    /// Japanese Yen
    JPY,
    /// Swiss Franc
    CHF,
    /// Australian Dollar
    AUD,
    /// Canadian Dollar
    CAD,
    /// Swedish Krona
    SEK,
    /// Norwegian Krone
    NOK,
}

impl Currency {
    /// All supported currencies in declaration order.
    pub const ALL: [Currency; 9] = [
        Currency::USD,
        Currency::EUR,
        Currency::GBP,
        Currency::JPY,
        Currency::CHF,
        Currency::AUD,
        Currency::CAD,
        Currency::SEK,
        Currency::NOK,
    ];

    /// Returns the ISO 4217 three-letter currency code.
    pub fn code(&self) -> &'static str {
        match self {
            Currency::USD => "USD",
            Currency::EUR => "EUR",
            Currency::GBP => "GBP",
            Currency::JPY => "JPY",
            Currency::CHF => "CHF",
            Currency::AUD => "AUD",
            Currency::CAD => "CAD",
            Currency::SEK => "SEK",
            Currency::NOK => "NOK",
        }
    }

    /// Returns the lower-case code used inside FX pair names such as `eurusd`.
    pub fn pair_code(&self) -> &'static str {
        match self {
            Currency::USD => "usd",
            Currency::EUR => "eur",
            Currency::GBP => "gbp",
            Currency::JPY => "jpy",
            Currency::CHF => "chf",
            Currency::AUD => "aud",
            Currency::CAD => "cad",
            Currency::SEK => "sek",
            Currency::NOK => "nok",
        }
    }
}

impl FromStr for Currency {
    type Err = CurrencyError;

    /// Parses ISO 4217 currency code (case-insensitive).
    fn from_str(s: &str) -> Result<Self, CurrencyError> {
        Currency::ALL
            .iter()
            .copied()
            .find(|ccy| ccy.code().eq_ignore_ascii_case(s))
            .ok_or_else(|| CurrencyError::UnknownCurrency(s.to_string()))
    }
}

impl fmt::Display for Currency {
    /// Formats as ISO 4217 code.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
