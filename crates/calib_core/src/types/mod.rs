//! Core numeric and financial types.
//!
//! This module provides:
//! - `dual`: Named-variable forward-mode AD scalar with optional second order
//! - `currency`: ISO 4217 currency codes
//! - `error`: Structured error types for AD, currency, linear algebra and pricing operations
//!
//! # Re-exports
//!
//! - [`Dual`], [`AdOrder`] from `dual`
//! - [`Currency`] from `currency`
//! - [`DualError`], [`CurrencyError`], [`LinalgError`], [`PricingError`] from `error`

pub mod currency;
pub mod dual;
pub mod error;

pub use currency::Currency;
pub use dual::{AdOrder, Dual};
pub use error::{CurrencyError, DualError, LinalgError, PricingError};
