//! Risk report containers.
//!
//! Rows are risk factors: the calibrating instruments of every solver in the
//! chain (in aggregate order) followed by FX pairs. Columns are keyed by the
//! currency the exposure arises in and the currency it is displayed in;
//! the [`Bucket::All`] column sums every bucket converted into the base
//! currency.

use std::fmt;

use calib_core::types::Currency;
use calib_optimiser::InstrumentLabel;
use nalgebra::{DMatrix, DVector};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Currency bucket a risk column originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Bucket {
    /// Cashflows payable in this currency.
    Local(Currency),
    /// Sum over every local bucket.
    All,
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bucket::Local(ccy) => write!(f, "{ccy}"),
            Bucket::All => f.write_str("all"),
        }
    }
}

/// Row of a delta report.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RiskFactor {
    /// A calibrating instrument, per basis point.
    Instrument(InstrumentLabel),
    /// An FX pair such as `eurusd`, per pip.
    Fx(String),
}

/// One column of a [`DeltaReport`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeltaColumn {
    /// Originating bucket
    pub local: Bucket,
    /// Display currency
    pub display: Currency,
    /// Instrument deltas followed by FX deltas
    pub values: DVector<f64>,
}

/// First-order risk to calibrating instruments and FX rates.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeltaReport {
    rows: Vec<RiskFactor>,
    instrument_count: usize,
    columns: Vec<DeltaColumn>,
}

impl DeltaReport {
    pub(crate) fn new(labels: &[InstrumentLabel], fx_pairs: Vec<String>, mut columns: Vec<DeltaColumn>) -> Self {
        columns.sort_by_key(|c| (c.local, c.display));
        let rows = labels
            .iter()
            .cloned()
            .map(RiskFactor::Instrument)
            .chain(fx_pairs.into_iter().map(RiskFactor::Fx))
            .collect();
        Self {
            rows,
            instrument_count: labels.len(),
            columns,
        }
    }

    /// Risk factors, instruments first.
    pub fn rows(&self) -> &[RiskFactor] {
        &self.rows
    }

    /// Columns sorted by bucket then display currency.
    pub fn columns(&self) -> &[DeltaColumn] {
        &self.columns
    }

    /// Column for `(local, display)`.
    pub fn column(&self, local: Bucket, display: Currency) -> Option<&DeltaColumn> {
        self.columns
            .iter()
            .find(|c| c.local == local && c.display == display)
    }

    /// Instrument rows of the `(local, display)` column.
    pub fn instruments(&self, local: Bucket, display: Currency) -> Option<&[f64]> {
        self.column(local, display)
            .map(|c| &c.values.as_slice()[..self.instrument_count])
    }

    /// FX rows of the `(local, display)` column.
    pub fn fx(&self, local: Bucket, display: Currency) -> Option<&[f64]> {
        self.column(local, display)
            .map(|c| &c.values.as_slice()[self.instrument_count..])
    }

    /// Single entry by row label and column.
    ///
    /// Instruments are matched on `"{solver}/{label}"` or the bare label,
    /// FX rows on the pair name.
    pub fn get(&self, row: &str, local: Bucket, display: Currency) -> Option<f64> {
        let index = self.rows.iter().position(|r| match r {
            RiskFactor::Instrument(l) => {
                l.label == row || format!("{}/{}", l.solver, l.label) == row
            }
            RiskFactor::Fx(pair) => pair == row,
        })?;
        self.column(local, display).map(|c| c.values[index])
    }
}

/// One block of a [`GammaReport`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GammaBlock {
    /// Originating bucket
    pub local: Bucket,
    /// Display currency
    pub display: Currency,
    /// Instrument × instrument cross-gamma
    pub values: DMatrix<f64>,
}

/// Second-order cross-gamma to calibrating instruments.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GammaReport {
    labels: Vec<InstrumentLabel>,
    blocks: Vec<GammaBlock>,
}

impl GammaReport {
    pub(crate) fn new(labels: &[InstrumentLabel], mut blocks: Vec<GammaBlock>) -> Self {
        blocks.sort_by_key(|b| (b.local, b.display));
        Self {
            labels: labels.to_vec(),
            blocks,
        }
    }

    /// Row and column labels of every block.
    pub fn labels(&self) -> &[InstrumentLabel] {
        &self.labels
    }

    /// Blocks sorted by bucket then display currency.
    pub fn blocks(&self) -> &[GammaBlock] {
        &self.blocks
    }

    /// Block for `(local, display)`.
    pub fn block(&self, local: Bucket, display: Currency) -> Option<&DMatrix<f64>> {
        self.blocks
            .iter()
            .find(|b| b.local == local && b.display == display)
            .map(|b| &b.values)
    }
}

/// Sensitivity of one solver's instruments to another's.
///
/// Entry `(i, j)` is the change in this solver's instrument `i` rate for a
/// unit change in the other solver's instrument `j` rate.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct JacobianReport {
    /// This solver's instrument labels
    pub rows: Vec<String>,
    /// The other solver's instrument labels
    pub columns: Vec<String>,
    /// `rows × columns` sensitivities
    pub values: DMatrix<f64>,
}

impl JacobianReport {
    /// Entry by labels.
    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        let i = self.rows.iter().position(|r| r == row)?;
        let j = self.columns.iter().position(|c| c == column)?;
        Some(self.values[(i, j)])
    }
}
