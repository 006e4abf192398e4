//! Variable space of a solver and its dependency chain.
//!
//! Own variables are the solver-controlled node tags of the solver's curves
//! in registration order. Aggregate quantities concatenate every upstream
//! solver's aggregates in chain order, followed by the solver's own entries.

use std::collections::HashSet;
use std::ops::Range;

use calib_core::market_data::Curve;

use crate::error::SolverError;

/// Position of one upstream solver inside the aggregate layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainBlock {
    /// Aggregate instrument rows owned by the upstream solver
    pub instruments: Range<usize>,
    /// Aggregate variable columns owned by the upstream solver
    pub variables: Range<usize>,
}

/// Instrument label qualified by the solver that owns it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InstrumentLabel {
    /// Owning solver id
    pub solver: String,
    /// Instrument label within that solver
    pub label: String,
}

/// Ordered variables and instrument metadata, local and chain-wide.
///
/// # Examples
///
/// ```
/// use calib_core::market_data::{Curve, NodeCurve};
/// use calib_optimiser::VariableSpace;
///
/// let curve = NodeCurve::discount("usd", vec![0.0, 1.0, 2.0], vec![1.0, 0.97, 0.94]).unwrap();
/// let curves: Vec<Box<dyn Curve>> = vec![Box::new(curve)];
/// let space = VariableSpace::new(&curves, "sv", &["a".into(), "b".into()], &[1.0, 1.0], &[]);
/// assert_eq!(space.variables(), &["usd_1".to_string(), "usd_2".to_string()]);
/// assert_eq!(space.pre_variable_count(), 0);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VariableSpace {
    variables: Vec<String>,
    aggregate_variables: Vec<String>,
    aggregate_labels: Vec<InstrumentLabel>,
    aggregate_rate_scalars: Vec<f64>,
    blocks: Vec<ChainBlock>,
}

impl VariableSpace {
    /// Lay out the variables of `curves` after the upstream spaces `pre`.
    pub fn new(
        curves: &[Box<dyn Curve>],
        solver_id: &str,
        labels: &[String],
        rate_scalars: &[f64],
        pre: &[&VariableSpace],
    ) -> Self {
        let variables: Vec<String> = curves.iter().flat_map(|c| c.variable_tags()).collect();

        let mut space = Self::default();
        for upstream in pre {
            space.blocks.push(ChainBlock {
                instruments: space.aggregate_labels.len()
                    ..space.aggregate_labels.len() + upstream.aggregate_labels.len(),
                variables: space.aggregate_variables.len()
                    ..space.aggregate_variables.len() + upstream.aggregate_variables.len(),
            });
            space
                .aggregate_variables
                .extend_from_slice(&upstream.aggregate_variables);
            space
                .aggregate_labels
                .extend_from_slice(&upstream.aggregate_labels);
            space
                .aggregate_rate_scalars
                .extend_from_slice(&upstream.aggregate_rate_scalars);
        }

        space.aggregate_variables.extend_from_slice(&variables);
        space
            .aggregate_labels
            .extend(labels.iter().map(|label| InstrumentLabel {
                solver: solver_id.to_string(),
                label: label.clone(),
            }));
        space.aggregate_rate_scalars.extend_from_slice(rate_scalars);
        space.variables = variables;
        space
    }

    /// Own variable tags.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Chain-wide variable tags, own tags last.
    pub fn aggregate_variables(&self) -> &[String] {
        &self.aggregate_variables
    }

    /// Chain-wide instrument labels, own labels last.
    pub fn aggregate_labels(&self) -> &[InstrumentLabel] {
        &self.aggregate_labels
    }

    /// Chain-wide instrument rate scalars, aligned with the labels.
    pub fn aggregate_rate_scalars(&self) -> &[f64] {
        &self.aggregate_rate_scalars
    }

    /// Layout of each upstream solver, in chain order.
    pub fn blocks(&self) -> &[ChainBlock] {
        &self.blocks
    }

    /// Number of upstream variables.
    pub fn pre_variable_count(&self) -> usize {
        self.aggregate_variables.len() - self.variables.len()
    }

    /// Number of upstream instruments.
    pub fn pre_instrument_count(&self) -> usize {
        self.blocks.last().map_or(0, |b| b.instruments.end)
    }
}

/// Reject repeated curve identifiers.
///
/// # Errors
///
/// Returns [`SolverError::DuplicateCurveId`] naming the first repeat.
pub fn validate_unique_ids<'a>(ids: impl IntoIterator<Item = &'a str>) -> Result<(), SolverError> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(SolverError::DuplicateCurveId(id.to_string()));
        }
    }
    Ok(())
}
