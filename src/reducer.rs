//! Per-bin reduction
//!
//! For one variable, every (patient, bin) group keeps a single observation:
//! the one with the largest signed relative-hour value, i.e. the latest
//! record inside the window. Among records with the same relative hour the
//! one read last from the source wins.

use crate::types::CellKey;
use std::collections::HashMap;

/// One record that survived normalization and binning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinnedObservation {
    /// Roster position of the patient
    pub patient: usize,
    /// Bin index on the grid
    pub bin: usize,
    /// Signed relative hours before binning
    pub relative_hours: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy)]
struct Selected {
    relative_hours: f64,
    value: f64,
}

/// Reduced mapping of one variable: (patient, bin) → value
///
/// Cells without any qualifying record are absent, not null.
#[derive(Debug, Clone, Default)]
pub struct ReducedVariable {
    cells: HashMap<CellKey, Selected>,
}

impl ReducedVariable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer one observation; call in source order
    pub fn offer(&mut self, obs: BinnedObservation) {
        let key = CellKey::new(obs.patient, obs.bin);
        let candidate = Selected {
            relative_hours: obs.relative_hours,
            value: obs.value,
        };

        self.cells
            .entry(key)
            .and_modify(|current| {
                // `>=` lets a later record win a tie
                if candidate.relative_hours >= current.relative_hours {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    /// Selected value of a cell, if any record mapped there
    pub fn get(&self, patient: usize, bin: usize) -> Option<f64> {
        self.cells
            .get(&CellKey::new(patient, bin))
            .map(|s| s.value)
    }

    /// Number of populated cells
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Populated cells with their values, in (patient, bin) order
    pub fn sorted_cells(&self) -> Vec<(CellKey, f64)> {
        let mut cells: Vec<(CellKey, f64)> =
            self.cells.iter().map(|(k, s)| (*k, s.value)).collect();
        cells.sort_by_key(|(k, _)| *k);
        cells
    }
}

impl FromIterator<BinnedObservation> for ReducedVariable {
    fn from_iter<I: IntoIterator<Item = BinnedObservation>>(iter: I) -> Self {
        let mut reduced = ReducedVariable::new();
        for obs in iter {
            reduced.offer(obs);
        }
        reduced
    }
}

/// Reduce a sequence of observations in source order
pub fn reduce<I>(observations: I) -> ReducedVariable
where
    I: IntoIterator<Item = BinnedObservation>,
{
    observations.into_iter().collect()
}
