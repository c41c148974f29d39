//! Core types for the Clinical Panel pipeline
//!
//! This module defines the small value types shared between stages: patient
//! identifiers, the time semantics chosen for a source, per-variable drop
//! statistics and the key of a panel cell.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical patient identifier
///
/// Identifiers are compared as text after canonicalisation, so `"00123"`,
/// `"123"` and `"123.0"` all refer to the same patient.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PatientId(String);

impl PatientId {
    /// Canonicalise a raw identifier cell. Returns `None` for blank cells.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        if let Ok(n) = trimmed.parse::<i64>() {
            return Some(Self(n.to_string()));
        }

        // Exported integer ids frequently come back as floats ("123.0")
        if let Ok(f) = trimmed.parse::<f64>() {
            if f.is_finite() && f.fract() == 0.0 && f.abs() < 9.0e15 {
                return Some(Self((f as i64).to_string()));
            }
        }

        Some(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PatientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unit of a numeric offset column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Hours,
    Minutes,
}

impl TimeUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeUnit::Hours => "hours",
            TimeUnit::Minutes => "minutes",
        }
    }

    /// Convert a value in this unit into hours
    pub fn to_hours(&self, value: f64) -> f64 {
        match self {
            TimeUnit::Hours => value,
            TimeUnit::Minutes => value / 60.0,
        }
    }
}

/// How the time column of one source is interpreted
///
/// Chosen once per source file, before any row is converted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimeSemantics {
    /// Offset-like column; unit inferred from the median magnitude
    Offset { unit: TimeUnit, median: f64 },
    /// Numeric column without an offset-like name, read as hours
    Hours,
    /// Absolute timestamps, converted with the patient's t0
    Absolute,
}

impl TimeSemantics {
    pub fn describe(&self) -> String {
        match self {
            TimeSemantics::Offset { unit, median } => {
                format!("offset in {} (median {})", unit.as_str(), median)
            }
            TimeSemantics::Hours => "numeric hours".to_string(),
            TimeSemantics::Absolute => "absolute timestamp minus t0".to_string(),
        }
    }
}

/// Per-variable record accounting
///
/// Every record read from a source ends up in exactly one bucket: it is
/// either binned or dropped for one of the listed reasons.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropStats {
    /// Data rows read from the source, including unreadable ones
    pub records_read: usize,
    /// Records the CSV reader could not decode
    pub unreadable_record: usize,
    /// Rows with a blank patient identifier
    pub missing_patient_id: usize,
    /// Rows whose patient is not in the roster
    pub unknown_patient: usize,
    /// Rows whose time cell could not be parsed
    pub unparsable_time: usize,
    /// Rows from patients without t0 in an absolute-timestamp source
    pub missing_t0: usize,
    /// Rows outside the binning window
    pub out_of_window: usize,
    /// Rows whose value cell could not be parsed
    pub unparsable_value: usize,
    /// Rows that reached the reducer
    pub binned: usize,
}

impl DropStats {
    /// Total rows dropped before reduction
    pub fn dropped(&self) -> usize {
        self.unreadable_record
            + self.missing_patient_id
            + self.unknown_patient
            + self.unparsable_time
            + self.missing_t0
            + self.out_of_window
            + self.unparsable_value
    }
}

/// Outcome of loading one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum VariableStatus {
    Loaded,
    /// The variable degraded to an all-missing column
    Failed { reason: String },
}

impl VariableStatus {
    pub fn is_loaded(&self) -> bool {
        matches!(self, VariableStatus::Loaded)
    }
}

/// Position of a panel cell: roster index and bin index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub patient: usize,
    pub bin: usize,
}

impl CellKey {
    pub fn new(patient: usize, bin: usize) -> Self {
        Self { patient, bin }
    }
}
