//! Time normalization
//!
//! This module converts a source's raw time column into signed hours relative
//! to each patient's t0.
//! - Offset-like columns are already relative; their unit (minutes or hours)
//!   is decided once per source from the median magnitude
//! - Other numeric columns are read as hours
//! - Timestamp columns are converted by subtracting the patient's t0
//!
//! A cell that cannot be converted yields a [`TimeDrop`] rather than an error,
//! so one malformed row never costs the rest of the source.

use crate::config::DEFAULT_OFFSET_UNIT_THRESHOLD;
use crate::error::PanelError;
use crate::schema::normalize_column_name;
use crate::types::{TimeSemantics, TimeUnit};
use chrono::{DateTime, NaiveDate, NaiveDateTime};

const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Why a time cell produced no relative-hour value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeDrop {
    /// The cell did not parse under the source's semantics
    Unparsable,
    /// Absolute timestamp for a patient without t0
    MissingAnchor,
}

/// Relative hours for every row of one source
#[derive(Debug, Clone)]
pub struct NormalizedTimes {
    pub semantics: TimeSemantics,
    pub hours: Vec<Result<f64, TimeDrop>>,
}

/// Normalizer for converting raw time cells to relative hours
#[derive(Debug, Clone, Copy)]
pub struct TimeNormalizer {
    offset_unit_threshold: f64,
}

impl Default for TimeNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_OFFSET_UNIT_THRESHOLD)
    }
}

impl TimeNormalizer {
    /// Create a normalizer; offsets with `|median| > threshold` are minutes
    pub fn new(offset_unit_threshold: f64) -> Self {
        Self {
            offset_unit_threshold,
        }
    }

    /// Decide how a time column is interpreted
    ///
    /// This looks at the whole column once; the result applies to every row.
    pub fn classify(&self, column_name: &str, cells: &[&str]) -> TimeSemantics {
        let mut numeric: Vec<f64> = cells.iter().filter_map(|c| parse_number(c)).collect();

        if numeric.is_empty() {
            return TimeSemantics::Absolute;
        }

        if is_offset_like(column_name) {
            // numeric is non-empty, so the median exists
            let median = median(&mut numeric).unwrap_or(0.0);
            let unit = if median.abs() > self.offset_unit_threshold {
                TimeUnit::Minutes
            } else {
                TimeUnit::Hours
            };
            return TimeSemantics::Offset { unit, median };
        }

        TimeSemantics::Hours
    }

    /// Convert one cell under already-decided semantics
    pub fn relative_hours(
        &self,
        semantics: TimeSemantics,
        cell: &str,
        t0: Option<NaiveDateTime>,
    ) -> Result<f64, TimeDrop> {
        match semantics {
            TimeSemantics::Offset { unit, .. } => parse_number(cell)
                .map(|v| unit.to_hours(v))
                .ok_or(TimeDrop::Unparsable),
            TimeSemantics::Hours => parse_number(cell).ok_or(TimeDrop::Unparsable),
            TimeSemantics::Absolute => {
                let ts = parse_timestamp(cell).ok_or(TimeDrop::Unparsable)?;
                let t0 = t0.ok_or(TimeDrop::MissingAnchor)?;
                Ok((ts - t0).num_milliseconds() as f64 / 3_600_000.0)
            }
        }
    }

    /// Classify a column, then convert every row
    ///
    /// `anchors[i]` is the t0 of the patient on row `i`. Fails only when a
    /// timestamp column has no parsable cell at all.
    pub fn normalize(
        &self,
        column_name: &str,
        cells: &[&str],
        anchors: &[Option<NaiveDateTime>],
    ) -> Result<NormalizedTimes, PanelError> {
        let semantics = self.classify(column_name, cells);

        if semantics == TimeSemantics::Absolute
            && !cells.iter().any(|c| parse_timestamp(c).is_some())
        {
            return Err(PanelError::TimeColumn(format!(
                "'{}' holds neither numeric offsets nor timestamps",
                column_name
            )));
        }

        let hours = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let t0 = anchors.get(i).copied().flatten();
                self.relative_hours(semantics, cell, t0)
            })
            .collect();

        Ok(NormalizedTimes { semantics, hours })
    }
}

/// Whether a column name marks values that are already relative offsets
pub fn is_offset_like(column_name: &str) -> bool {
    let name = normalize_column_name(column_name);
    name.contains("offset") || name == "hours" || name == "hour" || name.ends_with("charttime")
}

/// Parse a finite number, ignoring surrounding whitespace
pub fn parse_number(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse a wall-clock timestamp in one of the common export formats
pub fn parse_timestamp(cell: &str) -> Option<NaiveDateTime> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }

    // Keep the written clock time; t0 and the other formats carry no offset
    if let Ok(dt) = DateTime::parse_from_rfc3339(cell) {
        return Some(dt.naive_local());
    }

    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(cell, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(cell, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Median of a non-empty slice; averages the middle pair for even lengths
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}
