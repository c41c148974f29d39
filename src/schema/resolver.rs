//! Column resolution by alias
//!
//! Clinical exports name the same column many ways (`SUBJECT_ID`,
//! `subject_id`, `patientunitstayid`, `labresultoffset`, `ALBUMIN_CHARTTIME`).
//! The resolver compares names after lowercasing and removing punctuation,
//! walks a priority-ordered alias list, and reports "not found" as `None`.

use crate::error::PanelError;
use crate::schema::RawTable;
use log::debug;

/// Identifier column aliases, highest priority first
pub const ID_ALIASES: &[&str] = &[
    "patientunitstayid",
    "subject_id",
    "subjectid",
    "patient_id",
    "pid",
    "patient",
];

/// Time column aliases, highest priority first (after `<variable>_charttime`)
pub const TIME_ALIASES: &[&str] = &[
    "labresultoffset",
    "offset",
    "timeoffset",
    "hours",
    "hour",
    "charttime",
    "time",
    "timestamp",
];

/// Value column aliases, highest priority first (after the variable name)
pub const VALUE_ALIASES: &[&str] = &[
    "valuenum",
    "value",
    "labresult",
    "resultvalue",
    "measurevalue",
];

/// Fragments marking a column as unit/flag metadata rather than a value
const NON_VALUE_FRAGMENTS: &[&str] = &["unit", "uom", "flag", "time", "offset", "charttime"];

/// Lowercase a column name and drop everything that is not alphanumeric
pub fn normalize_column_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(|c| c.to_lowercase())
        .collect()
}

/// Columns located in one source table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub id: usize,
    pub time: usize,
    pub value: usize,
}

/// Alias-based column resolver
#[derive(Debug, Clone, Default)]
pub struct SchemaResolver {
    preferred_id: Option<String>,
}

impl SchemaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try `column` before the built-in identifier aliases
    pub fn with_preferred_id(column: Option<&str>) -> Self {
        Self {
            preferred_id: column.map(normalize_column_name),
        }
    }

    /// Locate the patient identifier column
    pub fn id_column(&self, headers: &[String]) -> Option<usize> {
        let normalized = normalize_all(headers);
        self.id_aliases()
            .iter()
            .find_map(|alias| position(&normalized, alias))
    }

    /// Normalized identifier aliases in priority order
    fn id_aliases(&self) -> Vec<String> {
        self.preferred_id
            .iter()
            .cloned()
            .chain(ID_ALIASES.iter().map(|a| normalize_column_name(a)))
            .collect()
    }

    /// Locate the time column for `variable`
    pub fn time_column(&self, headers: &[String], variable: Option<&str>) -> Option<usize> {
        let normalized = normalize_all(headers);

        if let Some(var) = variable {
            let specific = normalize_column_name(&format!("{}_charttime", var));
            if let Some(idx) = position(&normalized, &specific) {
                return Some(idx);
            }
        }

        TIME_ALIASES
            .iter()
            .find_map(|alias| position(&normalized, &normalize_column_name(alias)))
            .or_else(|| {
                normalized
                    .iter()
                    .position(|h| h.contains("charttime") || h.contains("offset"))
            })
    }

    /// Locate the value column for `variable`
    ///
    /// Falls back to the first column that is neither identifier- nor
    /// time-like and whose non-empty cells all parse as numbers.
    pub fn value_column(&self, table: &RawTable, variable: Option<&str>) -> Option<usize> {
        let normalized = normalize_all(&table.headers);

        if let Some(var) = variable {
            if let Some(idx) = position(&normalized, &normalize_column_name(var)) {
                return Some(idx);
            }
        }

        if let Some(idx) = VALUE_ALIASES
            .iter()
            .find_map(|alias| position(&normalized, &normalize_column_name(alias)))
        {
            return Some(idx);
        }

        let id_like = self.id_aliases();

        normalized.iter().enumerate().find_map(|(idx, name)| {
            if NON_VALUE_FRAGMENTS.iter().any(|f| name.contains(f)) || id_like.contains(name) {
                return None;
            }
            is_numeric_column(table, idx).then_some(idx)
        })
    }

    /// Resolve all three columns of a variable source
    pub fn resolve(&self, table: &RawTable, variable: &str) -> Result<ResolvedColumns, PanelError> {
        let missing = |column: &str| PanelError::MissingColumn {
            table: table.name.clone(),
            column: column.to_string(),
        };

        let id = self
            .id_column(&table.headers)
            .ok_or_else(|| missing("patient identifier"))?;
        let time = self
            .time_column(&table.headers, Some(variable))
            .ok_or_else(|| missing("time"))?;
        let value = self
            .value_column(table, Some(variable))
            .ok_or_else(|| missing("numeric value"))?;

        debug!(
            "{}: id='{}' time='{}' value='{}'",
            table.name,
            table.header(id),
            table.header(time),
            table.header(value)
        );

        Ok(ResolvedColumns { id, time, value })
    }
}

fn normalize_all(headers: &[String]) -> Vec<String> {
    headers.iter().map(|h| normalize_column_name(h)).collect()
}

fn position(normalized: &[String], alias: &str) -> Option<usize> {
    if alias.is_empty() {
        return None;
    }
    normalized.iter().position(|h| h == alias)
}

fn is_numeric_column(table: &RawTable, column: usize) -> bool {
    let mut seen = false;
    for cell in table.column(column) {
        if cell.is_empty() {
            continue;
        }
        if cell.parse::<f64>().is_err() {
            return false;
        }
        seen = true;
    }
    seen
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("SUBJECT_ID"), "subjectid");
        assert_eq!(normalize_column_name(" Lab-Result Offset "), "labresultoffset");
    }

    #[test]
    fn test_id_column_priority() {
        let resolver = SchemaResolver::new();
        let cols = headers(&["patient", "SUBJECT_ID", "value"]);
        assert_eq!(resolver.id_column(&cols), Some(1));

        let cols = headers(&["hadm_id", "charttime"]);
        assert_eq!(resolver.id_column(&cols), None);
    }

    #[test]
    fn test_preferred_id_column() {
        let resolver = SchemaResolver::with_preferred_id(Some("stay_id"));
        let cols = headers(&["subject_id", "Stay-ID"]);
        assert_eq!(resolver.id_column(&cols), Some(1));
    }

    #[test]
    fn test_time_column_resolution() {
        let resolver = SchemaResolver::new();

        let cols = headers(&["subject_id", "charttime", "Albumin_charttime"]);
        assert_eq!(resolver.time_column(&cols, Some("Albumin")), Some(2));
        assert_eq!(resolver.time_column(&cols, Some("Sodium")), Some(1));

        let cols = headers(&["patientunitstayid", "labResultOffset", "labresult"]);
        assert_eq!(resolver.time_column(&cols, None), Some(1));

        let cols = headers(&["pid", "result_offset_min", "v"]);
        assert_eq!(resolver.time_column(&cols, None), Some(1));

        let cols = headers(&["pid", "v"]);
        assert_eq!(resolver.time_column(&cols, None), None);
    }

    #[test]
    fn test_value_column_resolution() {
        let resolver = SchemaResolver::new();

        let table = RawTable::from_rows(
            "t",
            &["subject_id", "charttime", "ALBUMIN", "valuenum"],
            &[&["1", "2150-01-01", "3.1", "3.1"]],
        );
        assert_eq!(resolver.value_column(&table, Some("Albumin")), Some(2));
        assert_eq!(resolver.value_column(&table, Some("Sodium")), Some(3));
    }

    #[test]
    fn test_value_column_numeric_fallback() {
        let resolver = SchemaResolver::new();
        let table = RawTable::from_rows(
            "t",
            &["subject_id", "charttime", "valueuom", "comment", "result_num"],
            &[
                &["1", "2150-01-01", "g/dL", "ok", "3.1"],
                &["2", "2150-01-02", "g/dL", "ok", ""],
            ],
        );
        assert_eq!(resolver.value_column(&table, None), Some(4));
    }

    #[test]
    fn test_resolve_reports_missing_column() {
        let resolver = SchemaResolver::new();
        let table = RawTable::from_rows("t", &["subject_id", "value"], &[&["1", "2"]]);
        let err = resolver.resolve(&table, "Albumin").unwrap_err();
        assert!(matches!(err, PanelError::MissingColumn { ref column, .. } if column == "time"));
    }
}
