//! Patient roster
//!
//! The roster fixes the row extent of the panel: every patient in it gets a
//! full set of bins, whatever the variable sources contain. It also carries
//! each patient's t0 when the cohort defines one.

use crate::config::CohortConfig;
use crate::error::PanelError;
use crate::normalizer::parse_timestamp;
use crate::schema::{normalize_column_name, RawTable, SchemaResolver};
use crate::types::PatientId;
use chrono::NaiveDateTime;
use log::{info, warn};
use std::collections::HashMap;

/// Ordered set of unique patients with optional anchors
#[derive(Debug, Clone, Default)]
pub struct Roster {
    ids: Vec<PatientId>,
    anchors: Vec<Option<NaiveDateTime>>,
    index: HashMap<PatientId, usize>,
}

impl Roster {
    /// Build a roster without anchors; duplicates keep their first position
    pub fn new<I>(ids: I) -> Self
    where
        I: IntoIterator<Item = PatientId>,
    {
        let mut roster = Self::default();
        for id in ids {
            roster.insert(id, None);
        }
        roster
    }

    /// Build a roster of `(id, t0)` pairs; the first t0 seen for a patient wins
    pub fn with_anchors<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (PatientId, Option<NaiveDateTime>)>,
    {
        let mut roster = Self::default();
        for (id, t0) in entries {
            roster.insert(id, t0);
        }
        roster
    }

    fn insert(&mut self, id: PatientId, t0: Option<NaiveDateTime>) {
        if let Some(&idx) = self.index.get(&id) {
            if self.anchors[idx].is_none() {
                self.anchors[idx] = t0;
            }
            return;
        }
        self.index.insert(id.clone(), self.ids.len());
        self.ids.push(id);
        self.anchors.push(t0);
    }

    /// Load the roster from the cohort's base table
    ///
    /// Fails when no identifier column can be resolved, when the configured
    /// t0 column is absent, or when no patient identifier survives parsing.
    pub fn from_table(table: &RawTable, cohort: &CohortConfig) -> Result<Self, PanelError> {
        let resolver = SchemaResolver::with_preferred_id(cohort.preferred_id_column());
        let id_col = resolver
            .id_column(&table.headers)
            .ok_or_else(|| PanelError::MissingColumn {
                table: table.name.clone(),
                column: cohort
                    .preferred_id_column()
                    .unwrap_or("patient identifier")
                    .to_string(),
            })?;

        let t0_col = match cohort.resolved_t0_column() {
            Some(name) => {
                let wanted = normalize_column_name(name);
                let idx = table
                    .headers
                    .iter()
                    .position(|h| normalize_column_name(h) == wanted)
                    .ok_or_else(|| PanelError::MissingColumn {
                        table: table.name.clone(),
                        column: name.to_string(),
                    })?;
                Some(idx)
            }
            None => None,
        };

        let mut unparsable_t0 = 0usize;
        let entries: Vec<(PatientId, Option<NaiveDateTime>)> = (0..table.len())
            .filter_map(|row| {
                let id = PatientId::parse(table.cell(row, id_col))?;
                let t0 = t0_col.and_then(|col| {
                    let parsed = parse_timestamp(table.cell(row, col));
                    if parsed.is_none() {
                        unparsable_t0 += 1;
                    }
                    parsed
                });
                Some((id, t0))
            })
            .collect();

        let roster = Self::with_anchors(entries);
        if roster.is_empty() {
            return Err(PanelError::EmptyRoster);
        }

        if unparsable_t0 > 0 {
            warn!(
                "{}: {} roster rows have no parsable t0; their timestamp sources will be dropped",
                table.name, unparsable_t0
            );
        }
        info!(
            "Roster loaded from {}: {} patients (id column '{}', t0 column {})",
            table.name,
            roster.len(),
            table.header(id_col),
            t0_col
                .map(|c| format!("'{}'", table.header(c)))
                .unwrap_or_else(|| "none".to_string())
        );

        Ok(roster)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[PatientId] {
        &self.ids
    }

    /// Roster position of a patient
    pub fn position(&self, id: &PatientId) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// t0 of the patient at roster position `idx`
    pub fn anchor(&self, idx: usize) -> Option<NaiveDateTime> {
        self.anchors.get(idx).copied().flatten()
    }

    /// Number of patients that have a t0
    pub fn anchored_count(&self) -> usize {
        self.anchors.iter().filter(|a| a.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CohortPreset;

    fn id(s: &str) -> PatientId {
        PatientId::parse(s).unwrap()
    }

    #[test]
    fn test_roster_deduplicates_in_order() {
        let roster = Roster::new(vec![id("3"), id("1"), id("3"), id("2")]);
        let ids: Vec<&str> = roster.ids().iter().map(|p| p.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
        assert_eq!(roster.position(&id("2")), Some(2));
        assert_eq!(roster.position(&id("9")), None);
    }

    #[test]
    fn test_from_table_with_t0() {
        let table = RawTable::from_rows(
            "cohort.csv",
            &["SUBJECT_ID", "FIRST_ICU_INTIME", "AGE"],
            &[
                &["10", "2150-01-01 08:00:00", "71"],
                &["11", "", "65"],
                &["10.0", "2150-03-01 08:00:00", "71"],
                &["", "2150-01-01 08:00:00", "50"],
            ],
        );
        let cohort = CohortConfig {
            preset: Some(CohortPreset::MimicIii),
            ..Default::default()
        };

        let roster = Roster::from_table(&table, &cohort).unwrap();
        assert_eq!(roster.len(), 2);
        assert_eq!(roster.anchored_count(), 1);
        // First t0 wins for the duplicated subject
        assert_eq!(
            roster.anchor(0),
            parse_timestamp("2150-01-01 08:00:00")
        );
        assert_eq!(roster.anchor(1), None);
    }

    #[test]
    fn test_later_row_supplies_missing_t0() {
        let t0 = parse_timestamp("2150-01-01 08:00:00");
        let roster = Roster::with_anchors(vec![(id("5"), None), (id("5"), t0)]);
        assert_eq!(roster.len(), 1);
        assert_eq!(roster.anchor(0), t0);
    }

    #[test]
    fn test_missing_t0_column_is_fatal() {
        let table = RawTable::from_rows("cohort.csv", &["subject_id"], &[&["1"]]);
        let cohort = CohortConfig {
            preset: Some(CohortPreset::MimicIv),
            ..Default::default()
        };
        assert!(matches!(
            Roster::from_table(&table, &cohort),
            Err(PanelError::MissingColumn { .. })
        ));
    }

    #[test]
    fn test_empty_roster_is_fatal() {
        let table = RawTable::from_rows("cohort.csv", &["patientunitstayid"], &[&[""]]);
        assert!(matches!(
            Roster::from_table(&table, &CohortConfig::default()),
            Err(PanelError::EmptyRoster)
        ));
    }
}
