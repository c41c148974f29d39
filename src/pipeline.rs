//! Pipeline orchestration
//!
//! This module provides the public API for Clinical Panel.
//! It orchestrates the full pipeline from a roster table and N variable
//! tables to a finished panel with coverage.

use crate::adapters::{CsvFileSource, TableSource};
use crate::bins::BinGrid;
use crate::config::{CohortConfig, GridConfig, PanelConfig};
use crate::coverage::{CoverageReport, CoverageReporter};
use crate::error::PanelError;
use crate::normalizer::{TimeDrop, TimeNormalizer};
use crate::reducer::{BinnedObservation, ReducedVariable};
use crate::roster::Roster;
use crate::schema::{RawTable, SchemaResolver};
use crate::skeleton::{Panel, SkeletonBuilder};
use crate::types::{DropStats, PatientId, TimeSemantics, VariableStatus};
use log::{info, warn};
use rayon::prelude::*;
use serde::Serialize;

/// Build a panel from a configuration, reading every table from CSV.
///
/// Pipeline stages:
/// 1. Roster - Load base cohort identifiers and t0
/// 2. TimeNormalizer - Relative hours per source
/// 3. BinGrid - Assign bins on the absolute-hours axis
/// 4. ReducedVariable - Keep the last record per (patient, bin)
/// 5. SkeletonBuilder - Left-join every variable onto roster × bins
/// 6. CoverageReporter - Patient-level coverage per variable
///
/// # Example
/// ```ignore
/// let config = PanelConfig::from_file(Path::new("panel.toml"))?;
/// let build = build_panel(&config)?;
/// println!("{}", build.coverage);
/// ```
pub fn build_panel(config: &PanelConfig) -> Result<PanelBuild, PanelError> {
    config.validate()?;

    let roster_path = config.cohort.roster.as_ref().ok_or_else(|| {
        PanelError::Config("cohort.roster (the base cohort table) is required".to_string())
    })?;

    let processor = PanelProcessor::from_config(config)?;
    let roster = processor.load_roster(&CsvFileSource::new(roster_path))?;

    let inputs: Vec<VariableInput> = config
        .variables
        .iter()
        .map(|v| VariableInput::new(v.name.clone(), CsvFileSource::new(&v.source)))
        .collect();

    processor.build(&roster, &inputs)
}

/// A named variable and its source table
pub struct VariableInput {
    pub name: String,
    pub source: Box<dyn TableSource>,
}

impl VariableInput {
    pub fn new(name: impl Into<String>, source: impl TableSource + 'static) -> Self {
        Self {
            name: name.into(),
            source: Box::new(source),
        }
    }
}

/// What happened to one variable during the build
#[derive(Debug, Clone, Serialize)]
pub struct VariableReport {
    pub name: String,
    pub source: String,
    pub status: VariableStatus,
    pub semantics: Option<TimeSemantics>,
    pub stats: DropStats,
    /// Populated (patient, bin) cells after reduction
    pub cells: usize,
}

/// Result of a panel build
#[derive(Debug, Clone)]
pub struct PanelBuild {
    pub panel: Panel,
    pub variables: Vec<VariableReport>,
    pub coverage: CoverageReport,
}

/// Reusable panel processor holding the grid, time rules and cohort
#[derive(Debug, Clone)]
pub struct PanelProcessor {
    grid: BinGrid,
    normalizer: TimeNormalizer,
    cohort: CohortConfig,
    parallel: bool,
}

impl Default for PanelProcessor {
    fn default() -> Self {
        Self {
            grid: BinGrid::default(),
            normalizer: TimeNormalizer::default(),
            cohort: CohortConfig::default(),
            parallel: false,
        }
    }
}

impl PanelProcessor {
    /// Create a processor for a grid; fails on an invalid grid
    pub fn new(grid: &GridConfig) -> Result<Self, PanelError> {
        Ok(Self {
            grid: BinGrid::from_config(grid)?,
            normalizer: TimeNormalizer::new(grid.offset_unit_threshold),
            ..Default::default()
        })
    }

    pub fn from_config(config: &PanelConfig) -> Result<Self, PanelError> {
        Ok(Self::new(&config.grid)?
            .with_cohort(config.cohort.clone())
            .with_parallel(config.parallel))
    }

    pub fn with_cohort(mut self, cohort: CohortConfig) -> Self {
        self.cohort = cohort;
        self
    }

    /// Reduce variables on the rayon pool
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn grid(&self) -> &BinGrid {
        &self.grid
    }

    pub fn normalizer(&self) -> &TimeNormalizer {
        &self.normalizer
    }

    fn resolver(&self) -> SchemaResolver {
        SchemaResolver::with_preferred_id(self.cohort.preferred_id_column())
    }

    /// Load the roster; any failure here is fatal for the run
    pub fn load_roster(&self, source: &dyn TableSource) -> Result<Roster, PanelError> {
        let table = source.load()?;
        Roster::from_table(&table, &self.cohort)
    }

    /// Load, normalize, bin and reduce one variable
    ///
    /// Never fails: an unreadable or unusable source degrades to an empty
    /// mapping with a `Failed` status.
    pub fn process_variable(
        &self,
        input: &VariableInput,
        roster: &Roster,
    ) -> (VariableReport, ReducedVariable) {
        let source = input.source.describe();
        info!("Processing {} <- {}", input.name, source);

        let result = input
            .source
            .load()
            .and_then(|table| self.reduce_table(&input.name, &table, roster));

        match result {
            Ok((reduced, semantics, stats)) => {
                info!(
                    "{}: {} records read, {} binned, {} dropped, {} cells ({})",
                    input.name,
                    stats.records_read,
                    stats.binned,
                    stats.dropped(),
                    reduced.len(),
                    semantics.describe()
                );
                if semantics == TimeSemantics::Absolute
                    && stats.missing_t0 > 0
                    && roster.anchored_count() == 0
                {
                    warn!(
                        "{}: source holds absolute timestamps but the roster has no t0; {} records dropped",
                        input.name, stats.missing_t0
                    );
                }
                let report = VariableReport {
                    name: input.name.clone(),
                    source,
                    status: VariableStatus::Loaded,
                    semantics: Some(semantics),
                    stats,
                    cells: reduced.len(),
                };
                (report, reduced)
            }
            Err(e) => {
                warn!(
                    "Failed to process {}: {}. Using all-missing placeholder.",
                    input.name, e
                );
                let report = VariableReport {
                    name: input.name.clone(),
                    source,
                    status: VariableStatus::Failed {
                        reason: e.to_string(),
                    },
                    semantics: None,
                    stats: DropStats::default(),
                    cells: 0,
                };
                (report, ReducedVariable::new())
            }
        }
    }

    /// Run stages 2-4 over an already-loaded table
    pub fn reduce_table(
        &self,
        variable: &str,
        table: &RawTable,
        roster: &Roster,
    ) -> Result<(ReducedVariable, TimeSemantics, DropStats), PanelError> {
        if table.is_empty() {
            return Err(PanelError::EmptyTable(table.name.clone()));
        }

        let columns = self.resolver().resolve(table, variable)?;

        let patients: Vec<Option<PatientId>> = table
            .column(columns.id)
            .into_iter()
            .map(PatientId::parse)
            .collect();
        let positions: Vec<Option<usize>> = patients
            .iter()
            .map(|p| p.as_ref().and_then(|id| roster.position(id)))
            .collect();
        let anchors: Vec<_> = positions
            .iter()
            .map(|pos| pos.and_then(|p| roster.anchor(p)))
            .collect();

        let times = self.normalizer.normalize(
            table.header(columns.time),
            &table.column(columns.time),
            &anchors,
        )?;

        let mut stats = DropStats {
            records_read: table.len() + table.unreadable_rows,
            unreadable_record: table.unreadable_rows,
            ..Default::default()
        };
        let mut reduced = ReducedVariable::new();

        for row in 0..table.len() {
            if patients[row].is_none() {
                stats.missing_patient_id += 1;
                continue;
            }
            let Some(patient) = positions[row] else {
                stats.unknown_patient += 1;
                continue;
            };
            let relative_hours = match times.hours[row] {
                Ok(h) => h,
                Err(TimeDrop::Unparsable) => {
                    stats.unparsable_time += 1;
                    continue;
                }
                Err(TimeDrop::MissingAnchor) => {
                    stats.missing_t0 += 1;
                    continue;
                }
            };
            let Some(bin) = self.grid.assign(relative_hours) else {
                stats.out_of_window += 1;
                continue;
            };
            let Some(value) = crate::normalizer::parse_number(table.cell(row, columns.value))
            else {
                stats.unparsable_value += 1;
                continue;
            };

            stats.binned += 1;
            reduced.offer(BinnedObservation {
                patient,
                bin,
                relative_hours,
                value,
            });
        }

        Ok((reduced, times.semantics, stats))
    }

    /// Reduce every variable, then join them onto the skeleton
    ///
    /// Variables are independent; with `parallel` they are reduced
    /// concurrently and collected back in input order before the join.
    pub fn build(
        &self,
        roster: &Roster,
        variables: &[VariableInput],
    ) -> Result<PanelBuild, PanelError> {
        // Fail on an empty roster before touching any source
        let mut builder = SkeletonBuilder::new(roster, self.grid)?;

        let outcomes: Vec<(VariableReport, ReducedVariable)> = if self.parallel {
            variables
                .par_iter()
                .map(|input| self.process_variable(input, roster))
                .collect()
        } else {
            variables
                .iter()
                .map(|input| self.process_variable(input, roster))
                .collect()
        };

        for (report, reduced) in &outcomes {
            builder.add_variable(&report.name, reduced);
        }
        let panel = builder.build();
        let coverage = CoverageReporter::report(&panel);

        info!(
            "Panel built: {} patients x {} bins = {} rows, {} variables",
            panel.patients().len(),
            panel.grid().len(),
            panel.row_count(),
            outcomes.len()
        );

        Ok(PanelBuild {
            panel,
            variables: outcomes.into_iter().map(|(report, _)| report).collect(),
            coverage,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CohortPreset;
    use pretty_assertions::assert_eq;

    fn grid(start: f64, end: f64) -> GridConfig {
        GridConfig {
            window_start_hours: start,
            window_end_hours: end,
            ..Default::default()
        }
    }

    fn eicu_roster(ids: &[&str]) -> Roster {
        Roster::new(ids.iter().filter_map(|s| PatientId::parse(s)))
    }

    #[test]
    fn test_offset_source_end_to_end() {
        let processor = PanelProcessor::new(&grid(8.0, 14.0)).unwrap();
        let roster = eicu_roster(&["1", "2"]);
        let albumin = RawTable::from_rows(
            "albumin",
            &["patientunitstayid", "labresultoffset", "labresult"],
            &[
                &["1", "9", "3.5"],
                &["1", "11", "3.8"],
                &["2", "13.5", "4.0"],
                &["2", "-13", "4.2"],
            ],
        );

        let build = processor
            .build(&roster, &[VariableInput::new("Albumin", albumin)])
            .unwrap();

        assert_eq!(build.panel.row_count(), 6);
        assert_eq!(build.panel.cell("Albumin", 0, 0).unwrap().value, Some(3.5));
        assert_eq!(build.panel.cell("Albumin", 0, 1).unwrap().value, Some(3.8));
        assert!(!build.panel.cell("Albumin", 1, 0).unwrap().observed);
        // 13.5 and |-13| share bin 14; 13.5 is the larger signed value
        assert_eq!(build.panel.cell("Albumin", 1, 2).unwrap().value, Some(4.0));

        let cov = build.coverage.get("Albumin").unwrap();
        assert_eq!((cov.covered, cov.total), (2, 2));
        assert_eq!(cov.percent, 100.0);
    }

    #[test]
    fn test_drop_accounting() {
        let processor = PanelProcessor::new(&grid(8.0, 14.0)).unwrap();
        let roster = eicu_roster(&["1"]);
        let table = RawTable::from_rows(
            "potassium",
            &["patientunitstayid", "offset", "value"],
            &[
                &["1", "10", "4.1"],
                &["", "10", "4.1"],
                &["9", "10", "4.1"],
                &["1", "soon", "4.1"],
                &["1", "2", "4.1"],
                &["1", "12", "hemolyzed"],
            ],
        );

        let (reduced, _, stats) = processor.reduce_table("Potassium", &table, &roster).unwrap();
        assert_eq!(
            stats,
            DropStats {
                records_read: 6,
                unreadable_record: 0,
                missing_patient_id: 1,
                unknown_patient: 1,
                unparsable_time: 1,
                missing_t0: 0,
                out_of_window: 1,
                unparsable_value: 1,
                binned: 1,
            }
        );
        assert_eq!(reduced.len(), 1);
    }

    #[test]
    fn test_skipped_records_are_counted_not_fatal() {
        let processor = PanelProcessor::new(&grid(8.0, 14.0)).unwrap();
        let roster = eicu_roster(&["1"]);
        let mut table = RawTable::from_rows(
            "sodium",
            &["patientunitstayid", "offset", "value"],
            &[&["1", "9", "140"]],
        );
        table.unreadable_rows = 2;

        let (reduced, _, stats) = processor.reduce_table("Sodium", &table, &roster).unwrap();
        assert_eq!(stats.records_read, 3);
        assert_eq!(stats.unreadable_record, 2);
        assert_eq!(stats.dropped() + stats.binned, stats.records_read);
        assert_eq!(reduced.get(0, 0), Some(140.0));
    }

    #[test]
    fn test_absolute_source_uses_roster_t0() {
        let cohort = CohortConfig {
            preset: Some(CohortPreset::MimicIv),
            ..Default::default()
        };
        let processor = PanelProcessor::new(&grid(8.0, 20.0))
            .unwrap()
            .with_cohort(cohort.clone());
        let base = RawTable::from_rows(
            "cohort",
            &["subject_id", "first_icu_intime"],
            &[&["100", "2150-01-01 00:00:00"], &["200", ""]],
        );
        let roster = processor.load_roster(&base).unwrap();

        let sodium = RawTable::from_rows(
            "sodium",
            &["subject_id", "charttime", "valuenum"],
            &[
                &["100", "2150-01-01 09:00:00", "140"],
                &["100", "2150-01-01 09:45:00", "141"],
                &["200", "2150-01-01 09:00:00", "135"],
            ],
        );

        let build = processor
            .build(&roster, &[VariableInput::new("Sodium", sodium)])
            .unwrap();

        let report = &build.variables[0];
        assert_eq!(report.semantics, Some(TimeSemantics::Absolute));
        assert_eq!(report.stats.missing_t0, 1);
        assert_eq!(build.panel.cell("Sodium", 0, 0).unwrap().value, Some(141.0));
        assert_eq!(build.coverage.get("Sodium").unwrap().covered, 1);
        assert_eq!(build.panel.row_count(), 2 * 6);
    }

    #[test]
    fn test_failed_variable_degrades_to_missing() {
        let processor = PanelProcessor::new(&grid(8.0, 14.0)).unwrap();
        let roster = eicu_roster(&["1", "2"]);
        let broken = RawTable::from_rows("hemoglobin", &["patientunitstayid", "value"], &[&["1", "12"]]);
        let good = RawTable::from_rows(
            "creatinine",
            &["patientunitstayid", "offset", "value"],
            &[&["2", "9", "1.2"]],
        );

        let build = processor
            .build(
                &roster,
                &[
                    VariableInput::new("Hemoglobin", broken),
                    VariableInput::new("Creatinine", good),
                ],
            )
            .unwrap();

        assert_eq!(build.panel.row_count(), 6);
        assert!(!build.variables[0].status.is_loaded());
        assert_eq!(build.panel.column("Hemoglobin").unwrap().observed_count(), 0);
        assert_eq!(build.panel.column("Creatinine").unwrap().observed_count(), 1);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let roster = eicu_roster(&["1", "2", "3"]);
        let make_inputs = || {
            (0..6)
                .map(|i| {
                    let rows: Vec<Vec<String>> = (0..30)
                        .map(|r| {
                            vec![
                                ((r % 3) + 1).to_string(),
                                (8 + (r * 7 + i) % 700).to_string(),
                                (r as f64 * 0.5 + i as f64).to_string(),
                            ]
                        })
                        .collect();
                    VariableInput::new(
                        format!("V{}", i),
                        RawTable::new(format!("v{}", i), &["pid", "hours", "value"], rows),
                    )
                })
                .collect::<Vec<_>>()
        };

        let sequential = PanelProcessor::default()
            .build(&roster, &make_inputs())
            .unwrap();
        let parallel = PanelProcessor::default()
            .with_parallel(true)
            .build(&roster, &make_inputs())
            .unwrap();

        assert_eq!(sequential.panel.columns(), parallel.panel.columns());
        assert_eq!(sequential.coverage, parallel.coverage);
    }

    #[test]
    fn test_empty_roster_fails_loudly() {
        let processor = PanelProcessor::default();
        let result = processor.build(&Roster::default(), &[]);
        assert!(matches!(result, Err(PanelError::EmptyRoster)));
    }

    #[test]
    fn test_build_panel_requires_roster_path() {
        let config = PanelConfig::default();
        assert!(matches!(build_panel(&config), Err(PanelError::Config(_))));
    }
}
