//! Panel encoding
//!
//! This module writes a finished panel as a wide CSV, reads such a CSV back
//! into a [`Panel`], and encodes the JSON run manifest that accompanies it.

use crate::bins::BinGrid;
use crate::config::DEFAULT_BIN_WIDTH_HOURS;
use crate::coverage::CoverageTriple;
use crate::error::PanelError;
use crate::normalizer::parse_number;
use crate::pipeline::PanelBuild;
use crate::skeleton::{Panel, PanelColumn};
use crate::types::{DropStats, PatientId, TimeSemantics, VariableStatus};
use crate::{PANEL_VERSION, PRODUCER_NAME};
use chrono::Utc;
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use uuid::Uuid;

/// Name of the identifier column in a written panel
pub const PATIENT_COLUMN: &str = "patient_id";

/// Name of the bin column in a written panel
pub const BIN_COLUMN: &str = "bin";

/// Suffix of each variable's observed-flag column
pub const OBSERVED_SUFFIX: &str = "_obs";

/// Wide CSV writer for panels
pub struct PanelEncoder;

impl PanelEncoder {
    /// `patient_id,bin,<Var>,<Var>_obs,...`
    pub fn header(panel: &Panel) -> Vec<String> {
        let mut header = vec![PATIENT_COLUMN.to_string(), BIN_COLUMN.to_string()];
        for name in panel.variables() {
            header.push(name.to_string());
            header.push(format!("{}{}", name, OBSERVED_SUFFIX));
        }
        header
    }

    /// Write the panel, one row per (patient, bin)
    pub fn write_csv<W: Write>(panel: &Panel, writer: W) -> Result<(), PanelError> {
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(Self::header(panel))?;

        for row in panel.rows() {
            let mut record = Vec::with_capacity(2 + row.cells.len() * 2);
            record.push(row.patient.to_string());
            record.push(row.bin_end_hours.to_string());
            for cell in &row.cells {
                record.push(cell.value.map(|v| v.to_string()).unwrap_or_default());
                record.push(if cell.observed { "1" } else { "0" }.to_string());
            }
            csv_writer.write_record(&record)?;
        }

        csv_writer.flush()?;
        Ok(())
    }

    pub fn write_csv_path(panel: &Panel, path: &Path) -> Result<(), PanelError> {
        let file = File::create(path)?;
        Self::write_csv(panel, BufWriter::new(file))
    }

    pub fn to_csv_string(panel: &Panel) -> Result<String, PanelError> {
        let mut buffer = Vec::new();
        Self::write_csv(panel, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| PanelError::Encoding(e.to_string()))
    }
}

/// Read a panel CSV back into a [`Panel`]
///
/// Patients keep their first-appearance order and bins are sorted
/// ascending. The file must hold exactly one row per (patient, bin).
pub fn read_panel_csv<R: Read>(reader: R) -> Result<Panel, PanelError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers: Vec<String> = csv_reader
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();
    let variables = panel_variables(&headers)?;

    let mut patients: Vec<PatientId> = Vec::new();
    let mut patient_index: HashMap<PatientId, usize> = HashMap::new();
    let mut records: Vec<(usize, f64, Vec<(Option<f64>, bool)>)> = Vec::new();

    for (line, record) in csv_reader.records().enumerate() {
        let record = record?;
        let row = line + 2;

        let patient = PatientId::parse(record.get(0).unwrap_or(""))
            .ok_or_else(|| PanelError::Encoding(format!("row {}: empty patient_id", row)))?;
        let position = *patient_index.entry(patient.clone()).or_insert_with(|| {
            patients.push(patient);
            patients.len() - 1
        });

        let bin = parse_number(record.get(1).unwrap_or(""))
            .ok_or_else(|| PanelError::Encoding(format!("row {}: unparsable bin", row)))?;

        let mut cells = Vec::with_capacity(variables.len());
        for idx in 0..variables.len() {
            let value_cell = record.get(2 + idx * 2).unwrap_or("");
            let value = if value_cell.is_empty() {
                None
            } else {
                Some(parse_number(value_cell).ok_or_else(|| {
                    PanelError::Encoding(format!(
                        "row {}: unparsable value '{}' for {}",
                        row, value_cell, variables[idx]
                    ))
                })?)
            };
            let observed = parse_flag(record.get(3 + idx * 2).unwrap_or("")).ok_or_else(|| {
                PanelError::Encoding(format!(
                    "row {}: observed flag for {} must be 0 or 1",
                    row, variables[idx]
                ))
            })?;
            cells.push((value, observed));
        }

        records.push((position, bin, cells));
    }

    if patients.is_empty() {
        return Err(PanelError::EmptyRoster);
    }

    let mut endpoints: Vec<f64> = records.iter().map(|(_, bin, _)| *bin).collect();
    endpoints.sort_by(|a, b| a.total_cmp(b));
    endpoints.dedup();
    let grid = infer_grid(&endpoints)?;

    let expected = patients.len() * grid.len();
    if records.len() != expected {
        return Err(PanelError::Encoding(format!(
            "panel has {} rows, expected {} patients x {} bins = {}",
            records.len(),
            patients.len(),
            grid.len(),
            expected
        )));
    }

    let mut columns: Vec<PanelColumn> = variables
        .iter()
        .map(|name| PanelColumn {
            name: name.clone(),
            values: vec![None; expected],
            observed: vec![false; expected],
        })
        .collect();
    let mut seen = vec![false; expected];

    for (patient, bin, cells) in records {
        let bin_idx = grid.index_of_endpoint(bin).ok_or_else(|| {
            PanelError::Encoding(format!("bin {} is not on the panel grid", bin))
        })?;
        let row = patient * grid.len() + bin_idx;
        if seen[row] {
            return Err(PanelError::Encoding(format!(
                "duplicate row for patient {} at bin {}",
                patients[patient], bin
            )));
        }
        seen[row] = true;
        for (column, (value, observed)) in columns.iter_mut().zip(cells) {
            column.values[row] = value;
            column.observed[row] = observed;
        }
    }

    Panel::from_columns(patients, grid, columns)
}

pub fn read_panel_csv_path(path: &Path) -> Result<Panel, PanelError> {
    let file = File::open(path)?;
    read_panel_csv(BufReader::new(file))
}

fn panel_variables(headers: &[String]) -> Result<Vec<String>, PanelError> {
    if headers.len() < 2 || headers[0] != PATIENT_COLUMN || headers[1] != BIN_COLUMN {
        return Err(PanelError::Encoding(format!(
            "panel header must start with '{},{}'",
            PATIENT_COLUMN, BIN_COLUMN
        )));
    }
    let rest = &headers[2..];
    if rest.len() % 2 != 0 {
        return Err(PanelError::Encoding(
            "every variable needs a value and an observed column".to_string(),
        ));
    }

    rest.chunks(2)
        .map(|pair| {
            let expected = format!("{}{}", pair[0], OBSERVED_SUFFIX);
            if pair[1] == expected {
                Ok(pair[0].clone())
            } else {
                Err(PanelError::Encoding(format!(
                    "expected column '{}', found '{}'",
                    expected, pair[1]
                )))
            }
        })
        .collect()
}

fn parse_flag(cell: &str) -> Option<bool> {
    match cell {
        "1" | "true" | "True" | "TRUE" => Some(true),
        "0" | "false" | "False" | "FALSE" | "" => Some(false),
        _ => None,
    }
}

/// Rebuild the grid from the distinct bin endpoints of a panel
fn infer_grid(endpoints: &[f64]) -> Result<BinGrid, PanelError> {
    let (first, last) = match (endpoints.first(), endpoints.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(PanelError::Encoding("panel has no bins".to_string())),
    };

    let width = if endpoints.len() > 1 {
        endpoints[1] - endpoints[0]
    } else {
        DEFAULT_BIN_WIDTH_HOURS.min(first)
    };

    let grid = BinGrid::new(first - width, last, width).map_err(|e| {
        PanelError::Encoding(format!("bins do not form a regular grid: {}", e))
    })?;

    if grid.len() != endpoints.len()
        || endpoints
            .iter()
            .enumerate()
            .any(|(idx, end)| grid.index_of_endpoint(*end) != Some(idx))
    {
        return Err(PanelError::Encoding(
            "bins are not evenly spaced".to_string(),
        ));
    }
    Ok(grid)
}

/// Producer block of a run manifest
#[derive(Debug, Clone, Serialize)]
pub struct ManifestProducer {
    pub name: String,
    pub version: String,
    pub run_id: String,
}

/// Grid block of a run manifest
#[derive(Debug, Clone, Serialize)]
pub struct ManifestGrid {
    pub window_start_hours: f64,
    pub window_end_hours: f64,
    pub bin_width_hours: f64,
    pub bins: usize,
}

/// Per-variable block of a run manifest
#[derive(Debug, Clone, Serialize)]
pub struct ManifestVariable {
    pub name: String,
    pub source: String,
    pub status: VariableStatus,
    pub semantics: Option<TimeSemantics>,
    pub stats: DropStats,
    pub cells: usize,
    pub coverage: Option<CoverageTriple>,
}

/// JSON record of one panel build
#[derive(Debug, Clone, Serialize)]
pub struct PanelManifest {
    pub producer: ManifestProducer,
    pub created_at_utc: String,
    pub grid: ManifestGrid,
    pub roster_size: usize,
    pub rows: usize,
    pub variables: Vec<ManifestVariable>,
}

/// Manifest encoder
pub struct ManifestEncoder {
    run_id: String,
}

impl Default for ManifestEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ManifestEncoder {
    /// Create an encoder with a fresh run ID
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_run_id(run_id: String) -> Self {
        Self { run_id }
    }

    pub fn encode(&self, build: &PanelBuild) -> PanelManifest {
        let grid = build.panel.grid();
        let coverage = build.coverage.as_map();

        PanelManifest {
            producer: ManifestProducer {
                name: PRODUCER_NAME.to_string(),
                version: PANEL_VERSION.to_string(),
                run_id: self.run_id.clone(),
            },
            created_at_utc: Utc::now().to_rfc3339(),
            grid: ManifestGrid {
                window_start_hours: grid.window_start(),
                window_end_hours: grid.window_end(),
                bin_width_hours: grid.width(),
                bins: grid.len(),
            },
            roster_size: build.panel.patients().len(),
            rows: build.panel.row_count(),
            variables: build
                .variables
                .iter()
                .map(|report| ManifestVariable {
                    name: report.name.clone(),
                    source: report.source.clone(),
                    status: report.status.clone(),
                    semantics: report.semantics,
                    stats: report.stats.clone(),
                    cells: report.cells,
                    coverage: coverage.get(&report.name).copied(),
                })
                .collect(),
        }
    }

    pub fn encode_to_json(&self, build: &PanelBuild) -> Result<String, PanelError> {
        let manifest = self.encode(build);
        Ok(serde_json::to_string_pretty(&manifest)?)
    }
}
