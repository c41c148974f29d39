//! Skeleton construction
//!
//! The panel is the full roster × grid rectangle. Rows are never
//! materialised as keys: row `r` is patient `r / bins`, bin `r % bins`, and
//! each variable is a pair of dense columns indexed by `r`. Reduced
//! variables are left-joined onto that arena, so the row count is fixed
//! before any variable is looked at.

use crate::bins::BinGrid;
use crate::error::PanelError;
use crate::reducer::ReducedVariable;
use crate::roster::Roster;
use crate::types::PatientId;
use serde::Serialize;

/// One variable's value and observed columns
#[derive(Debug, Clone, PartialEq)]
pub struct PanelColumn {
    pub name: String,
    pub values: Vec<Option<f64>>,
    pub observed: Vec<bool>,
}

impl PanelColumn {
    fn missing(name: &str, rows: usize) -> Self {
        Self {
            name: name.to_string(),
            values: vec![None; rows],
            observed: vec![false; rows],
        }
    }

    /// Number of observed cells
    pub fn observed_count(&self) -> usize {
        self.observed.iter().filter(|o| **o).count()
    }
}

/// Value/observed pair of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PanelCell {
    pub value: Option<f64>,
    pub observed: bool,
}

/// One (patient, bin) row with a cell per variable
#[derive(Debug, Clone, PartialEq)]
pub struct PanelRow<'a> {
    pub patient: &'a PatientId,
    pub bin_end_hours: f64,
    pub cells: Vec<PanelCell>,
}

/// Finished patient × bin panel
#[derive(Debug, Clone)]
pub struct Panel {
    patients: Vec<PatientId>,
    grid: BinGrid,
    columns: Vec<PanelColumn>,
}

impl Panel {
    /// Assemble a panel from already-dense columns
    ///
    /// Every column must hold exactly `patients × bins` cells.
    pub fn from_columns(
        patients: Vec<PatientId>,
        grid: BinGrid,
        columns: Vec<PanelColumn>,
    ) -> Result<Self, PanelError> {
        if patients.is_empty() {
            return Err(PanelError::EmptyRoster);
        }
        let rows = patients.len() * grid.len();
        for column in &columns {
            if column.values.len() != rows || column.observed.len() != rows {
                return Err(PanelError::Encoding(format!(
                    "column '{}' has {} cells, expected {}",
                    column.name,
                    column.values.len(),
                    rows
                )));
            }
        }
        Ok(Self {
            patients,
            grid,
            columns,
        })
    }

    /// Always `patients × bins`
    pub fn row_count(&self) -> usize {
        self.patients.len() * self.grid.len()
    }

    pub fn patients(&self) -> &[PatientId] {
        &self.patients
    }

    pub fn grid(&self) -> &BinGrid {
        &self.grid
    }

    pub fn columns(&self) -> &[PanelColumn] {
        &self.columns
    }

    /// Variable names in column order
    pub fn variables(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&PanelColumn> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Row index of (patient position, bin index)
    pub fn row_index(&self, patient: usize, bin: usize) -> usize {
        patient * self.grid.len() + bin
    }

    /// Cell of `variable` at (patient position, bin index)
    pub fn cell(&self, variable: &str, patient: usize, bin: usize) -> Option<PanelCell> {
        let column = self.column(variable)?;
        if patient >= self.patients.len() || bin >= self.grid.len() {
            return None;
        }
        let row = self.row_index(patient, bin);
        Some(PanelCell {
            value: column.values[row],
            observed: column.observed[row],
        })
    }

    /// Row `idx` in patient-then-bin order
    pub fn row(&self, idx: usize) -> Option<PanelRow<'_>> {
        if idx >= self.row_count() {
            return None;
        }
        let bins = self.grid.len();
        Some(PanelRow {
            patient: &self.patients[idx / bins],
            bin_end_hours: self.grid.end_hours(idx % bins),
            cells: self
                .columns
                .iter()
                .map(|c| PanelCell {
                    value: c.values[idx],
                    observed: c.observed[idx],
                })
                .collect(),
        })
    }

    /// All rows, ordered by roster position then ascending bin
    pub fn rows(&self) -> impl Iterator<Item = PanelRow<'_>> + '_ {
        (0..self.row_count()).filter_map(move |idx| self.row(idx))
    }
}

/// Builder that left-joins reduced variables onto the skeleton
pub struct SkeletonBuilder<'a> {
    roster: &'a Roster,
    grid: BinGrid,
    columns: Vec<PanelColumn>,
}

impl<'a> SkeletonBuilder<'a> {
    /// Start a skeleton; an empty roster or grid is a configuration error
    pub fn new(roster: &'a Roster, grid: BinGrid) -> Result<Self, PanelError> {
        if roster.is_empty() {
            return Err(PanelError::EmptyRoster);
        }
        if grid.is_empty() {
            return Err(PanelError::Config("bin grid has no bins".to_string()));
        }
        Ok(Self {
            roster,
            grid,
            columns: Vec::new(),
        })
    }

    fn rows(&self) -> usize {
        self.roster.len() * self.grid.len()
    }

    /// Left-join one reduced variable
    pub fn add_variable(&mut self, name: &str, reduced: &ReducedVariable) -> &mut Self {
        let bins = self.grid.len();
        let mut column = PanelColumn::missing(name, self.rows());

        for (key, value) in reduced.sorted_cells() {
            if key.patient >= self.roster.len() || key.bin >= bins {
                debug_assert!(false, "reduced cell {:?} outside skeleton", key);
                continue;
            }
            let row = key.patient * bins + key.bin;
            column.values[row] = Some(value);
            column.observed[row] = true;
        }

        self.columns.push(column);
        self
    }

    /// Add a variable with no data at all
    pub fn add_missing(&mut self, name: &str) -> &mut Self {
        let column = PanelColumn::missing(name, self.rows());
        self.columns.push(column);
        self
    }

    pub fn build(self) -> Panel {
        Panel {
            patients: self.roster.ids().to_vec(),
            grid: self.grid,
            columns: self.columns,
        }
    }
}
