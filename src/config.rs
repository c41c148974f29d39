//! Panel configuration
//!
//! A run is described by a [`PanelConfig`], usually loaded from a TOML file:
//!
//! ```toml
//! parallel = false
//!
//! [grid]
//! window_start_hours = 8
//! window_end_hours = 720
//! bin_width_hours = 2
//! offset_unit_threshold = 500
//!
//! [cohort]
//! preset = "mimic-iv"
//! roster = "subject_level_merged_firstICU.csv"
//!
//! [[variables]]
//! name = "Albumin"
//! source = "albumin_50862_clean.csv"
//! ```
//!
//! Every key is optional except the roster path and the variable entries.

use crate::error::PanelError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Default start of the absolute binning window (hours from t0)
pub const DEFAULT_WINDOW_START_HOURS: f64 = 8.0;

/// Default end of the absolute binning window (30 days, exclusive)
pub const DEFAULT_WINDOW_END_HOURS: f64 = 720.0;

/// Default bin width in hours
pub const DEFAULT_BIN_WIDTH_HOURS: f64 = 2.0;

/// Median magnitude above which an offset column is read as minutes
pub const DEFAULT_OFFSET_UNIT_THRESHOLD: f64 = 500.0;

/// Root configuration of a panel build
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PanelConfig {
    /// Temporal grid and unit inference settings
    #[serde(default)]
    pub grid: GridConfig,

    /// Base cohort: roster table, identifier column and t0 column
    #[serde(default)]
    pub cohort: CohortConfig,

    /// Variables to bin, in output column order
    #[serde(default)]
    pub variables: Vec<VariableSpec>,

    /// Reduce variables concurrently
    #[serde(default)]
    pub parallel: bool,
}

/// Temporal grid settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub window_start_hours: f64,
    pub window_end_hours: f64,
    pub bin_width_hours: f64,
    pub offset_unit_threshold: f64,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            window_start_hours: DEFAULT_WINDOW_START_HOURS,
            window_end_hours: DEFAULT_WINDOW_END_HOURS,
            bin_width_hours: DEFAULT_BIN_WIDTH_HOURS,
            offset_unit_threshold: DEFAULT_OFFSET_UNIT_THRESHOLD,
        }
    }
}

/// Known base cohorts and their identifier / anchor columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CohortPreset {
    /// eICU: unit stays, sources carry relative offsets
    Eicu,
    /// MIMIC-III: subjects anchored at the first ICU admission
    MimicIii,
    /// MIMIC-IV: subjects anchored at the first ICU admission
    MimicIv,
}

impl CohortPreset {
    pub fn id_column(&self) -> &'static str {
        match self {
            CohortPreset::Eicu => "patientunitstayid",
            CohortPreset::MimicIii => "SUBJECT_ID",
            CohortPreset::MimicIv => "subject_id",
        }
    }

    pub fn t0_column(&self) -> Option<&'static str> {
        match self {
            CohortPreset::Eicu => None,
            CohortPreset::MimicIii => Some("FIRST_ICU_INTIME"),
            CohortPreset::MimicIv => Some("first_icu_intime"),
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "eicu" => Some(CohortPreset::Eicu),
            "mimic-iii" | "mimic3" | "mimiciii" => Some(CohortPreset::MimicIii),
            "mimic-iv" | "mimic4" | "mimiciv" => Some(CohortPreset::MimicIv),
            _ => None,
        }
    }
}

/// Base cohort settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortConfig {
    /// Dataset preset supplying default column names
    pub preset: Option<CohortPreset>,
    /// Roster table path
    pub roster: Option<PathBuf>,
    /// Identifier column, overriding the preset
    pub id_column: Option<String>,
    /// t0 column, overriding the preset
    pub t0_column: Option<String>,
}

impl CohortConfig {
    /// Identifier column the schema resolver should try first
    pub fn preferred_id_column(&self) -> Option<&str> {
        self.id_column
            .as_deref()
            .or_else(|| self.preset.map(|p| p.id_column()))
    }

    /// Column holding each patient's t0, if the cohort has one
    pub fn resolved_t0_column(&self) -> Option<&str> {
        self.t0_column
            .as_deref()
            .or_else(|| self.preset.and_then(|p| p.t0_column()))
    }
}

/// One variable and where its long-format source lives
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub source: PathBuf,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Parse a `NAME=PATH` command-line entry
    pub fn parse_assignment(entry: &str) -> Result<Self, PanelError> {
        match entry.split_once('=') {
            Some((name, path)) if !name.trim().is_empty() && !path.trim().is_empty() => {
                Ok(Self::new(name.trim(), path.trim()))
            }
            _ => Err(PanelError::Config(format!(
                "expected NAME=PATH for variable, got '{}'",
                entry
            ))),
        }
    }
}

impl PanelConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, PanelError> {
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&content)?;
        config.resolve_relative_paths(path.parent().unwrap_or_else(|| Path::new("")));
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, PanelError> {
        Ok(toml::from_str(content)?)
    }

    /// Make relative source paths relative to the config file's directory
    fn resolve_relative_paths(&mut self, base: &Path) {
        if base.as_os_str().is_empty() {
            return;
        }
        if let Some(roster) = self.cohort.roster.as_mut() {
            if roster.is_relative() {
                *roster = base.join(&*roster);
            }
        }
        for var in &mut self.variables {
            if var.source.is_relative() {
                var.source = base.join(&var.source);
            }
        }
    }

    /// Check grid parameters and variable names
    pub fn validate(&self) -> Result<(), PanelError> {
        self.grid.validate()?;

        let mut seen = HashSet::new();
        for var in &self.variables {
            if var.name.trim().is_empty() {
                return Err(PanelError::Config("variable name is empty".to_string()));
            }
            if !seen.insert(var.name.as_str()) {
                return Err(PanelError::Config(format!(
                    "variable '{}' is configured more than once",
                    var.name
                )));
            }
        }

        Ok(())
    }
}

impl GridConfig {
    /// Number of bins in `[start, end)` for this grid
    pub fn bin_count(&self) -> usize {
        ((self.window_end_hours - self.window_start_hours) / self.bin_width_hours).round() as usize
    }

    pub fn validate(&self) -> Result<(), PanelError> {
        let values = [
            self.window_start_hours,
            self.window_end_hours,
            self.bin_width_hours,
            self.offset_unit_threshold,
        ];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(PanelError::Config("grid values must be finite".to_string()));
        }
        if self.bin_width_hours <= 0.0 {
            return Err(PanelError::Config(format!(
                "bin_width_hours must be positive, got {}",
                self.bin_width_hours
            )));
        }
        if self.window_start_hours < 0.0 {
            return Err(PanelError::Config(format!(
                "window_start_hours must not be negative, got {}",
                self.window_start_hours
            )));
        }
        if self.window_end_hours <= self.window_start_hours {
            return Err(PanelError::Config(format!(
                "window_end_hours ({}) must exceed window_start_hours ({})",
                self.window_end_hours, self.window_start_hours
            )));
        }

        let span = (self.window_end_hours - self.window_start_hours) / self.bin_width_hours;
        if (span - span.round()).abs() > 1e-9 {
            return Err(PanelError::Config(format!(
                "window [{}, {}) is not a whole number of {}h bins",
                self.window_start_hours, self.window_end_hours, self.bin_width_hours
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
            parallel = true

            [grid]
            window_start_hours = 8
            window_end_hours = 14
            bin_width_hours = 2
            offset_unit_threshold = 400

            [cohort]
            preset = "mimic-iii"
            roster = "cohort.csv"

            [[variables]]
            name = "Albumin"
            source = "albumin.csv"

            [[variables]]
            name = "Sodium"
            source = "sodium.csv"
        "#;

        let config = PanelConfig::from_toml_str(toml).unwrap();
        assert!(config.parallel);
        assert_eq!(config.grid.window_end_hours, 14.0);
        assert_eq!(config.grid.offset_unit_threshold, 400.0);
        assert_eq!(config.cohort.preset, Some(CohortPreset::MimicIii));
        assert_eq!(config.cohort.preferred_id_column(), Some("SUBJECT_ID"));
        assert_eq!(config.cohort.resolved_t0_column(), Some("FIRST_ICU_INTIME"));
        assert_eq!(config.variables.len(), 2);
        assert_eq!(config.variables[1].name, "Sodium");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = PanelConfig::from_toml_str("").unwrap();
        assert_eq!(config.grid, GridConfig::default());
        assert_eq!(config.grid.bin_count(), 356);
        assert!(!config.parallel);
        assert!(config.variables.is_empty());
    }

    #[test]
    fn test_override_preset_columns() {
        let cohort = CohortConfig {
            preset: Some(CohortPreset::MimicIv),
            t0_column: Some("surgery_time".to_string()),
            ..Default::default()
        };
        assert_eq!(cohort.preferred_id_column(), Some("subject_id"));
        assert_eq!(cohort.resolved_t0_column(), Some("surgery_time"));

        let eicu = CohortConfig {
            preset: Some(CohortPreset::Eicu),
            ..Default::default()
        };
        assert_eq!(eicu.resolved_t0_column(), None);
    }

    #[test]
    fn test_invalid_grids() {
        let bad_width = GridConfig {
            bin_width_hours: 0.0,
            ..Default::default()
        };
        assert!(bad_width.validate().is_err());

        let inverted = GridConfig {
            window_start_hours: 20.0,
            window_end_hours: 10.0,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let ragged = GridConfig {
            window_start_hours: 8.0,
            window_end_hours: 13.0,
            bin_width_hours: 2.0,
            ..Default::default()
        };
        assert!(ragged.validate().is_err());
    }

    #[test]
    fn test_duplicate_variables_rejected() {
        let config = PanelConfig {
            variables: vec![
                VariableSpec::new("Albumin", "a.csv"),
                VariableSpec::new("Albumin", "b.csv"),
            ],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_variable_assignment() {
        let spec = VariableSpec::parse_assignment("Potassium=/data/k.csv").unwrap();
        assert_eq!(spec.name, "Potassium");
        assert_eq!(spec.source, PathBuf::from("/data/k.csv"));
        assert!(VariableSpec::parse_assignment("Potassium").is_err());
        assert!(VariableSpec::parse_assignment("=x.csv").is_err());
    }

    #[test]
    fn test_preset_names() {
        assert_eq!(CohortPreset::parse("eICU"), Some(CohortPreset::Eicu));
        assert_eq!(CohortPreset::parse("mimic_iv"), Some(CohortPreset::MimicIv));
        assert_eq!(CohortPreset::parse("unknown"), None);
    }
}
