//! Coverage reporting
//!
//! A patient is covered for a variable when at least one of their bins is
//! observed. Coverage is a read-only summary of a finished [`Panel`].

use crate::skeleton::Panel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Coverage triple of one variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableCoverage {
    pub variable: String,
    pub covered: usize,
    pub total: usize,
    pub percent: f64,
}

/// `(covered, total, percent)` without the variable name
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoverageTriple {
    pub covered: usize,
    pub total: usize,
    pub percent: f64,
}

/// Coverage of every panel variable, in column order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    pub variables: Vec<VariableCoverage>,
}

/// Percentage of `covered` over `total`; 0 for an empty total
pub fn coverage_percent(covered: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    covered as f64 / total as f64 * 100.0
}

/// Coverage reporter over a finished panel
pub struct CoverageReporter;

impl CoverageReporter {
    pub fn report(panel: &Panel) -> CoverageReport {
        let total = panel.patients().len();
        let bins = panel.grid().len();

        let variables = panel
            .columns()
            .iter()
            .map(|column| {
                let covered = if bins == 0 {
                    0
                } else {
                    column
                        .observed
                        .chunks(bins)
                        .filter(|patient_bins| patient_bins.iter().any(|o| *o))
                        .count()
                };
                VariableCoverage {
                    variable: column.name.clone(),
                    covered,
                    total,
                    percent: coverage_percent(covered, total),
                }
            })
            .collect();

        CoverageReport { variables }
    }
}

impl CoverageReport {
    pub fn get(&self, variable: &str) -> Option<&VariableCoverage> {
        self.variables.iter().find(|v| v.variable == variable)
    }

    /// Variable name → triple, for direct serialization into logs or reports
    pub fn as_map(&self) -> BTreeMap<String, CoverageTriple> {
        self.variables
            .iter()
            .map(|v| {
                (
                    v.variable.clone(),
                    CoverageTriple {
                        covered: v.covered,
                        total: v.total,
                        percent: v.percent,
                    },
                )
            })
            .collect()
    }
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .variables
            .iter()
            .map(|v| v.variable.len())
            .max()
            .unwrap_or(8)
            .max(8);
        writeln!(f, "{:<width$}  {:>8}  {:>8}  {:>8}", "variable", "covered", "total", "percent")?;
        for v in &self.variables {
            writeln!(
                f,
                "{:<width$}  {:>8}  {:>8}  {:>7.2}%",
                v.variable, v.covered, v.total, v.percent
            )?;
        }
        Ok(())
    }
}
