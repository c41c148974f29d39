//! Clinical Panel - Patient × time-bin panels from long-format clinical tables
//!
//! A panel is built through a deterministic pipeline: roster loading →
//! time normalization → bin assignment → per-bin reduction → skeleton join
//! → coverage reporting.
//!
//! ## Modules
//!
//! - **Sources**: CSV tables (eICU offsets, MIMIC-III/IV timestamps) behind [`adapters::TableSource`]
//! - **Pipeline**: [`PanelProcessor`] and [`build_panel`] turn sources into a [`Panel`]
//! - **Outputs**: wide CSV, panel CSV reader and a JSON run manifest in [`encoder`]

pub mod adapters;
pub mod bins;
pub mod config;
pub mod coverage;
pub mod encoder;
pub mod error;
pub mod normalizer;
pub mod pipeline;
pub mod reducer;
pub mod roster;
pub mod schema;
pub mod skeleton;
pub mod types;

pub use bins::BinGrid;
pub use config::{CohortConfig, CohortPreset, GridConfig, PanelConfig, VariableSpec};
pub use coverage::{CoverageReport, CoverageReporter, VariableCoverage};
pub use encoder::{read_panel_csv, ManifestEncoder, PanelEncoder, PanelManifest};
pub use error::PanelError;
pub use pipeline::{build_panel, PanelBuild, PanelProcessor, VariableInput, VariableReport};
pub use roster::Roster;
pub use skeleton::Panel;

/// Version recorded in every run manifest
pub const PANEL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for run manifests
pub const PRODUCER_NAME: &str = "clinical-panel";
