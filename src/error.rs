//! Error types for Clinical Panel

use thiserror::Error;

/// Errors that can occur while building a panel
#[derive(Debug, Error)]
pub enum PanelError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Column not found in {table}: {column}")]
    MissingColumn { table: String, column: String },

    #[error("Table has no data rows: {0}")]
    EmptyTable(String),

    #[error("Roster is empty: no patient identifiers could be loaded")]
    EmptyRoster,

    #[error("Time column error: {0}")]
    TimeColumn(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}
