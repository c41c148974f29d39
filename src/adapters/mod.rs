//! Source table adapters
//!
//! This module provides adapters that load a roster or variable table into a
//! [`RawTable`], independent of where the table lives.

mod csv_file;

pub use csv_file::CsvFileSource;

use crate::error::PanelError;
use crate::schema::RawTable;

/// Trait for table sources
pub trait TableSource: Send + Sync {
    /// Short description used in logs and the run manifest
    fn describe(&self) -> String;

    /// Load the whole table into memory
    fn load(&self) -> Result<RawTable, PanelError>;
}

impl TableSource for RawTable {
    fn describe(&self) -> String {
        self.name.clone()
    }

    fn load(&self) -> Result<RawTable, PanelError> {
        Ok(self.clone())
    }
}
