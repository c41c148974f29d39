//! CSV file adapter
//!
//! Reads a comma-separated export with a header row from disk.

use crate::error::PanelError;
use crate::schema::RawTable;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use super::TableSource;

/// CSV file on disk
#[derive(Debug, Clone)]
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TableSource for CsvFileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn load(&self) -> Result<RawTable, PanelError> {
        let file = File::open(&self.path)?;
        RawTable::from_csv_reader(self.describe(), BufReader::new(file))
    }
}
