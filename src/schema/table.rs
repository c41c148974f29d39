//! In-memory source table
//!
//! Sources are read as text: every cell stays a string until the stage that
//! needs it decides how to parse it, so a malformed cell costs one record
//! instead of the whole file.

use crate::error::PanelError;
use log::{debug, warn};
use std::io::Read;

/// A long-format table with a header row and string cells
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// Human-readable origin (file path or label)
    pub name: String,
    /// Column names, as written in the source
    pub headers: Vec<String>,
    /// Data rows; short rows are padded with empty cells on access
    pub rows: Vec<Vec<String>>,
    /// Records the reader skipped because they could not be decoded
    pub unreadable_rows: usize,
}

impl RawTable {
    /// Build a table from literal headers and rows
    pub fn new(name: impl Into<String>, headers: &[&str], rows: Vec<Vec<String>>) -> Self {
        Self {
            name: name.into(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows,
            unreadable_rows: 0,
        }
    }

    /// Convenience constructor from string slices
    pub fn from_rows(name: impl Into<String>, headers: &[&str], rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        Self::new(name, headers, rows)
    }

    /// Read a comma-separated table with a header row
    ///
    /// Cells that are not valid UTF-8 are decoded lossily. A record the
    /// reader cannot parse is skipped and counted in `unreadable_rows`;
    /// only an I/O failure aborts the table.
    pub fn from_csv_reader<R: Read>(name: impl Into<String>, reader: R) -> Result<Self, PanelError> {
        let name = name.into();
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .byte_headers()?
            .iter()
            .map(|h| decode_cell(h).trim_start_matches('\u{feff}').to_string())
            .collect();

        let mut rows = Vec::new();
        let mut unreadable_rows = 0usize;
        let mut lossy_rows = 0usize;
        for record in csv_reader.byte_records() {
            let record = match record {
                Ok(record) => record,
                Err(e) if e.is_io_error() => return Err(e.into()),
                Err(e) => {
                    debug!("{}: skipping record: {}", name, e);
                    unreadable_rows += 1;
                    continue;
                }
            };
            if record.iter().any(|c| std::str::from_utf8(c).is_err()) {
                lossy_rows += 1;
            }
            rows.push(record.iter().map(decode_cell).collect());
        }

        if lossy_rows > 0 {
            warn!("{}: {} records contain invalid UTF-8; decoded lossily", name, lossy_rows);
        }

        Ok(Self {
            name,
            headers,
            rows,
            unreadable_rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at (`row`, `column`), empty when the row is short
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(String::as_str)
            .unwrap_or("")
    }

    /// All cells of one column, in row order
    pub fn column(&self, column: usize) -> Vec<&str> {
        (0..self.rows.len()).map(|row| self.cell(row, column)).collect()
    }

    /// Header name of a column
    pub fn header(&self, column: usize) -> &str {
        self.headers.get(column).map(String::as_str).unwrap_or("")
    }
}

fn decode_cell(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
