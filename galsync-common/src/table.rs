//! Tabular (CSV) I/O
//!
//! A [`Table`] is a header row plus string rows. Every row is padded or
//! truncated to the header width on load so column lookups never go out
//! of bounds. Cells are kept as strings; numeric interpretation is left to
//! the caller.

use crate::{Error, Result};
use std::io::Write;
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// In-memory table of string cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Create an empty table with the given header
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Read a CSV file with a header row
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(path)?;

        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();
        let width = headers.len();

        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(width, String::new());
            rows.push(row);
        }

        Ok(Self { headers, rows })
    }

    /// Write the table as CSV prefixed with a UTF-8 byte order mark
    ///
    /// Spreadsheet applications need the mark to detect UTF-8 in CSV files.
    pub fn save_with_bom(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(UTF8_BOM)?;
        let mut writer = csv::Writer::from_writer(file);
        self.write_records(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    fn write_records<W: Write>(&self, writer: &mut csv::Writer<W>) -> Result<()> {
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of the column with exactly this header
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// First header present from a priority-ordered candidate list
    pub fn find_column<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates.iter().copied().find(|c| self.has_column(c))
    }

    /// Fail with [`Error::Schema`] naming every missing column
    pub fn require_columns(&self, names: &[&str]) -> Result<()> {
        let missing: Vec<&str> = names
            .iter()
            .copied()
            .filter(|n| !self.has_column(n))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Schema(format!(
                "missing column(s) {:?}; available: {:?}",
                missing, self.headers
            )))
        }
    }

    /// Cell value by row index and column name
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let idx = self.column_index(column)?;
        self.rows.get(row)?.get(idx).map(String::as_str)
    }

    /// Append a row, padding or truncating it to the header width
    pub fn push_row(&mut self, mut row: Vec<String>) {
        row.resize(self.headers.len(), String::new());
        self.rows.push(row);
    }

    /// Remove every column whose header matches the predicate
    pub fn drop_columns<F: Fn(&str) -> bool>(&mut self, predicate: F) -> Vec<String> {
        let keep: Vec<bool> = self.headers.iter().map(|h| !predicate(h)).collect();
        let dropped = self
            .headers
            .iter()
            .zip(&keep)
            .filter(|(_, k)| !**k)
            .map(|(h, _)| h.clone())
            .collect();

        self.headers = retain_by_mask(std::mem::take(&mut self.headers), &keep);
        for row in &mut self.rows {
            *row = retain_by_mask(std::mem::take(row), &keep);
        }
        dropped
    }

    /// Append a column filled from `values` (missing values become empty)
    pub fn add_column(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.headers.push(name.into());
        let mut values = values.into_iter();
        for row in &mut self.rows {
            row.push(values.next().unwrap_or_default());
        }
    }
}

fn retain_by_mask(items: Vec<String>, keep: &[bool]) -> Vec<String> {
    items
        .into_iter()
        .zip(keep)
        .filter(|(_, k)| **k)
        .map(|(item, _)| item)
        .collect()
}
