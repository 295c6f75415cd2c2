//! Spreadsheet maintenance utilities
//!
//! Small table-to-table transforms used around the matching run: merging
//! alias lists into a main table, filtering matches by score and extracting
//! low-confidence rows that carry aliases for manual review.

pub mod alias;
pub mod score_filter;

pub use alias::{extract_alias_rows, merge_alias_files, merge_aliases, process_alias_file};
pub use score_filter::{filter_by_score, filter_file};

use chrono::{DateTime, TimeZone};
use galsync_common::{Error, Result};
use std::path::{Path, PathBuf};

/// Characters that separate aliases inside one cell
pub const ALIAS_DELIMITERS: [char; 7] = ['、', ',', '，', ';', ':', '：', '|'];

/// Prefix of the numbered alias columns (`别名1`, `别名2`, ...)
pub const ALIAS_PREFIX: &str = "别名";

/// Split an alias cell on any delimiter, dropping blank pieces
pub fn split_aliases(cell: &str) -> Vec<String> {
    cell.split(|c: char| ALIAS_DELIMITERS.contains(&c))
        .map(str::trim)
        .filter(|alias| !alias.is_empty())
        .map(str::to_string)
        .collect()
}

/// Lay out per-row alias lists as `别名1..N` columns
///
/// Returns the column names and, per column, one value per row. Rows with
/// fewer aliases are padded with empty cells.
pub(crate) fn alias_columns(per_row: &[Vec<String>]) -> Vec<(String, Vec<String>)> {
    let width = per_row.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|col| {
            let values = per_row
                .iter()
                .map(|aliases| aliases.get(col).cloned().unwrap_or_default())
                .collect();
            (format!("{}{}", ALIAS_PREFIX, col + 1), values)
        })
        .collect()
}

/// `%Y%m%d_%H%M%S`, as used in generated file names
pub fn timestamp<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    now.format("%Y%m%d_%H%M%S").to_string()
}

/// `<dir>/<stem><suffix>.csv` next to `input`
pub(crate) fn sibling_csv(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    input.with_file_name(format!("{}{}.csv", stem, suffix))
}

/// Reject NaN and infinite score cut-offs
pub(crate) fn check_cutoff(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "{} must be a finite number, got {}",
            name, value
        )))
    }
}

/// Numeric value of a score cell; blanks and garbage are `None`
pub(crate) fn parse_score(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|s| !s.is_nan())
}
