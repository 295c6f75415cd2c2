//! Keep matches scoring above a threshold

use super::{check_cutoff, parse_score, sibling_csv, timestamp};
use chrono::{DateTime, Local};
use galsync_common::{Result, Table};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const DEFAULT_SCORE_THRESHOLD: f64 = 0.5;

/// Rows whose numeric `score` is strictly greater than `threshold`
pub fn filter_by_score(table: &Table, threshold: f64) -> Result<Table> {
    check_cutoff("threshold", threshold)?;
    table.require_columns(&["score"])?;

    let mut filtered = Table::new(table.headers.clone());
    for row in 0..table.len() {
        let score = table.get(row, "score").and_then(parse_score);
        if score.map_or(false, |s| s > threshold) {
            filtered.push_row(table.rows[row].clone());
        }
    }
    Ok(filtered)
}

/// Filter a table file and write
/// `<stem>_filtered_score_gt_<threshold>_<timestamp>.csv` beside it
///
/// The threshold is written with `.` replaced by `_`. Nothing is written
/// when no row passes.
pub fn filter_file(input: &Path, threshold: f64, now: &DateTime<Local>) -> Result<Option<PathBuf>> {
    info!(input = %input.display(), threshold, "Filtering by score");
    let table = Table::load(input)?;
    let filtered = filter_by_score(&table, threshold)?;
    info!(rows = table.len(), kept = filtered.len(), "Score filter applied");

    if filtered.is_empty() {
        warn!(threshold, "No rows score above the threshold");
        return Ok(None);
    }

    let suffix = format!(
        "_filtered_score_gt_{}_{}",
        threshold_label(threshold),
        timestamp(now)
    );
    let output = sibling_csv(input, &suffix);
    filtered.save_with_bom(&output)?;
    info!(output = %output.display(), "Filtered table saved");
    Ok(Some(output))
}

fn threshold_label(threshold: f64) -> String {
    format!("{:?}", threshold).replace('.', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_strictly_greater_than_threshold() {
        let mut table = Table::new(["name", "score"]);
        for (name, score) in [("a", "0.5"), ("b", "0.51"), ("c", ""), ("d", "0.9")] {
            table.push_row(vec![name.into(), score.into()]);
        }

        let filtered = filter_by_score(&table, DEFAULT_SCORE_THRESHOLD).unwrap();
        assert_eq!(filtered.rows, vec![vec!["b", "0.51"], vec!["d", "0.9"]]);
    }

    #[test]
    fn test_nan_threshold_is_invalid_input() {
        let table = Table::new(["name", "score"]);
        assert!(matches!(
            filter_by_score(&table, f64::NAN),
            Err(galsync_common::Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_threshold_label() {
        assert_eq!(threshold_label(0.5), "0_5");
        assert_eq!(threshold_label(1.0), "1_0");
    }

    #[test]
    fn test_filter_file_output_name_and_empty_result() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("ymgames_matched_new.csv");
        std::fs::write(&input, "name,score\na,0.7\nb,0.2\n").unwrap();
        let now = Local.with_ymd_and_hms(2025, 6, 15, 18, 49, 56).unwrap();

        let output = filter_file(&input, 0.5, &now).unwrap().unwrap();
        assert_eq!(
            output.file_name().unwrap().to_str().unwrap(),
            "ymgames_matched_new_filtered_score_gt_0_5_20250615_184956.csv"
        );
        let saved = Table::load(&output).unwrap();
        assert_eq!(saved.rows, vec![vec!["a", "0.7"]]);

        assert!(filter_file(&input, 0.95, &now).unwrap().is_none());
    }
}
