//! Secondary alignment of matched records against a local catalog table
//!
//! Offline and brute force: every matched `name` is compared with every
//! catalog `游戏名称`. The first catalog row with the highest ratio wins and
//! is emitted only when the ratio reaches the threshold.

use crate::similarity;
use galsync_common::{Error, Result, Table};
use std::path::{Path, PathBuf};
use tracing::info;

/// Output column order
pub const ALIGNED_COLUMNS: [&str; 10] = [
    "ym_id",
    "ym_name",
    "ym_chinese_name",
    "bangumi_id",
    "bangumi_name",
    "bangumi_score",
    "bangumi_rank",
    "bangumi_votes",
    "bangumi_summary",
    "match_score",
];

const CATALOG_NAME: &str = "游戏名称";
const CATALOG_ID: &str = "游戏ID";
const CATALOG_SCORE: &str = "评分";
const CATALOG_RANK: &str = "排名";
const CATALOG_VOTES: &str = "投票数";
const CATALOG_SUMMARY: &str = "简介";

pub const DEFAULT_ALIGN_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct AlignPaths {
    pub matched: PathBuf,
    pub catalog: PathBuf,
    pub output: PathBuf,
}

impl From<&galsync_common::config::AlignConfig> for AlignPaths {
    fn from(config: &galsync_common::config::AlignConfig) -> Self {
        Self {
            matched: config.matched.clone(),
            catalog: config.catalog.clone(),
            output: config.output.clone(),
        }
    }
}

/// Align two in-memory tables
///
/// `matched` must carry `name`, `chineseName` and `ym_id`; `catalog` must
/// carry `游戏名称`. Other catalog columns are copied when present.
pub fn align(matched: &Table, catalog: &Table, threshold: f64) -> Result<Table> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(Error::InvalidInput(format!(
            "alignment threshold must be within [0, 1], got {}",
            threshold
        )));
    }
    matched.require_columns(&["name", "chineseName", "ym_id"])?;
    catalog.require_columns(&[CATALOG_NAME])?;

    let catalog_names: Vec<&str> = (0..catalog.len())
        .map(|row| catalog.get(row, CATALOG_NAME).unwrap_or_default())
        .collect();
    let optional = |row: usize, column: &str| catalog.get(row, column).unwrap_or_default().to_string();

    let mut output = Table::new(ALIGNED_COLUMNS);

    for row in 0..matched.len() {
        let name = matched.get(row, "name").unwrap_or_default();

        let mut best: Option<usize> = None;
        let mut best_score = 0.0;
        for (candidate, catalog_name) in catalog_names.iter().enumerate() {
            let score = similarity::ratio(name, catalog_name);
            if score > best_score {
                best = Some(candidate);
                best_score = score;
            }
        }

        let Some(hit) = best else { continue };
        if best_score < threshold {
            continue;
        }

        info!(
            name = %name,
            catalog_name = %catalog_names[hit],
            score = format!("{:.4}", best_score),
            "Aligned"
        );
        output.push_row(vec![
            matched.get(row, "ym_id").unwrap_or_default().to_string(),
            name.to_string(),
            matched.get(row, "chineseName").unwrap_or_default().to_string(),
            optional(hit, CATALOG_ID),
            catalog_names[hit].to_string(),
            optional(hit, CATALOG_SCORE),
            optional(hit, CATALOG_RANK),
            optional(hit, CATALOG_VOTES),
            optional(hit, CATALOG_SUMMARY),
            format!("{:?}", round4(best_score)),
        ]);
    }

    Ok(output)
}

/// Load both tables, align them and write the result with a UTF-8 BOM
pub fn run_alignment(paths: &AlignPaths, threshold: f64) -> Result<usize> {
    info!(
        matched = %paths.matched.display(),
        catalog = %paths.catalog.display(),
        "Aligning matched records with catalog"
    );
    let matched = Table::load(&paths.matched)?;
    let catalog = Table::load(&paths.catalog)?;

    let aligned = align(&matched, &catalog, threshold)?;
    write_output(&aligned, &paths.output)?;

    info!(
        output = %paths.output.display(),
        rows = aligned.len(),
        "Alignment saved"
    );
    Ok(aligned.len())
}

fn write_output(table: &Table, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    table.save_with_bom(path)
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matched_table(names: &[&str]) -> Table {
        let mut table = Table::new(["name", "chineseName", "ym_id"]);
        for (i, name) in names.iter().enumerate() {
            table.push_row(vec![name.to_string(), String::new(), (i + 1).to_string()]);
        }
        table
    }

    fn catalog_table(names: &[&str]) -> Table {
        let mut table = Table::new([CATALOG_ID, CATALOG_NAME]);
        for (i, name) in names.iter().enumerate() {
            table.push_row(vec![format!("b{}", i + 1), name.to_string()]);
        }
        table
    }

    #[test]
    fn test_exact_match_wins_over_longer_title() {
        let aligned = align(
            &matched_table(&["Clannad"]),
            &catalog_table(&["CLANNAD", "Clannad After Story"]),
            DEFAULT_ALIGN_THRESHOLD,
        )
        .unwrap();

        assert_eq!(aligned.len(), 1);
        assert_eq!(aligned.get(0, "bangumi_name"), Some("CLANNAD"));
        assert_eq!(aligned.get(0, "bangumi_id"), Some("b1"));
        assert_eq!(aligned.get(0, "match_score"), Some("1.0"));
        assert_eq!(aligned.get(0, "bangumi_summary"), Some(""));
    }

    #[test]
    fn test_below_threshold_is_dropped() {
        let aligned = align(
            &matched_table(&["Clannad"]),
            &catalog_table(&["Clannad After Story"]),
            DEFAULT_ALIGN_THRESHOLD,
        )
        .unwrap();
        assert!(aligned.is_empty());
    }

    #[test]
    fn test_first_maximum_is_kept() {
        let aligned = align(
            &matched_table(&["abc"]),
            &catalog_table(&["ABC", "abc"]),
            DEFAULT_ALIGN_THRESHOLD,
        )
        .unwrap();
        assert_eq!(aligned.get(0, "bangumi_id"), Some("b1"));
    }

    #[test]
    fn test_score_rounded_to_four_places() {
        let aligned = align(
            &matched_table(&["abcdefgh"]),
            &catalog_table(&["abcdefg"]),
            0.5,
        )
        .unwrap();
        // 14 / 15
        assert_eq!(aligned.get(0, "match_score"), Some("0.9333"));
    }

    #[test]
    fn test_threshold_outside_unit_range_is_invalid_input() {
        let matched = matched_table(&["x"]);
        let catalog = catalog_table(&["x"]);
        assert!(matches!(
            align(&matched, &catalog, 1.5),
            Err(galsync_common::Error::InvalidInput(_))
        ));
        assert!(matches!(
            align(&matched, &catalog, f64::NAN),
            Err(galsync_common::Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_missing_catalog_name_column() {
        let catalog = Table::new(["游戏ID"]);
        let err = align(&matched_table(&["x"]), &catalog, 0.8).unwrap_err();
        assert!(matches!(err, galsync_common::Error::Schema(_)));
    }
}
