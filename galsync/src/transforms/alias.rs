//! Alias merging and extraction

use super::{
    alias_columns, check_cutoff, parse_score, sibling_csv, split_aliases, timestamp, ALIAS_PREFIX,
};
use chrono::{DateTime, Local};
use galsync_common::{Error, Result, Table};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Id columns, in priority order
pub const ID_COLUMNS: [&str; 4] = ["bgmid", "bgm_id", "id", "游戏ID"];

/// Alias columns of the source table, in priority order
pub const ALIAS_COLUMNS: [&str; 4] = ["别名", "bgm游戏", "alias", "aliases"];

pub const DEFAULT_MERGE_SUFFIX: &str = "_updated";

pub const DEFAULT_SCORE_LIMIT: f64 = 0.9;

/// Replace the main table's alias columns with aliases from `source`
///
/// Existing `别名*` columns are dropped. Rows are joined on the string id
/// (the first source row per id wins); main rows without a source row get
/// empty alias cells.
pub fn merge_aliases(main: &Table, source: &Table) -> Result<Table> {
    let main_id = main
        .find_column(&ID_COLUMNS)
        .ok_or_else(|| Error::Schema(format!("main table has no id column (one of {:?})", ID_COLUMNS)))?;
    let source_id = source
        .find_column(&ID_COLUMNS)
        .ok_or_else(|| Error::Schema(format!("alias table has no id column (one of {:?})", ID_COLUMNS)))?;
    let source_alias = source.find_column(&ALIAS_COLUMNS).ok_or_else(|| {
        Error::Schema(format!("alias table has no alias column (one of {:?})", ALIAS_COLUMNS))
    })?;
    info!(main_id, source_id, source_alias, "Alias merge columns resolved");

    let mut by_id: HashMap<&str, &str> = HashMap::new();
    for row in 0..source.len() {
        let id = source.get(row, source_id).unwrap_or_default().trim();
        if id.is_empty() {
            continue;
        }
        by_id
            .entry(id)
            .or_insert_with(|| source.get(row, source_alias).unwrap_or_default());
    }

    let mut merged = main.clone();
    let dropped = merged.drop_columns(|h| h.starts_with(ALIAS_PREFIX));
    if !dropped.is_empty() {
        info!(columns = ?dropped, "Dropped existing alias columns");
    }

    let per_row: Vec<Vec<String>> = (0..merged.len())
        .map(|row| {
            let id = merged.get(row, main_id).unwrap_or_default().trim();
            by_id.get(id).map(|cell| split_aliases(cell)).unwrap_or_default()
        })
        .collect();

    let columns = alias_columns(&per_row);
    if columns.is_empty() {
        warn!("Alias table produced no aliases; no alias columns added");
    }
    for (name, values) in columns {
        merged.add_column(name, values);
    }

    Ok(merged)
}

/// Merge aliases and write `<main stem><suffix><ext>` next to the main table
pub fn merge_alias_files(main_path: &Path, source_path: &Path, suffix: &str) -> Result<PathBuf> {
    info!(main = %main_path.display(), source = %source_path.display(), "Merging aliases");
    let main = Table::load(main_path)?;
    let source = Table::load(source_path)?;

    let merged = merge_aliases(&main, &source)?;

    let stem = main_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = main_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let output = main_path.with_file_name(format!("{}{}{}", stem, suffix, ext));

    merged.save_with_bom(&output)?;
    info!(output = %output.display(), rows = merged.len(), "Alias merge saved");
    Ok(output)
}

/// Rows with a non-blank `别名` and a numeric `score` ≤ `score_limit`,
/// with `别名` split into `别名1..N`
pub fn extract_alias_rows(table: &Table, score_limit: f64) -> Result<Table> {
    check_cutoff("score limit", score_limit)?;
    table.require_columns(&[ALIAS_PREFIX, "score"])?;

    let mut filtered = Table::new(table.headers.clone());
    let mut with_alias = 0;
    for row in 0..table.len() {
        let alias = table.get(row, ALIAS_PREFIX).unwrap_or_default();
        if alias.trim().is_empty() {
            continue;
        }
        with_alias += 1;
        let score = table.get(row, "score").and_then(parse_score);
        if score.map_or(false, |s| s <= score_limit) {
            filtered.push_row(table.rows[row].clone());
        }
    }
    tracing::debug!(
        rows = table.len(),
        with_alias,
        kept = filtered.len(),
        score_limit,
        "Alias rows filtered"
    );

    let per_row: Vec<Vec<String>> = (0..filtered.len())
        .map(|row| split_aliases(filtered.get(row, ALIAS_PREFIX).unwrap_or_default()))
        .collect();
    let columns = alias_columns(&per_row);
    if columns.is_empty() {
        return Ok(filtered);
    }

    filtered.drop_columns(|h| h == ALIAS_PREFIX);
    for (name, values) in columns {
        filtered.add_column(name, values);
    }
    Ok(filtered)
}

/// Extract alias rows and write `<stem>_processed_aliases_<timestamp>.csv`
///
/// Nothing is written when no row qualifies.
pub fn process_alias_file(
    input: &Path,
    score_limit: f64,
    now: &DateTime<Local>,
) -> Result<Option<PathBuf>> {
    info!(input = %input.display(), score_limit, "Extracting alias rows");
    let table = Table::load(input)?;
    let extracted = extract_alias_rows(&table, score_limit)?;

    if extracted.is_empty() {
        warn!(score_limit, "No rows with aliases at or below the score limit");
        return Ok(None);
    }

    let output = sibling_csv(input, &format!("_processed_aliases_{}", timestamp(now)));
    extracted.save_with_bom(&output)?;
    info!(output = %output.display(), rows = extracted.len(), "Alias rows saved");
    Ok(Some(output))
}
