//! Incremental persistence of pipeline output
//!
//! Three CSV tables, each written one batch at a time:
//! - matched results ([`MATCHED_COLUMNS`])
//! - unmatched labels ([`UNMATCHED_COLUMNS`])
//! - organization details ([`ORGANIZATION_COLUMNS`])
//!
//! Writes are true appends; the header is written only when the file is
//! new or empty. When the destination is locked by another process the
//! batch goes to a `.temp` sibling, and any other write error diverts it to
//! a `.backup` sibling, so a batch is never dropped silently.
//!
//! A crash in the middle of a write can leave a last row without its line
//! terminator. Readers ignore such a row, and the next append or table
//! initialization truncates it so new rows never fuse onto it.

use crate::models::{
    MatchedRecord, OrganizationRecord, MATCHED_COLUMNS, ORGANIZATION_COLUMNS, UNMATCHED_COLUMNS,
};
use galsync_common::config::FilesConfig;
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Windows sharing and lock violations
const ERROR_SHARING_VIOLATION: i32 = 32;
const ERROR_LOCK_VIOLATION: i32 = 33;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl StoreError {
    fn io_error(&self) -> Option<&io::Error> {
        match self {
            StoreError::Io(e) => Some(e),
            StoreError::Csv(e) => match e.kind() {
                csv::ErrorKind::Io(e) => Some(e),
                _ => None,
            },
        }
    }

    /// Whether the file is held by another process
    pub fn is_contention(&self) -> bool {
        self.io_error().map_or(false, |e| {
            e.kind() == io::ErrorKind::PermissionDenied
                || (cfg!(windows)
                    && matches!(
                        e.raw_os_error(),
                        Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
                    ))
        })
    }
}

/// Where a batch ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Primary,
    /// Destination locked; batch appended to the `.temp` sibling
    Temp(PathBuf),
    /// Destination failed; batch appended to the `.backup` sibling
    Backup(PathBuf),
}

/// Paths of the three output tables
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    pub matched: PathBuf,
    pub unmatched: PathBuf,
    pub organizations: PathBuf,
}

impl From<&FilesConfig> for StorePaths {
    fn from(files: &FilesConfig) -> Self {
        Self {
            matched: files.matched.clone(),
            unmatched: files.unmatched.clone(),
            organizations: files.organizations.clone(),
        }
    }
}

impl StorePaths {
    /// Default file names inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            matched: dir.join("ymgames_matched.csv"),
            unmatched: dir.join("ymgames_unmatched.csv"),
            organizations: dir.join("organizations_info.csv"),
        }
    }
}

pub struct IncrementalStore {
    paths: StorePaths,
}

impl IncrementalStore {
    pub fn new(paths: StorePaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &StorePaths {
        &self.paths
    }

    pub fn init_matched(&self) -> Result<(), StoreError> {
        ensure_table(&self.paths.matched, &MATCHED_COLUMNS)
    }

    pub fn init_unmatched(&self) -> Result<(), StoreError> {
        ensure_table(&self.paths.unmatched, &UNMATCHED_COLUMNS)
    }

    pub fn init_organizations(&self) -> Result<(), StoreError> {
        ensure_table(&self.paths.organizations, &ORGANIZATION_COLUMNS)
    }

    pub fn append_matched(&self, records: &[MatchedRecord]) -> Result<WriteOutcome, StoreError> {
        append_with_fallback(&self.paths.matched, &MATCHED_COLUMNS, records)
    }

    pub fn append_organization(
        &self,
        record: &OrganizationRecord,
    ) -> Result<WriteOutcome, StoreError> {
        append_with_fallback(
            &self.paths.organizations,
            &ORGANIZATION_COLUMNS,
            std::slice::from_ref(record),
        )
    }

    pub fn append_unmatched(&self, label: &str) -> Result<WriteOutcome, StoreError> {
        append_with_fallback(&self.paths.unmatched, &UNMATCHED_COLUMNS, &[[label]])
    }

    /// Every matched record persisted so far
    pub fn load_matched(&self) -> Result<Vec<MatchedRecord>, StoreError> {
        load_records(&self.paths.matched)
    }

    /// Source ids already present in the matched table
    ///
    /// A missing file is an empty checkpoint; an unreadable one is an error
    /// the caller decides how to handle. Malformed rows and an unterminated
    /// last row are skipped, so their ids are processed again.
    pub fn processed_ids(&self) -> Result<HashSet<String>, StoreError> {
        if !self.paths.matched.exists() {
            return Ok(HashSet::new());
        }

        let torn = has_torn_tail(&self.paths.matched)?;
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&self.paths.matched)?;
        let width = reader.headers()?.len();
        let Some(idx) = reader.headers()?.iter().position(|h| h == MATCHED_COLUMNS[0]) else {
            tracing::warn!(
                path = %self.paths.matched.display(),
                "Matched table has no {} column; resume may be inaccurate",
                MATCHED_COLUMNS[0]
            );
            return Ok(HashSet::new());
        };

        let mut ids = HashSet::new();
        let mut rows = reader.records().peekable();
        while let Some(row) = rows.next() {
            if torn && rows.peek().is_none() {
                tracing::warn!(
                    path = %self.paths.matched.display(),
                    "Ignoring incomplete last row of matched table"
                );
                break;
            }
            let record = match row {
                Ok(record) if record.len() == width => record,
                Ok(record) => {
                    tracing::warn!(
                        fields = record.len(),
                        expected = width,
                        "Skipping malformed matched row"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Skipping unreadable matched row");
                    continue;
                }
            };
            if let Some(id) = record.get(idx).map(str::trim).filter(|id| !id.is_empty()) {
                ids.insert(id.to_string());
            }
        }
        Ok(ids)
    }

    /// Persisted organization rows in file order (duplicates included)
    ///
    /// Rows that fail to decode are skipped with a warning.
    pub fn load_organizations(&self) -> Result<Vec<OrganizationRecord>, StoreError> {
        if !self.paths.organizations.exists() {
            return Ok(Vec::new());
        }

        let mut reader = csv::Reader::from_path(&self.paths.organizations)?;
        let mut records = Vec::new();
        for (idx, row) in reader.deserialize::<OrganizationRecord>().enumerate() {
            match row {
                Ok(record) => records.push(record),
                Err(e) => tracing::warn!(row = idx, error = %e, "Skipping unreadable organization row"),
            }
        }
        Ok(records)
    }
}

fn load_records(path: &Path) -> Result<Vec<MatchedRecord>, StoreError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let torn = has_torn_tail(path)?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut records = Vec::new();
    let mut rows = reader.deserialize::<MatchedRecord>().peekable();
    while let Some(row) = rows.next() {
        if torn && rows.peek().is_none() {
            break;
        }
        match row {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(error = %e, "Skipping unreadable matched row"),
        }
    }
    Ok(records)
}

/// `<file>.<suffix>` next to `path`
fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// `<file>.<suffix>.<timestamp>`, with a counter appended until the name is
/// unused
fn free_sibling(path: &Path, suffix: &str) -> PathBuf {
    let stamped = format!("{}.{}", suffix, chrono::Local::now().format("%Y%m%d_%H%M%S"));
    let mut candidate = sibling(path, &stamped);
    let mut n = 1;
    while candidate.exists() {
        candidate = sibling(path, &format!("{}-{}", stamped, n));
        n += 1;
    }
    candidate
}

/// Whether the file is non-empty and its last byte is not a line terminator
fn has_torn_tail(path: &Path) -> Result<bool, StoreError> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Cut an unterminated last row off `path`
///
/// The row is cut at the byte where it starts, which keeps quoted fields
/// with embedded newlines intact in the rows before it.
fn truncate_torn_tail(path: &Path) -> Result<(), StoreError> {
    if !has_torn_tail(path)? {
        return Ok(());
    }

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(false)
        .from_path(path)?;
    let mut record = csv::ByteRecord::new();
    let mut last_start = 0;
    while reader.read_byte_record(&mut record)? {
        if let Some(position) = record.position() {
            last_start = position.byte();
        }
    }

    let len = fs::metadata(path)?.len();
    tracing::warn!(
        path = %path.display(),
        dropped_bytes = len - last_start,
        "Truncating incomplete last row"
    );
    OpenOptions::new().write(true).open(path)?.set_len(last_start)?;
    Ok(())
}

/// Create `path` with `header`, replacing a file that is unreadable or whose
/// header differs (the old file is moved to a timestamped `<file>.corrupt.*`)
fn ensure_table(path: &Path, header: &[&str]) -> Result<(), StoreError> {
    if path.exists() {
        truncate_torn_tail(path)?;
    }
    if path.exists() && fs::metadata(path)?.len() > 0 {
        let existing = csv::Reader::from_path(path).and_then(|mut reader| {
            reader.headers().map(|h| h.iter().map(str::to_string).collect::<Vec<_>>())
        });

        match existing {
            Ok(found) if found.iter().map(String::as_str).eq(header.iter().copied()) => {
                return Ok(());
            }
            Ok(found) => {
                tracing::warn!(
                    path = %path.display(),
                    found = ?found,
                    "Unexpected table header; recreating"
                );
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Unreadable table; recreating");
            }
        }

        let aside = free_sibling(path, "corrupt");
        if let Err(e) = fs::rename(path, &aside) {
            tracing::warn!(path = %path.display(), error = %e, "Could not move table aside");
            fs::remove_file(path)?;
        } else {
            tracing::warn!(path = %path.display(), aside = %aside.display(), "Old table moved aside");
        }
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    writer.flush()?;
    tracing::info!(path = %path.display(), "Initialized output table");
    Ok(())
}

/// Append rows, writing the header first when the file is new or empty
fn append_rows<T: Serialize>(path: &Path, header: &[&str], rows: &[T]) -> Result<(), StoreError> {
    if path.is_file() {
        truncate_torn_tail(path)?;
    }
    let needs_header = fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if needs_header {
        writer.write_record(header)?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn append_with_fallback<T: Serialize>(
    path: &Path,
    header: &[&str],
    rows: &[T],
) -> Result<WriteOutcome, StoreError> {
    let err = match append_rows(path, header, rows) {
        Ok(()) => return Ok(WriteOutcome::Primary),
        Err(e) => e,
    };

    if err.is_contention() {
        let temp = sibling(path, "temp");
        tracing::warn!(
            path = %path.display(),
            temp = %temp.display(),
            "Output file is locked; writing batch to temp file"
        );
        append_rows(&temp, header, rows)?;
        Ok(WriteOutcome::Temp(temp))
    } else {
        let backup = sibling(path, "backup");
        tracing::error!(
            path = %path.display(),
            backup = %backup.display(),
            error = %err,
            "Failed to write batch; writing to backup file"
        );
        append_rows(&backup, header, rows)?;
        Ok(WriteOutcome::Backup(backup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NameVariant;
    use tempfile::TempDir;

    fn record(id: &str) -> MatchedRecord {
        MatchedRecord {
            source_id: id.to_string(),
            display_name: "テスト".into(),
            name_a: "テスト".into(),
            name_b: "测试".into(),
            name: "Test".into(),
            localized_name: "测试".into(),
            target_id: "100".into(),
            score: 0.9,
            org_id: "10".into(),
            org_name: "Org".into(),
            org_website: "http://x".into(),
            org_description: "".into(),
            match_field: NameVariant::A,
        }
    }

    #[test]
    fn test_serialized_header_matches_column_contract() {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(record("1")).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, MATCHED_COLUMNS.join(","));

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.serialize(OrganizationRecord::default()).unwrap();
        let text = String::from_utf8(writer.into_inner().unwrap()).unwrap();
        assert_eq!(text.lines().next().unwrap(), ORGANIZATION_COLUMNS.join(","));
    }

    #[test]
    fn test_init_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(StorePaths::in_dir(dir.path()));

        store.init_matched().unwrap();
        store.append_matched(&[record("1")]).unwrap();
        store.init_matched().unwrap();

        assert_eq!(store.load_matched().unwrap(), vec![record("1")]);
    }

    #[test]
    fn test_init_replaces_wrong_header() {
        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(StorePaths::in_dir(dir.path()));
        fs::write(&store.paths().organizations, "something,else\n1,2\n").unwrap();

        store.init_organizations().unwrap();

        let text = fs::read_to_string(&store.paths().organizations).unwrap();
        assert_eq!(text.trim(), ORGANIZATION_COLUMNS.join(","));
        assert_eq!(corrupt_copies(dir.path()), vec!["something,else\n1,2\n"]);
    }

    fn corrupt_copies(dir: &Path) -> Vec<String> {
        let mut contents: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|p| p.to_string_lossy().contains(".corrupt"))
            .map(|p| fs::read_to_string(p).unwrap())
            .collect();
        contents.sort();
        contents
    }

    #[test]
    fn test_repeated_recreation_keeps_every_old_table() {
        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(StorePaths::in_dir(dir.path()));

        fs::write(&store.paths().organizations, "first,header\n1,2\n").unwrap();
        store.init_organizations().unwrap();
        fs::write(&store.paths().organizations, "second,header\n3,4\n").unwrap();
        store.init_organizations().unwrap();

        assert_eq!(
            corrupt_copies(dir.path()),
            vec!["first,header\n1,2\n", "second,header\n3,4\n"]
        );
    }

    #[test]
    fn test_unterminated_last_row_is_ignored_then_truncated() {
        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(StorePaths::in_dir(dir.path()));
        store.append_matched(&[record("1")]).unwrap();

        let mut file = OpenOptions::new().append(true).open(&store.paths().matched).unwrap();
        io::Write::write_all(&mut file, b"2,Kanon,Kanon,,KAN").unwrap();
        drop(file);

        let ids = store.processed_ids().unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("1"));
        assert_eq!(store.load_matched().unwrap(), vec![record("1")]);

        store.append_matched(&[record("3")]).unwrap();
        let text = fs::read_to_string(&store.paths().matched).unwrap();
        assert!(!text.contains("Kanon"));
        assert_eq!(text.lines().count(), 3);
        assert_eq!(store.load_matched().unwrap(), vec![record("1"), record("3")]);
    }

    #[test]
    fn test_init_truncates_unterminated_last_row() {
        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(StorePaths::in_dir(dir.path()));
        store.append_unmatched("ID_1_未匹配").unwrap();
        let mut file = OpenOptions::new().append(true).open(&store.paths().unmatched).unwrap();
        io::Write::write_all(&mut file, b"ID_2_").unwrap();
        drop(file);

        store.init_unmatched().unwrap();

        let text = fs::read_to_string(&store.paths().unmatched).unwrap();
        assert_eq!(text, format!("{}\nID_1_未匹配\n", UNMATCHED_COLUMNS[0]));
    }

    #[test]
    fn test_malformed_row_does_not_hide_other_ids() {
        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(StorePaths::in_dir(dir.path()));
        store.append_matched(&[record("1")]).unwrap();
        let mut file = OpenOptions::new().append(true).open(&store.paths().matched).unwrap();
        io::Write::write_all(&mut file, b"9,short\n").unwrap();
        drop(file);
        store.append_matched(&[record("2")]).unwrap();

        let ids = store.processed_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("1") && ids.contains("2"));
        assert_eq!(store.load_matched().unwrap(), vec![record("1"), record("2")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_read_only_destination_diverts_to_temp() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(StorePaths::in_dir(dir.path()));
        let path = store.paths().matched.clone();
        store.init_matched().unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o444)).unwrap();

        // Root ignores file modes; nothing to observe then
        if OpenOptions::new().append(true).open(&path).is_ok() {
            return;
        }

        let outcome = store.append_matched(&[record("1")]).unwrap();
        let temp = sibling(&path, "temp");
        assert_eq!(outcome, WriteOutcome::Temp(temp.clone()));

        let text = fs::read_to_string(&temp).unwrap();
        assert_eq!(text.lines().next().unwrap(), MATCHED_COLUMNS.join(","));
        assert_eq!(load_records(&temp).unwrap(), vec![record("1")]);
        assert!(store.load_matched().unwrap().is_empty());
    }

    #[test]
    fn test_append_creates_header_for_new_file() {
        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(StorePaths::in_dir(dir.path()));

        assert_eq!(store.append_unmatched("ID_1_空名称").unwrap(), WriteOutcome::Primary);
        assert_eq!(store.append_unmatched("ID_2_未匹配").unwrap(), WriteOutcome::Primary);

        let text = fs::read_to_string(&store.paths().unmatched).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines, vec![UNMATCHED_COLUMNS[0], "ID_1_空名称", "ID_2_未匹配"]);
    }

    #[test]
    fn test_unwritable_destination_diverts_to_backup() {
        let dir = TempDir::new().unwrap();
        // A directory in place of the table makes every open fail with a
        // non-permission error
        let blocked = dir.path().join("ymgames_matched.csv");
        fs::create_dir(&blocked).unwrap();
        let store = IncrementalStore::new(StorePaths::in_dir(dir.path()));

        let outcome = store.append_matched(&[record("1")]).unwrap();
        let backup = sibling(&blocked, "backup");
        assert_eq!(outcome, WriteOutcome::Backup(backup.clone()));

        let recovered = load_records(&backup).unwrap();
        assert_eq!(recovered, vec![record("1")]);
    }

    #[test]
    fn test_processed_ids_skip_blank() {
        let dir = TempDir::new().unwrap();
        let store = IncrementalStore::new(StorePaths::in_dir(dir.path()));
        assert!(store.processed_ids().unwrap().is_empty());

        store.append_matched(&[record("1"), record(""), record("ROW_4")]).unwrap();
        let ids = store.processed_ids().unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("1"));
        assert!(ids.contains("ROW_4"));
    }

    #[test]
    fn test_contention_classification() {
        let denied = StoreError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(denied.is_contention());

        #[cfg(windows)]
        {
            let sharing = StoreError::Io(io::Error::from_raw_os_error(ERROR_SHARING_VIOLATION));
            assert!(sharing.is_contention());
        }

        let other = StoreError::Io(io::Error::from(io::ErrorKind::NotFound));
        assert!(!other.is_contention());
    }
}
