//! Timestamped backup files, one per (project, table) GENERATE run.
//!
//! The backup file is the durable intermediate artifact: every database load
//! reads the newest backup for its (project, table) prefix, so the store is
//! rebuildable from the backup directory alone.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime};

use crate::error::HarvestError;

const FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Records are buffered and flushed to disk in batches of this size to bound
/// memory on large repositories.
pub const RECORDS_PER_FLUSH: usize = 200;

#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create backup dir {}", dir.display()))?;
        Ok(BackupStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn prefix(project: &str, table: &str) -> String {
        format!("{project}_{table}_")
    }

    /// Allocate a fresh timestamped path without creating the file. Used for
    /// tools that write their own output file.
    pub fn allocate(&self, project: &str, table: &str, ext: &str) -> PathBuf {
        let stamp = Local::now().format(FILE_TIME_FORMAT);
        self.dir
            .join(format!("{}{stamp}.{ext}", Self::prefix(project, table)))
    }

    /// Start a new CSV backup for (project, table).
    pub fn create_csv(&self, project: &str, table: &str) -> Result<BackupWriter> {
        let path = self.allocate(project, table, "csv");
        BackupWriter::create(path)
    }

    /// The most recent backup file for (project, table), any extension.
    pub fn newest(&self, project: &str, table: &str) -> Result<PathBuf> {
        let prefix = Self::prefix(project, table);
        let mut best: Option<(NaiveDateTime, PathBuf)> = None;

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(stamp) = Self::timestamp_of(&path, &prefix) else {
                continue;
            };
            if best.as_ref().map(|(t, _)| stamp > *t).unwrap_or(true) {
                best = Some((stamp, path));
            }
        }

        best.map(|(_, path)| path).ok_or_else(|| {
            HarvestError::MissingBackup {
                prefix,
                dir: self.dir.clone(),
            }
            .into()
        })
    }

    /// Retention pass: delete every backup except the newest one per
    /// (project, table) prefix. Returns the number of files removed.
    pub fn cleanup(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(prefix) = Self::prefix_of(&path) else {
                continue;
            };
            let keep = self.newest_for_prefix(&prefix)?;
            if Some(&path) != keep.as_ref() {
                log::info!("deleting stale backup {}", path.display());
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    fn newest_for_prefix(&self, prefix: &str) -> Result<Option<PathBuf>> {
        let mut best: Option<(NaiveDateTime, PathBuf)> = None;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(stamp) = Self::timestamp_of(&path, prefix) else {
                continue;
            };
            if best.as_ref().map(|(t, _)| stamp > *t).unwrap_or(true) {
                best = Some((stamp, path));
            }
        }
        Ok(best.map(|(_, path)| path))
    }

    /// `myproject_commits_2026-01-01_10-00-00.csv` → `myproject_commits_`
    fn prefix_of(path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        let stamp_len = "0000-00-00_00-00-00".len();
        if stem.len() <= stamp_len {
            return None;
        }
        let (prefix, stamp) = stem.split_at(stem.len() - stamp_len);
        NaiveDateTime::parse_from_str(stamp, FILE_TIME_FORMAT).ok()?;
        Some(prefix.to_string())
    }

    fn timestamp_of(path: &Path, prefix: &str) -> Option<NaiveDateTime> {
        let stem = path.file_stem()?.to_str()?;
        let stamp = stem.strip_prefix(prefix)?;
        NaiveDateTime::parse_from_str(stamp, FILE_TIME_FORMAT).ok()
    }
}

/// Appends string records to one CSV backup file, flushing every
/// [`RECORDS_PER_FLUSH`] records.
pub struct BackupWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
    pending: usize,
}

impl BackupWriter {
    fn create(path: PathBuf) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to create backup file {}", path.display()))?;
        let writer = csv::WriterBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        Ok(BackupWriter {
            path,
            writer,
            pending: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_record<I, F>(&mut self, record: I) -> Result<()>
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        self.writer.write_record(record)?;
        self.pending += 1;
        if self.pending >= RECORDS_PER_FLUSH {
            self.writer.flush()?;
            self.pending = 0;
        }
        Ok(())
    }

    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        Ok(self.path)
    }
}

/// Read every record of a CSV backup file in order.
pub fn read_csv_records(path: &Path) -> Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open backup file {}", path.display()))?;

    let mut records = Vec::new();
    for record in reader.records() {
        let record = record?;
        records.push(record.iter().map(|field| field.to_string()).collect());
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn records_round_trip_including_awkward_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BackupStore::open(dir.path()).expect("open store");

        let record = vec![
            "zookeeper".to_string(),
            "abc123".to_string(),
            "fix, please\n\"quoted\" diff:\n+line".to_string(),
        ];
        let mut writer = store.create_csv("zookeeper", "commits").expect("writer");
        writer.write_record(&record).expect("write");
        let path = writer.finish().expect("finish");

        let rows = read_csv_records(&path).expect("read");
        assert_eq!(rows, vec![record]);
    }

    #[test]
    fn newest_picks_latest_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BackupStore::open(dir.path()).expect("open store");

        fs::write(dir.path().join("zk_commits_2020-01-01_00-00-00.csv"), "a\n").expect("old");
        fs::write(dir.path().join("zk_commits_2021-06-15_12-30-00.csv"), "b\n").expect("new");
        fs::write(dir.path().join("zk_issues_2022-01-01_00-00-00.csv"), "c\n").expect("other");

        let newest = store.newest("zk", "commits").expect("newest");
        assert_eq!(
            newest.file_name().unwrap().to_str().unwrap(),
            "zk_commits_2021-06-15_12-30-00.csv"
        );
    }

    #[test]
    fn newest_errors_when_no_backup_exists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BackupStore::open(dir.path()).expect("open store");
        assert!(store.newest("zk", "commits").is_err());
    }

    #[test]
    fn cleanup_keeps_only_newest_per_prefix() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BackupStore::open(dir.path()).expect("open store");

        fs::write(dir.path().join("zk_commits_2020-01-01_00-00-00.csv"), "a\n").expect("old");
        fs::write(dir.path().join("zk_commits_2021-06-15_12-30-00.csv"), "b\n").expect("new");
        fs::write(dir.path().join("zk_issues_2022-01-01_00-00-00.csv"), "c\n").expect("other");

        let removed = store.cleanup().expect("cleanup");
        assert_eq!(removed, 1);
        assert!(store.newest("zk", "commits").is_ok());
        assert!(store.newest("zk", "issues").is_ok());
    }

    #[test]
    fn consecutive_writers_get_distinct_files_eventually() {
        // Timestamps have second resolution; two writers within the same
        // second share a file name, which append mode tolerates.
        let dir = tempfile::tempdir().expect("tempdir");
        let store = BackupStore::open(dir.path()).expect("open store");
        let first = store.allocate("zk", "commits", "csv");
        sleep(Duration::from_millis(1100));
        let second = store.allocate("zk", "commits", "csv");
        assert_ne!(first, second);
    }
}
