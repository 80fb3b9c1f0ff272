//! Naming, listing and rotation of backup archives.
//!
//! All archives live side by side in one flat backup directory. Each file name is structured as
//! `YYYY-MM-DD-NNN-<database>.tar`, where NNN is a per-database, per-day sequence number. A file
//! belongs to a database only when its name parses and the database token matches exactly, so
//! `testdb` never claims `my-testdb`'s archives.

use crate::error::{Error, ErrorType, IntoResult, Res};
use crate::{utils, Result};
use anyhow::Context;
use chrono::{DateTime, Local, NaiveDate};
use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, trace};

/// File extension of `pg_dump` tar-format archives.
pub const EXTENSION: &str = "tar";

/// The parsed form of a backup file name.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct BackupName {
    date: NaiveDate,
    sequence: u32,
    database: String,
}

impl BackupName {
    pub fn new(date: NaiveDate, sequence: u32, database: impl Into<String>) -> Self {
        Self {
            date,
            sequence,
            database: database.into(),
        }
    }

    /// Parses a file name of the form `YYYY-MM-DD-NNN-<database>.tar`. Returns `None` if
    /// `file_name` is anything else.
    pub fn parse(file_name: &str) -> Option<Self> {
        let stem = file_name.strip_suffix(&format!(".{EXTENSION}"))?;
        let mut parts = stem.splitn(5, '-');
        let year = digits(parts.next()?, 4)?;
        let month = digits(parts.next()?, 2)?;
        let day = digits(parts.next()?, 2)?;
        let sequence = parts.next()?;
        let database = parts.next()?;

        if sequence.len() < 3 || database.is_empty() {
            return None;
        }
        let sequence = digits(sequence, sequence.len())?;
        let date = NaiveDate::from_ymd_opt(year as i32, month, day)?;
        Some(Self::new(date, sequence, database))
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn database(&self) -> &str {
        &self.database
    }
}

impl Display for BackupName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{:03}-{}.{EXTENSION}",
            self.date.format("%Y-%m-%d"),
            self.sequence,
            self.database
        )
    }
}

/// Formats the backup file name for `database` taken at `now` with the given same-day
/// `sequence` number.
pub fn backup_name(database: &str, now: DateTime<Local>, sequence: u32) -> String {
    BackupName::new(now.date_naive(), sequence, database).to_string()
}

/// Converts a user-supplied retention limit. Negative limits are rejected rather than clamped.
pub fn retention_limit(limit: i64) -> Result<u32> {
    u32::try_from(limit).map_err(|_| {
        Error::msg(
            ErrorType::Validation,
            format!("the backup limit has to be a non-negative number, got {limit}"),
        )
    })
}

/// A backup archive found on disk.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct BackupFile {
    name: BackupName,
    file_name: String,
    path: PathBuf,
    modified: SystemTime,
}

impl BackupFile {
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn database(&self) -> &str {
        self.name.database()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    pub fn name(&self) -> &BackupName {
        &self.name
    }
}

/// Names, locates, lists and trims the archives in a backup directory.
///
/// Clones share the record of sequence numbers already handed out, so names issued through any
/// clone never repeat within the process even if no file was written for them.
#[derive(Debug, Clone)]
pub struct Catalog {
    backup_dir: PathBuf,
    issued: Arc<Mutex<HashMap<(String, NaiveDate), u32>>>,
}

impl Catalog {
    pub fn new(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            issued: Arc::default(),
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Returns the next unused backup name for `database` on the date of `now`. The sequence
    /// number is one past the highest found on disk or previously issued for that date.
    pub async fn next_backup_name(
        &self,
        database: &str,
        now: DateTime<Local>,
    ) -> Result<BackupName> {
        let date = now.date_naive();
        let on_disk = self
            .list_backups(database)
            .await?
            .iter()
            .filter(|f| f.name.date == date)
            .map(|f| f.name.sequence)
            .max()
            .unwrap_or(0);

        let mut issued = self.issued.lock().unwrap_or_else(|e| e.into_inner());
        // Earlier days can no longer be issued for
        issued.retain(|(db, day), _| db != database || *day >= date);
        let last = issued.entry((database.to_string(), date)).or_insert(0);
        let sequence = on_disk.max(*last).checked_add(1).ok_or_else(|| {
            Error::msg(
                ErrorType::Validation,
                format!("no sequence numbers are left for '{database}' on {date}"),
            )
        })?;
        *last = sequence;

        let name = BackupName::new(date, sequence, database);
        trace!("Issued backup name {name}");
        Ok(name)
    }

    /// Joins the backup directory with `file_name`.
    pub fn resolve_backup_path(&self, file_name: &str) -> PathBuf {
        self.backup_dir.join(file_name)
    }

    /// Lists the archives belonging to `database`, most recently modified first. Ties are broken
    /// by date and sequence number, then by file name.
    ///
    /// # Errors
    /// - `NotConfigured` if the backup directory does not exist.
    /// - `Io` if the directory or a file's metadata cannot be read.
    pub async fn list_backups(&self, database: &str) -> Result<Vec<BackupFile>> {
        if !utils::is_dir(&self.backup_dir).await {
            return Err(Error::msg(
                ErrorType::NotConfigured,
                format!(
                    "The backup directory '{}' does not exist",
                    self.backup_dir.display()
                ),
            ));
        }
        let mut files = self.scan(database).await.pub_result(ErrorType::Io)?;
        files.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| (b.name.date, b.name.sequence).cmp(&(a.name.date, a.name.sequence)))
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(files)
    }

    /// Deletes every archive of `database` beyond the `limit` most recent ones and returns the
    /// number deleted.
    ///
    /// Files are deleted one at a time. If a delete fails, the error is returned and the files
    /// already deleted stay deleted.
    pub async fn trim_backups(&self, database: &str, limit: u32) -> Result<usize> {
        let files = self.list_backups(database).await?;
        remove_all(files.iter().skip(limit as usize)).await
    }

    async fn scan(&self, database: &str) -> Res<Vec<BackupFile>> {
        let mut files = Vec::new();
        let mut dir = utils::read_dir(&self.backup_dir).await?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .context("Failed to read directory entry")?
        {
            let os_name = entry.file_name();
            let Some(file_name) = os_name.to_str() else {
                continue;
            };
            let Some(name) = BackupName::parse(file_name) else {
                continue;
            };
            if name.database != database {
                continue;
            }
            let path = entry.path();
            let metadata = entry
                .metadata()
                .await
                .with_context(|| format!("Unable to read metadata of {}", path.display()))?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .with_context(|| format!("Unable to read mtime of {}", path.display()))?;
            files.push(BackupFile {
                name,
                file_name: file_name.to_string(),
                path,
                modified,
            });
        }
        Ok(files)
    }
}

async fn remove_all(files: impl Iterator<Item = &BackupFile>) -> Result<usize> {
    let mut deleted = 0;
    for file in files {
        utils::remove(&file.path)
            .await
            .pub_result(ErrorType::Io)?;
        debug!("Deleted old backup {}", file.path.display());
        deleted += 1;
    }
    Ok(deleted)
}

/// Parses `s` as an unsigned number of exactly `len` ASCII digits.
fn digits(s: &str, len: usize) -> Option<u32> {
    if s.len() != len || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
