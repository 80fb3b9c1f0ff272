//! Shared test utilities for creating test environments.
//!
//! This module is only compiled when running tests (`#[cfg(test)]`).

use crate::catalog::Catalog;
use crate::Settings;
use chrono::NaiveDate;
use std::path::Path;
use std::time::SystemTime;
use tempfile::TempDir;

/// The database name used throughout the tests.
pub const NAME: &str = "testdb";

/// Backup files seeded by `TestEnv::seed_fixture`, with their modification dates. Three belong to
/// `testdb` and two to `OTHER`.
pub const FIXTURE: &[(&str, &str)] = &[
    ("1992-01-23-001-OTHER.tar", "1992-01-23"),
    ("1992-02-23-001-testdb.tar", "1992-02-23"),
    ("1992-02-23-001-OTHER.tar", "1992-02-23"),
    ("1992-01-01-001-testdb.tar", "1992-01-01"),
    ("1992-01-23-001-testdb.tar", "1992-01-23"),
];

/// Test environment that sets up a lifering home directory with initialized settings.
/// Holds TempDir to keep the directory alive for the duration of the test.
pub struct TestEnv {
    _temp_dir: TempDir,
    settings: Settings,
}

impl TestEnv {
    pub async fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("lifering");
        let settings = Settings::create(&root, None).await.unwrap();
        Self {
            _temp_dir: temp_dir,
            settings,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn backup_dir(&self) -> &Path {
        self.settings.backup_dir().unwrap()
    }

    pub fn catalog(&self) -> Catalog {
        self.settings.catalog().unwrap()
    }

    /// Creates an empty file named `file_name` in the backup directory, last modified at midnight
    /// UTC of `modified` (`YYYY-MM-DD`).
    pub fn seed_backup(&self, file_name: &str, modified: &str) {
        let path = self.backup_dir().join(file_name);
        let file = std::fs::File::create(&path).unwrap();
        let date = NaiveDate::parse_from_str(modified, "%Y-%m-%d").unwrap();
        let mtime: SystemTime = date.and_hms_opt(0, 0, 0).unwrap().and_utc().into();
        file.set_modified(mtime).unwrap();
    }

    /// Seeds every file in `FIXTURE`.
    pub fn seed_fixture(&self) {
        for (file_name, modified) in FIXTURE {
            self.seed_backup(file_name, modified);
        }
    }
}
