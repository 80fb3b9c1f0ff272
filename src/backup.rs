//! Creating, restoring and rotating backups for one database at a time.

use crate::catalog::{BackupFile, Catalog};
use crate::error::{Error, ErrorType};
use crate::lock::DatabaseLocks;
use crate::record::DatabaseRecord;
use crate::runner::{DryRun, DumpRunner, Mode, PgTools, RestoreRunner};
use crate::{Result, Settings};
use chrono::Local;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// The archive produced by `Backups::backup`.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct BackupOutcome {
    pub absolute_path: PathBuf,
    pub file_name: String,
    /// The number of old archives deleted afterward to honor the retention limit.
    pub trimmed: usize,
}

/// Runs backups and restores through the configured `DumpRunner` and `RestoreRunner`, keeping the
/// backup directory trimmed to each record's limit.
///
/// Clones share the catalog, runners and locks.
#[derive(Clone)]
pub struct Backups {
    catalog: Catalog,
    dump: Arc<dyn DumpRunner>,
    restore: Arc<dyn RestoreRunner>,
    locks: DatabaseLocks,
}

impl Backups {
    pub fn new(
        catalog: Catalog,
        dump: Arc<dyn DumpRunner>,
        restore: Arc<dyn RestoreRunner>,
    ) -> Self {
        Self {
            catalog,
            dump,
            restore,
            locks: DatabaseLocks::new(),
        }
    }

    /// Creates a `Backups` over the configured backup directory with the runners for `mode`.
    pub fn from_settings(settings: &Settings, mode: Mode) -> Result<Self> {
        let catalog = settings.catalog()?;
        Ok(match mode {
            Mode::Postgres => Self::new(catalog, Arc::new(PgTools), Arc::new(PgTools)),
            Mode::DryRun => {
                let dry = DryRun::new();
                Self::new(catalog, Arc::new(dry.clone()), Arc::new(dry))
            }
        })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Dumps the database into a new archive, then trims its archives to `backup_limit`.
    ///
    /// When the dump runner does not write archives (dry run) nothing is trimmed and `trimmed` is
    /// 0.
    ///
    /// # Errors
    /// - `Subprocess` if the dump fails, in which case nothing is trimmed.
    /// - `Io` or `NotConfigured` from the catalog.
    pub async fn backup(&self, record: &DatabaseRecord) -> Result<BackupOutcome> {
        let _guard = self.locks.acquire(record.name()).await;

        let name = self
            .catalog
            .next_backup_name(record.name(), Local::now())
            .await?;
        let file_name = name.to_string();
        let absolute_path = self.catalog.resolve_backup_path(&file_name);
        debug!("Backing up {} to {}", record.name(), absolute_path.display());

        self.dump
            .dump(record.user(), record.name(), &absolute_path)
            .await?;

        let trimmed = if self.dump.writes_archives() {
            self.catalog
                .trim_backups(record.name(), record.backup_limit())
                .await?
        } else {
            debug!("Dry run: not trimming the backups of {}", record.name());
            0
        };

        Ok(BackupOutcome {
            absolute_path,
            file_name,
            trimmed,
        })
    }

    /// The archives of the database, most recent first.
    pub async fn list(&self, record: &DatabaseRecord) -> Result<Vec<BackupFile>> {
        self.catalog.list_backups(record.name()).await
    }

    /// Restores the database from the archive at `index` in `list` order and returns its path.
    ///
    /// # Errors
    /// - `Validation` if there is no archive at `index`. Nothing is run in that case.
    /// - `Subprocess` if the restore fails.
    pub async fn restore(&self, record: &DatabaseRecord, index: usize) -> Result<PathBuf> {
        let _guard = self.locks.acquire(record.name()).await;

        let files = self.catalog.list_backups(record.name()).await?;
        let file = files.get(index).ok_or_else(|| {
            Error::msg(
                ErrorType::Validation,
                format!("no backup at index {index} for '{}'", record.name()),
            )
        })?;
        let path = self.catalog.resolve_backup_path(file.file_name());
        debug!("Restoring {} from {}", record.name(), path.display());

        self.restore
            .restore(record.user(), record.name(), &path)
            .await?;
        Ok(path)
    }

    /// Deletes archives beyond `limit`, or beyond the record's `backup_limit` when `limit` is
    /// `None`, and returns the number deleted.
    pub async fn trim(&self, record: &DatabaseRecord, limit: Option<u32>) -> Result<usize> {
        let _guard = self.locks.acquire(record.name()).await;
        let limit = limit.unwrap_or(record.backup_limit());
        self.catalog.trim_backups(record.name(), limit).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordPatch;
    use crate::test::{TestEnv, NAME};
    use std::path::Path;

    /// Writes an empty archive to the target, like a successful `pg_dump` would.
    struct TouchDump;

    #[async_trait::async_trait]
    impl DumpRunner for TouchDump {
        async fn dump(&self, _user: &str, _name: &str, target: &Path) -> Result<()> {
            std::fs::write(target, b"").unwrap();
            Ok(())
        }
    }

    struct FailingDump;

    #[async_trait::async_trait]
    impl DumpRunner for FailingDump {
        async fn dump(&self, _user: &str, _name: &str, _target: &Path) -> Result<()> {
            Err(Error::msg(ErrorType::Subprocess, "pg_dump failed with exit status: 1"))
        }
    }

    fn record(limit: u32) -> DatabaseRecord {
        let mut record = DatabaseRecord::new(NAME).unwrap();
        record
            .fill(RecordPatch {
                user: Some("testuser".to_string()),
                hours: Some(12),
                backup_limit: Some(limit),
            })
            .unwrap();
        record
    }

    fn dry_backups(env: &TestEnv) -> (Backups, DryRun) {
        let dry = DryRun::new();
        let backups = Backups::new(env.catalog(), Arc::new(dry.clone()), Arc::new(dry.clone()));
        (backups, dry)
    }

    #[tokio::test]
    async fn test_dry_run_backup() {
        let env = TestEnv::new().await;
        let (backups, dry) = dry_backups(&env);

        let outcome = backups.backup(&record(10)).await.unwrap();
        assert!(outcome
            .absolute_path
            .to_string_lossy()
            .ends_with(&format!("-{NAME}.tar")));
        assert_eq!(outcome.absolute_path, env.backup_dir().join(&outcome.file_name));
        assert!(!outcome.absolute_path.exists());
        assert_eq!(outcome.trimmed, 0);
        assert_eq!(dry.dumps(), 1);
        assert_eq!(dry.restores(), 0);
    }

    #[tokio::test]
    async fn test_dry_run_backup_keeps_archives() {
        let env = TestEnv::new().await;
        env.seed_fixture();
        let backups = Backups::from_settings(env.settings(), Mode::DryRun).unwrap();

        let outcome = backups.backup(&record(1)).await.unwrap();
        assert_eq!(outcome.trimmed, 0);
        assert_eq!(backups.list(&record(1)).await.unwrap().len(), 3);
        for (file_name, _) in crate::test::FIXTURE {
            assert!(env.backup_dir().join(file_name).is_file());
        }
    }

    #[tokio::test]
    async fn test_dry_run_backups_are_distinct() {
        let env = TestEnv::new().await;
        let (backups, _) = dry_backups(&env);
        let record = record(10);

        let (a, b) = tokio::join!(backups.backup(&record), backups.backup(&record));
        assert_ne!(a.unwrap().file_name, b.unwrap().file_name);
    }

    #[tokio::test]
    async fn test_backup_trims_to_limit() {
        let env = TestEnv::new().await;
        env.seed_fixture();
        let dry = DryRun::new();
        let backups = Backups::new(env.catalog(), Arc::new(TouchDump), Arc::new(dry));

        let outcome = backups.backup(&record(2)).await.unwrap();
        assert!(outcome.absolute_path.is_file());
        assert_eq!(outcome.trimmed, 2);

        let files = backups.list(&record(2)).await.unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.file_name()).collect();
        assert_eq!(names, vec![outcome.file_name.as_str(), "1992-02-23-001-testdb.tar"]);
    }

    #[tokio::test]
    async fn test_failed_backup_does_not_trim() {
        let env = TestEnv::new().await;
        env.seed_fixture();
        let backups = Backups::new(env.catalog(), Arc::new(FailingDump), Arc::new(DryRun::new()));

        let err = backups.backup(&record(0)).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Subprocess);
        assert_eq!(backups.list(&record(0)).await.unwrap().len(), 3);

        // The lock was released on the error path
        assert_eq!(backups.trim(&record(0), None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_restore_index_out_of_range() {
        let env = TestEnv::new().await;
        env.seed_fixture();
        let (backups, dry) = dry_backups(&env);

        let err = backups.restore(&record(10), 5).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        assert!(err.to_string().contains("no backup at index 5 for 'testdb'"));

        let err = backups.restore(&record(10), 3).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        assert_eq!(dry.restores(), 0);
    }

    #[tokio::test]
    async fn test_restore_in_range() {
        let env = TestEnv::new().await;
        env.seed_fixture();
        let (backups, dry) = dry_backups(&env);

        let path = backups.restore(&record(10), 1).await.unwrap();
        assert_eq!(path, env.backup_dir().join("1992-01-23-001-testdb.tar"));
        assert_eq!(dry.restores(), 1);
        assert_eq!(dry.dumps(), 0);
    }

    #[tokio::test]
    async fn test_restore_empty() {
        let env = TestEnv::new().await;
        let (backups, _) = dry_backups(&env);
        let err = backups.restore(&record(10), 0).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
    }

    #[tokio::test]
    async fn test_trim_uses_record_limit() {
        let env = TestEnv::new().await;
        env.seed_fixture();
        let (backups, _) = dry_backups(&env);

        assert_eq!(backups.trim(&record(2), None).await.unwrap(), 1);
        assert_eq!(backups.trim(&record(2), Some(1)).await.unwrap(), 1);
        assert_eq!(backups.list(&record(2)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_from_settings_dry_run() {
        let env = TestEnv::new().await;
        let backups = Backups::from_settings(env.settings(), Mode::DryRun).unwrap();
        let outcome = backups.backup(&record(10)).await.unwrap();
        assert!(outcome.file_name.ends_with("-testdb.tar"));
        assert_eq!(backups.catalog().backup_dir(), env.backup_dir());
    }
}
