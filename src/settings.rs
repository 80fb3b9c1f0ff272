//! Global settings handling for lifering.
//!
//! The settings file is stored at `$LIFERING_HOME/settings/global.json` and contains the two
//! directories the rest of the program needs: where backup archives are written and where the
//! per-database configuration files live.

use crate::catalog::Catalog;
use crate::error::{Error, ErrorType, IntoResult, Res};
use crate::{utils, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const SETTINGS: &str = "settings";
const BACKUPS: &str = "backups";
const GLOBAL_JSON: &str = "global.json";
const DB_PREFIX: &str = "database-";

/// The `Settings` object represents the global configuration of the app. You instantiate it by
/// providing the path to `$LIFERING_HOME` and from there it loads
/// `$LIFERING_HOME/settings/global.json`. Relative paths in that file are resolved against
/// `$LIFERING_HOME`.
#[derive(Debug, Clone)]
pub struct Settings {
    root: PathBuf,
    settings_path: PathBuf,
    backup_dir: Option<PathBuf>,
    settings_dir: Option<PathBuf>,
}

impl Settings {
    /// Creates the home directory, the settings and backup directories, and writes an initial
    /// `global.json`. If `backup_dir` is `None`, backups go to `$LIFERING_HOME/backups`.
    ///
    /// Running this against an existing home overwrites `global.json` but leaves database files
    /// and backups in place.
    ///
    /// # Errors
    /// - Returns an `Io` error if any file operations fail.
    pub async fn create(home: impl Into<PathBuf>, backup_dir: Option<&Path>) -> Result<Self> {
        Self::create_inner(home.into(), backup_dir)
            .await
            .pub_result(ErrorType::Io)
    }

    async fn create_inner(maybe_relative: PathBuf, backup_dir: Option<&Path>) -> Res<Self> {
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the lifering home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;

        let settings_dir = root.join(SETTINGS);
        utils::make_dir(&settings_dir).await?;

        let backup_dir = match backup_dir {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => root.join(p),
            None => root.join(BACKUPS),
        };
        utils::make_dir(&backup_dir)
            .await
            .context("Unable to create the backup directory")?;
        let backup_dir = utils::canonicalize(&backup_dir).await?;

        let file = SettingsFile {
            backup_dir: Some(backup_dir.clone()),
            settings_dir: Some(settings_dir.clone()),
        };
        let settings_path = settings_dir.join(GLOBAL_JSON);
        utils::serialize(&settings_path, &file)
            .await
            .context("Unable to write the settings file")?;

        Ok(Self {
            root,
            settings_path,
            backup_dir: Some(backup_dir),
            settings_dir: Some(settings_dir),
        })
    }

    /// This will
    /// - validate that `home` exists and that the settings file exists
    /// - load the settings file
    /// - validate that the configured directories exist
    ///
    /// # Errors
    /// - Returns a `NotConfigured` error if the home directory or settings file are missing, or if
    ///   a configured directory does not exist.
    pub async fn load(home: impl Into<PathBuf>) -> Result<Self> {
        let maybe_relative = home.into();
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("lifering home is missing, run 'lifering init'")
            .pub_result(ErrorType::NotConfigured)?;

        let settings_path = root.join(SETTINGS).join(GLOBAL_JSON);
        if !utils::is_file(&settings_path).await {
            return Err(Error::msg(
                ErrorType::NotConfigured,
                format!(
                    "The settings file is missing '{}', run 'lifering init'",
                    settings_path.display()
                ),
            ));
        }
        let file: SettingsFile = utils::deserialize(&settings_path)
            .await
            .pub_result(ErrorType::NotConfigured)?;

        let settings = Self {
            backup_dir: file.backup_dir.map(|p| resolve(&root, p)),
            settings_dir: file.settings_dir.map(|p| resolve(&root, p)),
            root,
            settings_path,
        };
        for dir in [&settings.backup_dir, &settings.settings_dir]
            .into_iter()
            .flatten()
        {
            if !utils::is_dir(dir).await {
                return Err(Error::msg(
                    ErrorType::NotConfigured,
                    format!("The directory '{}' is missing", dir.display()),
                ));
            }
        }
        Ok(settings)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings_path(&self) -> &Path {
        &self.settings_path
    }

    /// The directory holding all backup archives.
    ///
    /// # Errors
    /// - `NotConfigured` if `backup_dir` is absent from `global.json`.
    pub fn backup_dir(&self) -> Result<&Path> {
        self.backup_dir
            .as_deref()
            .ok_or_else(|| Error::msg(ErrorType::NotConfigured, "No backup directory set"))
    }

    /// The directory holding the per-database configuration files.
    ///
    /// # Errors
    /// - `NotConfigured` if `settings_dir` is absent from `global.json`.
    pub fn settings_dir(&self) -> Result<&Path> {
        self.settings_dir
            .as_deref()
            .ok_or_else(|| Error::msg(ErrorType::NotConfigured, "No settings directory set"))
    }

    /// The path of the configuration file for the database `name`, i.e.
    /// `<settings_dir>/database-<name>.json`.
    pub fn database_file(&self, name: &str) -> Result<PathBuf> {
        Ok(self.settings_dir()?.join(database_file_name(name)))
    }

    /// Creates a new `Catalog` over the backup directory.
    pub fn catalog(&self) -> Result<Catalog> {
        Ok(Catalog::new(self.backup_dir()?))
    }
}

pub(crate) fn database_file_name(name: &str) -> String {
    format!("{DB_PREFIX}{name}.json")
}

fn resolve(root: &Path, p: PathBuf) -> PathBuf {
    if p.is_absolute() {
        return p;
    }
    root.join(p)
}

/// Represents the serialization and deserialization format of the settings file.
///
/// Example:
/// ```json
/// {
///   "backup_dir": "/home/me/lifering/backups",
///   "settings_dir": "/home/me/lifering/settings"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
struct SettingsFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    backup_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    settings_dir: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_settings_create() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("lifering_home");

        let settings = Settings::create(&home, None).await.unwrap();

        assert!(settings.settings_path().is_file());
        assert!(settings.backup_dir().unwrap().is_dir());
        assert!(settings.settings_dir().unwrap().is_dir());
        assert!(settings.backup_dir().unwrap().ends_with(BACKUPS));
    }

    #[tokio::test]
    async fn test_settings_create_then_load() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("h");
        let custom = dir.path().join("elsewhere");

        let created = Settings::create(&home, Some(custom.as_path())).await.unwrap();
        let loaded = Settings::load(&home).await.unwrap();

        assert_eq!(created.root(), loaded.root());
        assert_eq!(created.backup_dir().unwrap(), loaded.backup_dir().unwrap());
        assert_eq!(
            created.settings_dir().unwrap(),
            loaded.settings_dir().unwrap()
        );
        assert!(loaded.backup_dir().unwrap().ends_with("elsewhere"));
    }

    #[tokio::test]
    async fn test_settings_load_uninitialized() {
        let dir = TempDir::new().unwrap();
        let err = Settings::load(dir.path()).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::NotConfigured);

        let err = Settings::load(dir.path().join("nope")).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::NotConfigured);
    }

    #[tokio::test]
    async fn test_settings_without_backup_dir() {
        let dir = TempDir::new().unwrap();
        let settings_dir = dir.path().join(SETTINGS);
        std::fs::create_dir_all(&settings_dir).unwrap();
        std::fs::write(
            settings_dir.join(GLOBAL_JSON),
            r#"{ "settings_dir": "settings" }"#,
        )
        .unwrap();

        let settings = Settings::load(dir.path()).await.unwrap();
        assert!(settings.settings_dir().unwrap().is_dir());
        assert_eq!(
            settings.backup_dir().unwrap_err().error_type(),
            ErrorType::NotConfigured
        );
        assert_eq!(
            settings.catalog().unwrap_err().error_type(),
            ErrorType::NotConfigured
        );
    }

    #[test]
    fn test_database_file_name() {
        assert_eq!(database_file_name("testdb"), "database-testdb.json");
    }
}
