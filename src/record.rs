//! The per-database configuration record and its persistence.

use crate::error::{Error, ErrorType, IntoResult};
use crate::settings::Settings;
use crate::{utils, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The hour at which a newly created record is backed up.
pub const DEFAULT_HOURS: u8 = 12;

/// The number of backups a newly created record keeps.
pub const DEFAULT_BACKUP_LIMIT: u32 = 20;

/// The largest retention limit `fill` will accept.
pub const MAX_BACKUP_LIMIT: u32 = 100;

/// The backup configuration for one managed database.
///
/// The name is fixed at construction. Only `user`, `hours` and `backup_limit` can change
/// afterward, and only through `fill`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DatabaseRecord {
    name: String,
    user: String,
    hours: u8,
    backup_limit: u32,
}

/// A partial update for a `DatabaseRecord`.
///
/// Any JSON object deserializes into a `RecordPatch`: keys other than `user`, `hours` and
/// `backupLimit` (or the older `backup_limit`) are ignored.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours: Option<u8>,
    #[serde(default, alias = "backup_limit", skip_serializing_if = "Option::is_none")]
    pub backup_limit: Option<u32>,
}

/// The persisted shape of a `DatabaseRecord`, written to `database-<name>.json`.
///
/// ```json
/// {
///   "name": "testdb",
///   "user": "postgres",
///   "hours": 12,
///   "backupLimit": 20,
///   "cronExpression": "0 12 * * *"
/// }
/// ```
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SerializedRecord {
    pub name: String,
    pub user: String,
    pub hours: u8,
    pub backup_limit: u32,
    pub cron_expression: String,
}

impl DatabaseRecord {
    /// Creates a record for `name` with an empty user and the default schedule and limit.
    ///
    /// # Errors
    /// - `Validation` if `name` is empty, contains a path separator or NUL, or starts with `.`.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            user: String::new(),
            hours: DEFAULT_HOURS,
            backup_limit: DEFAULT_BACKUP_LIMIT,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn hours(&self) -> u8 {
        self.hours
    }

    pub fn backup_limit(&self) -> u32 {
        self.backup_limit
    }

    pub fn cron_expression(&self) -> String {
        cron_expression(self.hours)
    }

    /// Applies the fields that are present in `patch`. Nothing is changed if any of them is out
    /// of range.
    ///
    /// # Errors
    /// - `Validation` if `hours` is greater than 23 or `backup_limit` is greater than 100.
    pub fn fill(&mut self, patch: RecordPatch) -> Result<()> {
        if let Some(hours) = patch.hours {
            if hours > 23 {
                return Err(Error::msg(
                    ErrorType::Validation,
                    format!("hours has to be 0-23, got {hours}"),
                ));
            }
        }
        if let Some(limit) = patch.backup_limit {
            if limit > MAX_BACKUP_LIMIT {
                return Err(Error::msg(
                    ErrorType::Validation,
                    format!("backup limit has to be 0-{MAX_BACKUP_LIMIT}, got {limit}"),
                ));
            }
        }
        if let Some(user) = patch.user {
            self.user = user;
        }
        if let Some(hours) = patch.hours {
            self.hours = hours;
        }
        if let Some(limit) = patch.backup_limit {
            self.backup_limit = limit;
        }
        Ok(())
    }

    /// Produces the persisted shape, including the derived cron expression.
    pub fn serialize(&self) -> SerializedRecord {
        SerializedRecord {
            name: self.name.clone(),
            user: self.user.clone(),
            hours: self.hours,
            backup_limit: self.backup_limit,
            cron_expression: self.cron_expression(),
        }
    }

    /// Reads `database-<name>.json` from the settings directory and merges it into `self`.
    ///
    /// # Errors
    /// - `NotFound` if the file is missing or malformed.
    /// - `Validation` if the file holds out-of-range values.
    pub async fn load(&mut self, settings: &Settings) -> Result<()> {
        let path = settings.database_file(&self.name)?;
        debug!("Loading database settings from {}", path.display());
        let patch: RecordPatch = utils::deserialize(&path).await.map_err(|e| {
            Error::new(
                ErrorType::NotFound,
                e.context(format!(
                    "no such configuration for '{}', has it been set up?",
                    self.name
                )),
            )
        })?;
        self.fill(patch)
    }

    /// Writes `serialize()` to `database-<name>.json` in the settings directory and returns it.
    ///
    /// # Errors
    /// - `Io` if the file cannot be written.
    pub async fn save(&self, settings: &Settings) -> Result<SerializedRecord> {
        let path = settings.database_file(&self.name)?;
        let data = self.serialize();
        utils::serialize(&path, &data)
            .await
            .pub_result(ErrorType::Io)?;
        debug!("Saved database settings to {}", path.display());
        Ok(data)
    }
}

/// The cron expression for a daily backup at `hours`:00.
pub fn cron_expression(hours: u8) -> String {
    format!("0 {hours} * * *")
}

fn validate_name(name: &str) -> Result<()> {
    let problem = if name.is_empty() {
        Some("a database name is required")
    } else if name.contains(['/', '\\', '\0']) {
        Some("a database name cannot contain path separators")
    } else if name.starts_with('.') {
        Some("a database name cannot start with '.'")
    } else {
        None
    };
    match problem {
        Some(problem) => Err(Error::msg(
            ErrorType::Validation,
            format!("{problem}: '{name}'"),
        )),
        None => Ok(()),
    }
}
