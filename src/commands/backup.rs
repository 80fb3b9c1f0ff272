//! Backup, list, restore and trim command handlers.

use crate::backup::{BackupOutcome, Backups};
use crate::catalog::retention_limit;
use crate::commands::{load, Out};
use crate::runner::Mode;
use crate::{Result, Settings};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// One line of `lifering list` output.
#[derive(Debug, Clone, Eq, PartialEq, Serialize)]
pub struct ListedBackup {
    pub index: usize,
    pub file_name: String,
    pub modified: DateTime<Utc>,
}

/// Backs up the database `name` now and trims its old backups.
pub async fn backup(settings: &Settings, mode: Mode, name: &str) -> Result<Out<BackupOutcome>> {
    let record = load(settings, name).await?;
    let outcome = Backups::from_settings(settings, mode)?
        .backup(&record)
        .await?;
    let message = format!(
        "Backup file created {}{}",
        outcome.absolute_path.display(),
        removed(outcome.trimmed)
    );
    Ok(Out::new(message, outcome))
}

/// Lists the backups of the database `name`, most recent first.
pub async fn list(settings: &Settings, mode: Mode, name: &str) -> Result<Out<Vec<ListedBackup>>> {
    let record = load(settings, name).await?;
    let files = Backups::from_settings(settings, mode)?.list(&record).await?;
    if files.is_empty() {
        return Ok(Out::new(
            format!("No backups have been made, run 'lifering backup {name}' to create one"),
            Vec::new(),
        ));
    }

    let listed: Vec<ListedBackup> = files
        .iter()
        .enumerate()
        .map(|(index, f)| ListedBackup {
            index,
            file_name: f.file_name().to_string(),
            modified: f.modified().into(),
        })
        .collect();
    let mut message = String::from("Available backups to restore:");
    for item in &listed {
        message.push_str(&format!("\n{}: {}", item.index, item.file_name));
    }
    Ok(Out::new(message, listed))
}

/// Restores the database `name` from the backup at `index` in `list` order.
pub async fn restore(
    settings: &Settings,
    mode: Mode,
    name: &str,
    index: usize,
) -> Result<Out<PathBuf>> {
    let record = load(settings, name).await?;
    let path = Backups::from_settings(settings, mode)?
        .restore(&record, index)
        .await?;
    Ok(Out::new(
        format!("Successfully restored data using {}", path.display()),
        path,
    ))
}

/// Removes backups of the database `name` beyond `limit`, or beyond its configured limit.
///
/// # Errors
/// - `Validation` if `limit` is negative.
pub async fn trim(
    settings: &Settings,
    mode: Mode,
    name: &str,
    limit: Option<i64>,
) -> Result<Out<usize>> {
    let limit = limit.map(retention_limit).transpose()?;
    let record = load(settings, name).await?;
    let deleted = Backups::from_settings(settings, mode)?
        .trim(&record, limit)
        .await?;
    Ok(Out::new(
        format!(
            "Removed {} backup{} of '{name}'",
            deleted,
            if deleted == 1 { "" } else { "s" }
        ),
        deleted,
    ))
}

fn removed(count: usize) -> String {
    match count {
        0 => String::new(),
        1 => ", removed 1 old backup".to_string(),
        n => format!(", removed {n} old backups"),
    }
}
