use crate::args::SetupArgs;
use crate::commands::{load, Out};
use crate::record::{DatabaseRecord, RecordPatch, SerializedRecord};
use crate::{Result, Settings};
use std::path::Path;

/// Creates the home directory, its settings and backup directories, and `global.json`.
///
/// # Arguments
/// - `home` - The directory that will be the root of the lifering data, e.g. `$HOME/lifering`
/// - `backup_dir` - Where archives are written, defaults to `<home>/backups`
///
/// # Errors
/// - Returns an error if any file operations fail.
pub async fn init(home: &Path, backup_dir: Option<&Path>) -> Result<Out<()>> {
    let settings = Settings::create(home, backup_dir).await?;
    Ok(format!(
        "lifering set up successfully\nBackup directory: {}\nSettings directory: {}",
        settings.backup_dir()?.display(),
        settings.settings_dir()?.display()
    )
    .into())
}

/// Creates, or replaces, the configuration file for a database.
pub async fn setup(settings: &Settings, args: &SetupArgs) -> Result<Out<SerializedRecord>> {
    let mut record = DatabaseRecord::new(args.name())?;
    record.fill(RecordPatch {
        user: Some(args.user().to_string()),
        hours: Some(args.hours()),
        backup_limit: Some(args.backup_limit()),
    })?;
    let saved = record.save(settings).await?;
    Ok(Out::new(
        format!("Database file created for '{}'", saved.name),
        saved,
    ))
}

/// Shows the saved configuration for a database.
pub async fn show(settings: &Settings, name: &str) -> Result<Out<SerializedRecord>> {
    let record = load(settings, name).await?;
    let data = record.serialize();
    let message = format!(
        "Database '{}': user '{}', backed up daily at {:02}:00 ({}), keeping {} backup(s)",
        data.name, data.user, data.hours, data.cron_expression, data.backup_limit
    );
    Ok(Out::new(message, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorType;
    use crate::test::{TestEnv, NAME};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_init() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("home");
        let out = init(&home, None).await.unwrap();
        assert!(out.message().contains("Backup directory"));
        assert!(Settings::load(&home).await.is_ok());
    }

    #[tokio::test]
    async fn test_setup_then_show() {
        let env = TestEnv::new().await;
        let args = SetupArgs::new(NAME, "testuser", 3, 7);
        let out = setup(env.settings(), &args).await.unwrap();
        assert_eq!(out.message(), "Database file created for 'testdb'");

        let out = show(env.settings(), NAME).await.unwrap();
        let data = out.structure().unwrap();
        assert_eq!(data.user, "testuser");
        assert_eq!(data.hours, 3);
        assert_eq!(data.backup_limit, 7);
        assert_eq!(data.cron_expression, "0 3 * * *");
        assert!(out.message().contains("03:00"));
    }

    #[tokio::test]
    async fn test_setup_rejects_bad_input() {
        let env = TestEnv::new().await;
        let err = setup(env.settings(), &SetupArgs::new(NAME, "u", 24, 7))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        let err = setup(env.settings(), &SetupArgs::new("", "u", 1, 7))
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Validation);
        assert!(!env.settings().database_file(NAME).unwrap().exists());
    }

    #[tokio::test]
    async fn test_show_not_set_up() {
        let env = TestEnv::new().await;
        let err = show(env.settings(), NAME).await.unwrap_err();
        assert_eq!(err.error_type(), ErrorType::NotFound);
    }
}
