use crate::backup::Backups;
use crate::commands::{load, Out};
use crate::runner::Mode;
use crate::{schedule, Result, Settings};

/// Backs up the database `name` every day at its configured hour. This only returns if the
/// configuration cannot be loaded.
pub async fn schedule(settings: &Settings, mode: Mode, name: &str) -> Result<Out<()>> {
    let record = load(settings, name).await?;
    let backups = Backups::from_settings(settings, mode)?;
    schedule::run(backups, record).await;
    Ok("Scheduler stopped".into())
}
