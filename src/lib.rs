pub mod args;
pub mod backup;
pub mod catalog;
pub mod commands;
mod error;
mod lock;
pub mod record;
pub mod runner;
pub mod schedule;
mod settings;
mod utils;

#[cfg(test)]
mod test;

pub use backup::{BackupOutcome, Backups};
pub use catalog::{BackupFile, BackupName, Catalog};
pub use error::{Error, ErrorType, Result};
pub use lock::DatabaseLocks;
pub use record::{DatabaseRecord, RecordPatch, SerializedRecord};
pub use runner::{DryRun, DumpRunner, Mode, PgTools, RestoreRunner};
pub use settings::Settings;
