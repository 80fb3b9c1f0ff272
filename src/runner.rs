//! The external tools that produce and consume backup archives.
//!
//! `DumpRunner` and `RestoreRunner` are the only places where lifering reaches outside of the
//! process. `PgTools` runs the real `pg_dump` and `pg_restore` binaries. `DryRun` does nothing,
//! which lets the whole app run top-to-bottom without a PostgreSQL server.

use crate::error::{Error, ErrorType};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, trace};

/// Setting `LIFERING_DRY_RUN` to a non-empty value selects `Mode::DryRun`.
pub const DRY_RUN_ENV: &str = "LIFERING_DRY_RUN";

/// Whether to run the real PostgreSQL tools or nothing at all.
#[derive(Debug, Default, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Postgres,
    DryRun,
}

serde_plain::derive_display_from_serialize!(Mode);
serde_plain::derive_fromstr_from_deserialize!(Mode);

impl Mode {
    /// `Mode::DryRun` if `LIFERING_DRY_RUN` is set and non-empty, otherwise `Mode::Postgres`.
    pub fn from_env() -> Self {
        match std::env::var(DRY_RUN_ENV) {
            Ok(value) if !value.is_empty() => Mode::DryRun,
            _ => Mode::Postgres,
        }
    }
}

/// Writes an archive of database `name` to `target`.
#[async_trait::async_trait]
pub trait DumpRunner: Send + Sync {
    async fn dump(&self, user: &str, name: &str, target: &Path) -> Result<()>;

    /// `false` when `dump` only pretends. Nothing that follows a dump, like trimming, should
    /// touch the backup directory in that case.
    fn writes_archives(&self) -> bool {
        true
    }
}

/// Restores database `name` from the archive at `source`.
#[async_trait::async_trait]
pub trait RestoreRunner: Send + Sync {
    async fn restore(&self, user: &str, name: &str, source: &Path) -> Result<()>;
}

/// Runs `pg_dump` and `pg_restore` from the `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgTools;

impl PgTools {
    fn dump_args(user: &str, name: &str, target: &Path) -> Vec<OsString> {
        vec![
            format!("--username={user}").into(),
            name.into(),
            "-f".into(),
            target.into(),
            "-F".into(),
            "t".into(),
        ]
    }

    fn restore_args(user: &str, name: &str, source: &Path) -> Vec<OsString> {
        vec![
            "-c".into(),
            "-U".into(),
            user.into(),
            "-d".into(),
            name.into(),
            "-v".into(),
            source.into(),
            "-W".into(),
        ]
    }
}

#[async_trait::async_trait]
impl DumpRunner for PgTools {
    async fn dump(&self, user: &str, name: &str, target: &Path) -> Result<()> {
        run("pg_dump", Self::dump_args(user, name, target)).await
    }
}

#[async_trait::async_trait]
impl RestoreRunner for PgTools {
    async fn restore(&self, user: &str, name: &str, source: &Path) -> Result<()> {
        run("pg_restore", Self::restore_args(user, name, source)).await
    }
}

/// Spawns `program` and waits for it. stdin is inherited so that `pg_restore -W` can prompt for
/// a password, stderr is captured for the error message.
///
/// # Errors
/// - `Subprocess` if the program cannot be spawned or exits unsuccessfully.
pub(crate) async fn run(program: &str, args: Vec<OsString>) -> Result<()> {
    debug!("Running {program} {args:?}");
    let output = Command::new(program)
        .args(&args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| {
            Error::new(
                ErrorType::Subprocess,
                anyhow::Error::new(e).context(format!("Unable to run {program}")),
            )
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::msg(
            ErrorType::Subprocess,
            format!("{program} failed with {}: {}", output.status, stderr.trim()),
        ));
    }
    trace!("{program} finished with {}", output.status);
    Ok(())
}

/// A runner that never spawns anything. It counts how many times it was asked to run so tests can
/// assert on it; clones share the counts.
#[derive(Debug, Default, Clone)]
pub struct DryRun {
    dumps: Arc<AtomicUsize>,
    restores: Arc<AtomicUsize>,
}

impl DryRun {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dumps(&self) -> usize {
        self.dumps.load(Ordering::SeqCst)
    }

    pub fn restores(&self) -> usize {
        self.restores.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl DumpRunner for DryRun {
    async fn dump(&self, user: &str, name: &str, target: &Path) -> Result<()> {
        debug!(
            "Dry run: skipping pg_dump of {name} as {user} to {}",
            target.display()
        );
        self.dumps.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn writes_archives(&self) -> bool {
        false
    }
}

#[async_trait::async_trait]
impl RestoreRunner for DryRun {
    async fn restore(&self, user: &str, name: &str, source: &Path) -> Result<()> {
        debug!(
            "Dry run: skipping pg_restore of {name} as {user} from {}",
            source.display()
        );
        self.restores.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_dump_args() {
        let args = PgTools::dump_args("me", "testdb", &PathBuf::from("/b/x-testdb.tar"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec!["--username=me", "testdb", "-f", "/b/x-testdb.tar", "-F", "t"]
        );
    }

    #[test]
    fn test_restore_args() {
        let args = PgTools::restore_args("me", "testdb", &PathBuf::from("/b/has space.tar"));
        let args: Vec<String> = args
            .into_iter()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec!["-c", "-U", "me", "-d", "testdb", "-v", "/b/has space.tar", "-W"]
        );
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("dry_run".parse::<Mode>().unwrap(), Mode::DryRun);
        assert_eq!(Mode::Postgres.to_string(), "postgres");
        assert_eq!(Mode::default(), Mode::Postgres);
    }

    #[tokio::test]
    async fn test_run_spawn_failure() {
        let err = run("lifering-no-such-program", Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Subprocess);
        assert!(err.to_string().contains("Unable to run"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_nonzero_exit() {
        let err = run("sh", vec!["-c".into(), "echo nope >&2; exit 3".into()])
            .await
            .unwrap_err();
        assert_eq!(err.error_type(), ErrorType::Subprocess);
        assert!(err.to_string().contains("nope"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_success() {
        run("true", Vec::new()).await.unwrap();
    }

    #[tokio::test]
    async fn test_dry_run_counts() {
        let dry = DryRun::new();
        let shared = dry.clone();
        dry.dump("u", "db", Path::new("/x.tar")).await.unwrap();
        dry.restore("u", "db", Path::new("/x.tar")).await.unwrap();
        dry.restore("u", "db", Path::new("/x.tar")).await.unwrap();
        assert_eq!(shared.dumps(), 1);
        assert_eq!(shared.restores(), 2);
        assert!(!dry.writes_archives());
        assert!(PgTools.writes_archives());
    }
}
