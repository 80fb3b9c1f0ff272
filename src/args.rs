//! These structs provide the CLI interface for the lifering CLI.

use crate::record::{DEFAULT_BACKUP_LIMIT, DEFAULT_HOURS};
use clap::{Parser, Subcommand};
use std::convert::Infallible;
use std::fmt::{Display, Formatter};
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;

/// lifering: Create, rotate and restore PostgreSQL backups.
///
/// Each managed database has a small configuration file naming the database user, the hour of
/// the day to back it up, and how many backup archives to keep. Archives are made with pg_dump
/// (tar format) into a single backup directory and restored with pg_restore.
///
/// Start with `lifering init`, then `lifering setup <name> --user <user>` for each database.
#[derive(Debug, Parser, Clone)]
pub struct Args {
    #[clap(flatten)]
    common: Common,

    #[command(subcommand)]
    command: Command,
}

impl Args {
    pub fn new(common: Common, command: Command) -> Self {
        Self { common, command }
    }

    pub fn common(&self) -> &Common {
        &self.common
    }

    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Create the home directory, the settings and backup directories, and the settings file.
    ///
    /// This is the first command you should run. By default everything lives in ~/lifering, pass
    /// --home or set LIFERING_HOME to use somewhere else.
    Init(InitArgs),
    /// Create or overwrite the configuration for a database.
    Setup(SetupArgs),
    /// Print the configuration for a database.
    Show(NameArgs),
    /// Create a backup of a database now, then remove backups beyond its limit.
    Backup(NameArgs),
    /// List the backups of a database, most recent first.
    List(NameArgs),
    /// Restore a database from one of its backups. The database user's password will be
    /// requested by pg_restore.
    Restore(RestoreArgs),
    /// Remove the oldest backups of a database beyond a limit.
    Trim(TrimArgs),
    /// Stay running and back up a database every day at its configured hour.
    Schedule(NameArgs),
}

/// Arguments common to all subcommands.
#[derive(Debug, Parser, Clone)]
pub struct Common {
    /// The logging verbosity. One of, from least to most verbose:
    /// off, error, warn, info, debug, trace
    ///
    /// This can be overridden by RUST_LOG.
    #[arg(long, default_value_t = LevelFilter::INFO)]
    log_level: LevelFilter,

    /// The directory where lifering settings and, by default, backups are held. Defaults to
    /// ~/lifering
    #[arg(long, env = "LIFERING_HOME", default_value_t = default_home())]
    home: DisplayPath,

    /// Do not run pg_dump or pg_restore. Setting LIFERING_DRY_RUN does the same.
    #[arg(long)]
    dry_run: bool,
}

impl Common {
    pub fn new(log_level: LevelFilter, home: PathBuf, dry_run: bool) -> Self {
        Self {
            log_level,
            home: home.into(),
            dry_run,
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level
    }

    pub fn home(&self) -> &DisplayPath {
        &self.home
    }

    pub fn dry_run(&self) -> bool {
        self.dry_run
    }
}

/// (Not shown): Args for the `lifering init` command.
#[derive(Debug, Parser, Clone)]
pub struct InitArgs {
    /// Where to write backup archives. Relative paths are relative to the home directory.
    /// Defaults to $LIFERING_HOME/backups
    #[arg(long)]
    backup_dir: Option<PathBuf>,
}

impl InitArgs {
    pub fn new(backup_dir: Option<PathBuf>) -> Self {
        Self { backup_dir }
    }

    pub fn backup_dir(&self) -> Option<&Path> {
        self.backup_dir.as_deref()
    }
}

/// (Not shown): Args for commands that only take a database name.
#[derive(Debug, Parser, Clone)]
pub struct NameArgs {
    /// The name of the database.
    name: String,
}

impl NameArgs {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// (Not shown): Args for the `lifering setup` command.
#[derive(Debug, Parser, Clone)]
pub struct SetupArgs {
    /// The name of the database.
    name: String,

    /// The database user that pg_dump and pg_restore log in as.
    #[arg(long)]
    user: String,

    /// The hour of the day, 0-23, at which `lifering schedule` backs up the database.
    #[arg(long, default_value_t = DEFAULT_HOURS)]
    hours: u8,

    /// How many backup files to keep, 0-100.
    #[arg(long, default_value_t = DEFAULT_BACKUP_LIMIT)]
    backup_limit: u32,
}

impl SetupArgs {
    pub fn new(
        name: impl Into<String>,
        user: impl Into<String>,
        hours: u8,
        backup_limit: u32,
    ) -> Self {
        Self {
            name: name.into(),
            user: user.into(),
            hours,
            backup_limit,
        }
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
}

/// (Not shown): Args for the `lifering restore` command.
#[derive(Debug, Parser, Clone)]
pub struct RestoreArgs {
    /// The name of the database.
    name: String,

    /// The index of the backup as shown by `lifering list`. 0 is the most recent.
    index: usize,
}

impl RestoreArgs {
    pub fn new(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> usize {
        self.index
    }
}

/// (Not shown): Args for the `lifering trim` command.
#[derive(Debug, Parser, Clone)]
pub struct TrimArgs {
    /// The name of the database.
    name: String,

    /// How many backups to keep. Defaults to the database's configured limit.
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,
}

impl TrimArgs {
    pub fn new(name: impl Into<String>, limit: Option<i64>) -> Self {
        Self {
            name: name.into(),
            limit,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn limit(&self) -> Option<i64> {
        self.limit
    }
}

fn default_home() -> DisplayPath {
    DisplayPath(match dirs::home_dir() {
        Some(home) => home.join("lifering"),
        None => {
            error!(
                "There was an error when trying to get your home directory. You can get around \
                this by providing --home or LIFERING_HOME instead of relying on the default \
                lifering home directory. If you continue using the program right now, you may \
                have problems!",
            );
            PathBuf::from("lifering")
        }
    })
}

#[derive(Debug, Default, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct DisplayPath(PathBuf);

impl From<PathBuf> for DisplayPath {
    fn from(value: PathBuf) -> Self {
        DisplayPath(value)
    }
}

impl Deref for DisplayPath {
    type Target = Path;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<Path> for DisplayPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl Display for DisplayPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_string_lossy())
    }
}

impl FromStr for DisplayPath {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(PathBuf::from(s)))
    }
}

impl DisplayPath {
    pub fn new(path: PathBuf) -> Self {
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}
