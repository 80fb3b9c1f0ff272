use clap::Parser;
use lifering::args::{Args, Command};
use lifering::{commands, Mode, Result, Settings};
use std::process::ExitCode;
use tracing::{debug, error, trace};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log_level = args.common().log_level();
    init_logger(log_level);
    debug!("Log level set to {}", log_level.to_string().to_lowercase());

    match main_inner(args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Exiting with error: {e}");
            ExitCode::FAILURE
        }
    }
}

pub async fn main_inner(args: Args) -> Result<()> {
    trace!("{args:?}");
    let home = args.common().home().path();

    // --dry-run or LIFERING_DRY_RUN skip pg_dump and pg_restore entirely, which allows running
    // the program without a PostgreSQL server.
    let mode = if args.common().dry_run() {
        Mode::DryRun
    } else {
        Mode::from_env()
    };
    debug!("Running in {mode} mode");

    let _: () = match args.command() {
        Command::Init(init_args) => commands::init(home, init_args.backup_dir()).await?.print(),

        Command::Setup(setup_args) => {
            let settings = Settings::load(home).await?;
            commands::setup(&settings, setup_args).await?.print()
        }

        Command::Show(name_args) => {
            let settings = Settings::load(home).await?;
            commands::show(&settings, name_args.name()).await?.print()
        }

        Command::Backup(name_args) => {
            let settings = Settings::load(home).await?;
            commands::backup(&settings, mode, name_args.name())
                .await?
                .print()
        }

        Command::List(name_args) => {
            let settings = Settings::load(home).await?;
            commands::list(&settings, mode, name_args.name())
                .await?
                .print()
        }

        Command::Restore(restore_args) => {
            let settings = Settings::load(home).await?;
            commands::restore(
                &settings,
                mode,
                restore_args.name(),
                restore_args.index(),
            )
            .await?
            .print()
        }

        Command::Trim(trim_args) => {
            let settings = Settings::load(home).await?;
            commands::trim(&settings, mode, trim_args.name(), trim_args.limit())
                .await?
                .print()
        }

        Command::Schedule(name_args) => {
            let settings = Settings::load(home).await?;
            commands::schedule(&settings, mode, name_args.name())
                .await?
                .print()
        }
    };
    Ok(())
}

/// Initializes the tracing subscriber.
pub fn init_logger(level: LevelFilter) {
    let filter = match std::env::var("RUST_LOG").ok() {
        Some(_) => {
            // RUST_LOG exists; use it.
            EnvFilter::from_default_env()
        }
        None => {
            // RUST_LOG does not exist; use default log level for this crate only.
            EnvFilter::new(format!(
                "{}={},{}={}",
                env!("CARGO_CRATE_NAME"),
                level,
                env!("CARGO_BIN_NAME"),
                level
            ))
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
