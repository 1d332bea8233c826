use std::fs::OpenOptions;
use std::io::{self, Write};
use std::sync::Mutex;

use anyhow::{Context, Result};
use bt_core::SessionController;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use bt_cli::commands::{backup, host, report, sessions, status, util};
use bt_cli::{Cli, Commands, Config, SessionsAction};

/// Sets up logging. Stdout carries protocol frames, so logs go to stderr or
/// to the configured log file.
fn init_tracing(verbose: bool, config: &Config) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    if let Some(path) = &config.log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("failed to create log directory")?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let _ = builder.with_ansi(false).with_writer(Mutex::new(file)).try_init();
    } else {
        let _ = builder.with_writer(io::stderr).try_init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    init_tracing(cli.verbose, &config)?;
    tracing::debug!(?config, "loaded configuration");

    if cli.launched_by_browser() {
        tracing::debug!(caller = ?cli.caller, "launched by browser");
        return host::run(&config);
    }

    // Stdout is locked per arm; the host writes it from tokio.
    match &cli.command {
        Some(Commands::Host) => host::run(&config)?,
        Some(Commands::Status) => {
            let ctl = SessionController::with_system_clock(util::open_database(&config)?);
            status::run(&mut io::stdout().lock(), &config, &ctl)?;
        }
        Some(Commands::Sessions(action)) => {
            let mut ctl = SessionController::with_system_clock(util::open_database(&config)?);
            let mut out = io::stdout().lock();
            match action {
                SessionsAction::List { json } => sessions::list(&mut out, &ctl, *json)?,
                SessionsAction::Delete { name } => sessions::delete(&mut out, &mut ctl, name)?,
            }
        }
        Some(Commands::Report(args)) => {
            let ctl = SessionController::with_system_clock(util::open_database(&config)?);
            report::run(&mut io::stdout().lock(), &ctl, args)?;
        }
        Some(Commands::Backup(args)) => {
            let ctl = SessionController::with_system_clock(util::open_database(&config)?);
            backup::run(&mut io::stdout().lock(), &ctl, args, &config.backup_dir)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            writeln!(io::stdout())?;
        }
    }

    Ok(())
}
