//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::backup::BackupArgs;
use crate::commands::report::ReportArgs;

/// Browser usage timer.
///
/// Tracks how long browser tabs stay focused at each level of the URL
/// hierarchy, per named session. Browsers launch `bt` as a native messaging
/// host; the other subcommands inspect stored sessions.
#[derive(Debug, Parser)]
#[command(name = "bt", version, about, long_about = None, args_conflicts_with_subcommands = true)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Arguments passed by a browser launching the native messaging host
    /// (extension origin, manifest path).
    #[arg(hide = true)]
    pub caller: Vec<String>,

    /// Parent window handle passed by Chrome on Windows.
    #[arg(long, hide = true)]
    pub parent_window: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

impl Cli {
    /// Whether the process was started by a browser rather than a user.
    pub fn launched_by_browser(&self) -> bool {
        self.command.is_none() && (!self.caller.is_empty() || self.parent_window.is_some())
    }
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the native messaging host on stdin/stdout.
    Host,

    /// Show the database location and the active session.
    Status,

    /// Manage stored sessions.
    #[command(subcommand)]
    Sessions(SessionsAction),

    /// Print the usage report of a stored session.
    Report(ReportArgs),

    /// Copy a stored session to a timestamped JSON file.
    Backup(BackupArgs),
}

/// Session management actions.
#[derive(Debug, Subcommand)]
pub enum SessionsAction {
    /// List stored sessions.
    List {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Delete a stored session.
    Delete {
        /// Name of the session to delete.
        name: String,
    },
}
