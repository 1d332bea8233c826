//! Backup command for exporting a stored session as JSON.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bt_core::{BlobStore, ControlError, SessionController, SessionName};
use chrono::{DateTime, Utc};
use clap::Args;

/// Arguments for `bt backup`.
#[derive(Debug, Args)]
pub struct BackupArgs {
    /// Session to back up.
    pub name: String,

    /// Directory to write into, instead of the configured backup directory.
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

/// Writes the stored snapshot of `name` to `<dir>/<name>_<YYYYmmdd_HHMMSS>.json`.
///
/// Returns the path written.
pub fn backup_session<S: BlobStore>(
    controller: &SessionController<S>,
    name: &str,
    dir: &Path,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    let name = SessionName::new(name).map_err(ControlError::from)?;
    let snapshot = controller
        .load_snapshot(&name)?
        .ok_or_else(|| ControlError::SessionNotFound(name.to_string()))?;

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(format!("{name}_{}.json", now.format("%Y%m%d_%H%M%S")));
    let json = serde_json::to_string_pretty(&snapshot)?;
    std::fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;

    tracing::info!(session = %name, path = %path.display(), "session backed up");
    Ok(path)
}

/// Runs the backup command.
pub fn run<W: Write, S: BlobStore>(
    writer: &mut W,
    controller: &SessionController<S>,
    args: &BackupArgs,
    default_dir: &Path,
) -> Result<()> {
    let dir = args.output_dir.as_deref().unwrap_or(default_dir);
    let path = backup_session(controller, &args.name, dir, Utc::now())?;
    writeln!(writer, "Backed up session '{}' to {}", args.name, path.display())?;
    Ok(())
}
