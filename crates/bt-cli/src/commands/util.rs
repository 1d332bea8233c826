//! Shared utilities for CLI commands.

use anyhow::{Context, Result};
use bt_db::Database;

use crate::Config;

/// Opens the configured database, creating its parent directory if needed.
pub fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// Formats milliseconds as a duration string.
///
/// Returns "Xh Ym Zs" if >= 1 hour, "Ym Zs" if >= 1 minute, "Zs" otherwise.
/// Sub-second remainders are floored.
pub fn format_duration(ms: u64) -> String {
    let total_seconds = ms / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m {seconds}s")
    } else if minutes >= 1 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Generates a 10-character bar for `value` relative to `max`.
/// Non-zero values below 5% still get a single block.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn progress_bar(value: u64, max: u64) -> String {
    if max == 0 {
        return "░".repeat(10);
    }

    let ratio = value as f64 / max as f64;
    let filled = if ratio < 0.05 && value > 0 {
        1
    } else {
        (ratio * 10.0).round().min(10.0) as usize
    };

    format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled))
}
