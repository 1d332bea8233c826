//! Report command for printing a stored session's usage.
//!
//! `bt report <name>` restores the persisted snapshot without touching the
//! running host and prints one line per path with recorded time.

use std::io::Write;

use anyhow::Result;
use bt_core::{BlobStore, PathUsage, SessionController};
use clap::Args;

use super::util::{format_duration, progress_bar};

/// Arguments for `bt report`.
#[derive(Debug, Args)]
pub struct ReportArgs {
    /// Session to report on.
    pub name: String,

    /// Output as JSON.
    #[arg(long)]
    pub json: bool,
}

/// Formats the human-readable report.
///
/// Bars are scaled to the busiest path.
pub fn format_report(session: &str, rows: &[PathUsage]) -> String {
    use std::fmt::Write as _;

    let mut output = String::new();
    writeln!(output, "SESSION: {session}").unwrap();

    if rows.is_empty() {
        writeln!(output).unwrap();
        writeln!(output, "No usage recorded.").unwrap();
        return output;
    }

    let total: u64 = rows.iter().map(|row| row.aggregate_time).sum();
    let max = rows.iter().map(|row| row.aggregate_time).max().unwrap_or(0);

    writeln!(output).unwrap();
    for row in rows {
        let duration = format_duration(row.aggregate_time);
        let bar = progress_bar(row.aggregate_time, max);
        write!(output, "{:<32} {duration:>11}  {bar}", row.path).unwrap();
        if row.total_instances > 0 {
            write!(
                output,
                "  ({} focused / {} open)",
                row.active_instances, row.total_instances
            )
            .unwrap();
        }
        writeln!(output).unwrap();
    }

    writeln!(output).unwrap();
    writeln!(output, "Total: {}", format_duration(total)).unwrap();
    output
}

/// Runs the report command.
pub fn run<W: Write, S: BlobStore>(
    writer: &mut W,
    controller: &SessionController<S>,
    args: &ReportArgs,
) -> Result<()> {
    let rows = controller.stored_report(&args.name)?;

    if args.json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
    } else {
        write!(writer, "{}", format_report(&args.name, &rows))?;
    }
    Ok(())
}
