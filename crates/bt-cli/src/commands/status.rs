//! Status command for showing where sessions are stored.

use std::io::Write;

use anyhow::Result;
use bt_core::{ACTIVE_SESSION_KEY, BlobStore, SessionController};
use bt_db::Database;

use crate::Config;

pub fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    controller: &SessionController<Database>,
) -> Result<()> {
    let sessions = controller.list_sessions()?;
    let marker = controller.store().get(ACTIVE_SESSION_KEY)?;

    writeln!(writer, "Browser usage timer status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    writeln!(writer, "Autosave: every {}s", config.autosave_interval().as_secs())?;
    writeln!(writer, "Sessions stored: {}", sessions.len())?;
    match marker {
        Some(name) => writeln!(writer, "Resumes on next start: {name}")?,
        None => writeln!(writer, "Resumes on next start: (none)")?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use bt_core::ManualClock;
    use insta::assert_snapshot;

    #[test]
    fn status_command_reports_sessions_and_marker() {
        let temp = tempfile::tempdir().unwrap();
        let db_path = temp.path().join("bt.db");
        let clock = ManualClock::new(0);
        let mut ctl = SessionController::new(Database::open(&db_path).unwrap(), Arc::new(clock.clone()));

        ctl.start("reading", false).unwrap();
        ctl.stop().unwrap();
        ctl.start("work", false).unwrap();
        ctl.tab_focused("https://a.com/x", 1).unwrap();
        clock.advance(5_000);
        assert!(ctl.autosave_tick().unwrap());

        let config = Config {
            database_path: db_path.clone(),
            autosave_interval_secs: 15,
            ..Config::default()
        };
        let mut output = Vec::new();
        run(&mut output, &config, &ctl).unwrap();

        let output = String::from_utf8(output).unwrap();
        let output = output.replace(&db_path.display().to_string(), "[TEMP]/bt.db");
        assert_snapshot!(output, @r"
        Browser usage timer status
        Database: [TEMP]/bt.db
        Autosave: every 15s
        Sessions stored: 2
        Resumes on next start: work
        ");
    }

    #[test]
    fn status_command_on_empty_database() {
        let ctl = SessionController::with_system_clock(Database::open_in_memory().unwrap());
        let config = Config {
            database_path: "/data/bt.db".into(),
            ..Config::default()
        };
        let mut output = Vec::new();
        run(&mut output, &config, &ctl).unwrap();

        assert_snapshot!(String::from_utf8(output).unwrap(), @r"
        Browser usage timer status
        Database: /data/bt.db
        Autosave: every 30s
        Sessions stored: 0
        Resumes on next start: (none)
        ");
    }
}
