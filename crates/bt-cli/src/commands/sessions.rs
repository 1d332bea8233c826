//! Session listing and deletion.

use std::io::Write;

use anyhow::Result;
use bt_core::controller::SESSION_KEY_PREFIX;
use bt_core::{ACTIVE_SESSION_KEY, BlobStore, SessionController};
use bt_db::Database;
use serde::Serialize;

/// A stored session as listed by `bt sessions list --json`.
#[derive(Debug, Serialize)]
pub struct SessionEntry {
    pub name: String,
    pub updated_at: Option<String>,
    pub bytes: usize,
    /// Whether the next host process will resume this session.
    pub resumes: bool,
}

/// Collects stored sessions with their write metadata.
pub fn entries(controller: &SessionController<Database>) -> Result<Vec<SessionEntry>> {
    let db = controller.store();
    let marker = db.get(ACTIVE_SESSION_KEY)?;

    controller
        .list_sessions()?
        .into_iter()
        .map(|name| -> Result<SessionEntry> {
            let info = db.blob_info(&format!("{SESSION_KEY_PREFIX}{name}"))?;
            Ok(SessionEntry {
                resumes: marker.as_deref() == Some(name.as_str()),
                updated_at: info.as_ref().map(|info| info.updated_at.clone()),
                bytes: info.map_or(0, |info| info.size),
                name,
            })
        })
        .collect()
}

/// Lists stored sessions.
pub fn list<W: Write>(
    writer: &mut W,
    controller: &SessionController<Database>,
    json: bool,
) -> Result<()> {
    let entries = entries(controller)?;

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
        return Ok(());
    }

    if entries.is_empty() {
        writeln!(writer, "No sessions stored.")?;
        return Ok(());
    }

    for entry in entries {
        let updated = entry.updated_at.as_deref().unwrap_or("unknown");
        write!(writer, "{:<24} updated {updated}", entry.name)?;
        if entry.resumes {
            write!(writer, "  (resumes on next start)")?;
        }
        writeln!(writer)?;
    }
    Ok(())
}

/// Deletes a stored session.
pub fn delete<W: Write, S: BlobStore>(
    writer: &mut W,
    controller: &mut SessionController<S>,
    name: &str,
) -> Result<()> {
    controller.delete_session(name)?;
    writeln!(writer, "Deleted session '{name}'")?;
    Ok(())
}
