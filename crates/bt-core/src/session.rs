//! A named tracking session over one usage trie.
//!
//! Tab events never fail from the caller's point of view: a malformed URL or
//! an event for a tab the trie does not know about is logged and ignored, and
//! the outcome is returned as [`EventOutcome::Ignored`] for callers that want
//! to surface it.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path_key::{PathKeyError, PathKeys};
use crate::snapshot::SessionSnapshot;
use crate::trie::UsageTrie;
use crate::types::{Millis, SessionName, TabId};

/// Why a tab event did not take effect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TrackerError {
    /// The event's URL could not be split into path keys.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] PathKeyError),

    /// The event references a tab that is not tracked at that path.
    #[error("tab {tab_id} not found at {path}")]
    TabNotFound { tab_id: TabId, path: String },
}

/// Result of applying one tab event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied,
    Ignored(TrackerError),
}

impl EventOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// One row of a flat usage report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathUsage {
    /// Segment keys from the hostname down, joined with `/`.
    pub path: String,
    /// Total focus time in milliseconds, including live tabs up to now.
    pub aggregate_time: Millis,
    /// Tabs on this path that are currently focused.
    pub active_instances: usize,
    /// Tabs open on this path.
    pub total_instances: usize,
}

/// A named session owning its usage trie.
#[derive(Debug, Clone)]
pub struct Session {
    name: SessionName,
    trie: UsageTrie,
    changed_since_checkpoint: bool,
}

impl Session {
    /// Starts an empty session.
    pub fn new(name: SessionName) -> Self {
        Self {
            name,
            trie: UsageTrie::new(),
            changed_since_checkpoint: false,
        }
    }

    /// Rebuilds a session from a snapshot.
    ///
    /// With `discard_instances`, tab instances recorded in the snapshot are
    /// dropped; use this when the tab ids may belong to a different browser
    /// process than the one now sending events.
    pub fn restore(name: SessionName, snapshot: SessionSnapshot, discard_instances: bool) -> Self {
        Self {
            name,
            trie: UsageTrie::from_snapshot(snapshot.data, discard_instances),
            changed_since_checkpoint: false,
        }
    }

    pub fn name(&self) -> &SessionName {
        &self.name
    }

    pub fn trie(&self) -> &UsageTrie {
        &self.trie
    }

    /// Records that `tab_id` gained focus on `url`.
    pub fn tab_focused(&mut self, url: &str, tab_id: TabId, now: Millis) -> EventOutcome {
        let keys = match self.parse(url, tab_id, "focus") {
            Ok(keys) => keys,
            Err(outcome) => return outcome,
        };

        self.trie.find_or_create_path(&keys).focus_tab(tab_id, now);
        self.changed_since_checkpoint = true;
        tracing::debug!(session = %self.name, tab_id, path = %keys, "tab focused");
        EventOutcome::Applied
    }

    /// Records that `tab_id` lost focus on `url`.
    pub fn tab_unfocused(&mut self, url: &str, tab_id: TabId, now: Millis) -> EventOutcome {
        let keys = match self.parse(url, tab_id, "unfocus") {
            Ok(keys) => keys,
            Err(outcome) => return outcome,
        };

        let drained = self
            .trie
            .find_path_mut(&keys)
            .and_then(|node| node.unfocus_tab(tab_id, now));
        match drained {
            Some(elapsed) => {
                self.changed_since_checkpoint = true;
                tracing::debug!(session = %self.name, tab_id, path = %keys, elapsed, "tab unfocused");
                EventOutcome::Applied
            }
            None => self.untracked(tab_id, &keys, "unfocus"),
        }
    }

    /// Records that `tab_id` on `url` was closed.
    pub fn tab_closed(&mut self, url: &str, tab_id: TabId, now: Millis) -> EventOutcome {
        let keys = match self.parse(url, tab_id, "close") {
            Ok(keys) => keys,
            Err(outcome) => return outcome,
        };

        let folded = self
            .trie
            .find_path_mut(&keys)
            .and_then(|node| node.close_tab(tab_id, now));
        match folded {
            Some(folded) => {
                self.changed_since_checkpoint = true;
                tracing::debug!(session = %self.name, tab_id, path = %keys, folded, "tab closed");
                EventOutcome::Applied
            }
            None => self.untracked(tab_id, &keys, "close"),
        }
    }

    /// Drains the whole trie and lists every path with recorded time.
    ///
    /// Paths with zero time (intermediate segments nobody focused directly)
    /// are left out. Rows are sorted by path.
    pub fn flat_report(&mut self, now: Millis) -> Vec<PathUsage> {
        let mut report: Vec<PathUsage> = self
            .trie
            .drain_walk(now)
            .into_iter()
            .filter(|node| node.accumulated_ms != 0)
            .map(|node| PathUsage {
                path: node.path,
                aggregate_time: node.accumulated_ms,
                active_instances: node.live_instances,
                total_instances: node.total_instances,
            })
            .collect();
        report.sort_by(|a, b| a.path.cmp(&b.path));
        report
    }

    /// Whether a checkpoint now would record anything new.
    ///
    /// A focused tab accrues time without producing events, so any live
    /// instance counts as a pending change.
    pub fn has_unpersisted_changes(&self) -> bool {
        self.changed_since_checkpoint || self.trie.has_live_instances()
    }

    /// Snapshot for persistence, or `None` if nothing changed since the last one.
    pub fn checkpoint(&mut self, include_instances: bool, now: Millis) -> Option<SessionSnapshot> {
        if !self.has_unpersisted_changes() {
            return None;
        }
        Some(self.snapshot(include_instances, now))
    }

    /// Drains and serializes the trie unconditionally, clearing the change flag.
    pub fn snapshot(&mut self, include_instances: bool, now: Millis) -> SessionSnapshot {
        self.trie.fold_all(now);
        self.changed_since_checkpoint = false;
        SessionSnapshot {
            session_name: self.name.to_string(),
            data: self.trie.to_snapshot(include_instances),
        }
    }

    /// Flags the session as changed, e.g. after a failed write of its snapshot.
    pub fn mark_changed(&mut self) {
        self.changed_since_checkpoint = true;
    }

    fn parse(&self, url: &str, tab_id: TabId, event: &str) -> Result<PathKeys, EventOutcome> {
        PathKeys::parse(url).map_err(|err| {
            tracing::warn!(session = %self.name, tab_id, event, error = %err, "ignoring tab event with malformed url");
            EventOutcome::Ignored(err.into())
        })
    }

    fn untracked(&self, tab_id: TabId, keys: &PathKeys, event: &str) -> EventOutcome {
        tracing::warn!(session = %self.name, tab_id, path = %keys, event, "ignoring event for untracked tab");
        EventOutcome::Ignored(TrackerError::TabNotFound {
            tab_id,
            path: keys.to_string(),
        })
    }
}
