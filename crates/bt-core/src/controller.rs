//! Process-wide session lifecycle.
//!
//! The controller holds at most one active [`Session`] and mediates every
//! interaction with it: tab events, reports, start/stop, and checkpoints to
//! the [`BlobStore`].
//!
//! # Storage layout
//!
//! - `session:<name>`: the JSON [`SessionSnapshot`] for each known session.
//! - `active_session`: name of the session that was running at the last
//!   autosave, so a restarted process can resume it.
//!
//! # State machine
//!
//! ```text
//!            start / try_resume
//!   Idle ──────────────────────────▶ Active(Session)
//!    ▲                                   │  autosave_tick (stays Active)
//!    └────────── stop / suspend ─────────┘
//! ```

use std::sync::Arc;

use thiserror::Error;

use crate::clock::{Clock, SystemClock};
use crate::session::{EventOutcome, PathUsage, Session};
use crate::snapshot::SessionSnapshot;
use crate::store::{BlobStore, StoreError};
use crate::types::{SessionName, TabId, ValidationError};

/// Store key for the name of the session to resume on startup.
pub const ACTIVE_SESSION_KEY: &str = "active_session";

/// Prefix of store keys holding session snapshots.
pub const SESSION_KEY_PREFIX: &str = "session:";

/// Store key for the snapshot of `name`.
pub fn session_key(name: &SessionName) -> String {
    format!("{SESSION_KEY_PREFIX}{name}")
}

/// Lifecycle errors returned to the caller.
#[derive(Debug, Error)]
pub enum ControlError {
    /// No session is running.
    #[error("no active session")]
    NoActiveSession,

    /// A session is already running; only one may run at a time.
    #[error("session '{0}' is already active")]
    AlreadyActive(String),

    /// The requested session name is not acceptable.
    #[error("invalid session name: {0}")]
    InvalidSessionName(#[from] ValidationError),

    /// No snapshot is stored under the requested name.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The operation is not allowed on the running session.
    #[error("session '{0}' is active; stop it first")]
    SessionActive(String),

    /// A stored snapshot carries a different name than its key.
    #[error("session name mismatch: expected '{expected}', found '{found}'")]
    SnapshotMismatch { expected: String, found: String },

    /// A snapshot could not be encoded or decoded.
    #[error("invalid snapshot for session '{session}': {source}")]
    Snapshot {
        session: String,
        #[source]
        source: serde_json::Error,
    },

    /// The store rejected a read or write.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How [`SessionController::start`] obtained its session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// No snapshot existed; the session starts empty.
    Created,
    /// The session was rebuilt from its stored snapshot.
    Restored,
}

#[derive(Debug)]
enum State {
    Idle,
    Active(Session),
}

/// Owner of the single active session and its persistence.
pub struct SessionController<S> {
    store: S,
    clock: Arc<dyn Clock>,
    state: State,
}

impl<S: BlobStore> SessionController<S> {
    pub fn new(store: S, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            state: State::Idle,
        }
    }

    /// Creates a controller driven by the system wall clock.
    pub fn with_system_clock(store: S) -> Self {
        Self::new(store, Arc::new(SystemClock))
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, State::Active(_))
    }

    /// Name of the running session, if any.
    pub fn active_session_name(&self) -> Option<&SessionName> {
        match &self.state {
            State::Active(session) => Some(session.name()),
            State::Idle => None,
        }
    }

    /// Starts tracking `name`, restoring its snapshot if one is stored.
    ///
    /// With `trust_instances`, tab instances in the snapshot are kept;
    /// otherwise they are discarded.
    pub fn start(&mut self, name: &str, trust_instances: bool) -> Result<StartOutcome, ControlError> {
        if let State::Active(session) = &self.state {
            return Err(ControlError::AlreadyActive(session.name().to_string()));
        }
        let name = SessionName::new(name)?;

        let (session, outcome) = match self.load_snapshot(&name)? {
            Some(snapshot) => (
                Session::restore(name, snapshot, !trust_instances),
                StartOutcome::Restored,
            ),
            None => (Session::new(name), StartOutcome::Created),
        };

        tracing::info!(session = %session.name(), ?outcome, trust_instances, "session started");
        self.state = State::Active(session);
        Ok(outcome)
    }

    /// Persists the running session without tab instances and ends it.
    ///
    /// If the write fails the session stays active so no time is lost.
    pub fn stop(&mut self) -> Result<(), ControlError> {
        self.persist_and_release(true)
    }

    /// Like [`stop`](Self::stop), but leaves the active marker in place so
    /// the next process resumes this session. Used on shutdown.
    pub fn suspend(&mut self) -> Result<(), ControlError> {
        self.persist_and_release(false)
    }

    /// Periodic checkpoint of the running session, including tab instances.
    ///
    /// Returns `true` if anything was written. Does nothing while idle or when
    /// the session has no changes since its last checkpoint.
    pub fn autosave_tick(&mut self) -> Result<bool, ControlError> {
        let now = self.clock.now_ms();
        let State::Active(session) = &mut self.state else {
            return Ok(false);
        };
        let Some(snapshot) = session.checkpoint(true, now) else {
            tracing::trace!(session = %session.name(), "autosave skipped; no changes");
            return Ok(false);
        };

        let result = write_snapshot(&mut self.store, session.name(), &snapshot).and_then(|()| {
            self.store
                .set(ACTIVE_SESSION_KEY, session.name().as_str())
                .map_err(ControlError::from)
        });
        if let Err(err) = result {
            session.mark_changed();
            return Err(err);
        }
        tracing::debug!(session = %session.name(), nodes = snapshot.node_count(), "autosaved");
        Ok(true)
    }

    /// Resumes the session named by the active marker, if there is one.
    ///
    /// Returns `Ok(None)` when no marker is stored or a session is already
    /// running.
    pub fn try_resume(&mut self, trust_instances: bool) -> Result<Option<StartOutcome>, ControlError> {
        if self.is_active() {
            return Ok(None);
        }
        let Some(name) = self.store.get(ACTIVE_SESSION_KEY)? else {
            return Ok(None);
        };
        tracing::info!(session = %name, "resuming session from previous run");
        self.start(&name, trust_instances).map(Some)
    }

    pub fn tab_focused(&mut self, url: &str, tab_id: TabId) -> Result<EventOutcome, ControlError> {
        let now = self.clock.now_ms();
        Ok(self.active_mut()?.tab_focused(url, tab_id, now))
    }

    pub fn tab_unfocused(&mut self, url: &str, tab_id: TabId) -> Result<EventOutcome, ControlError> {
        let now = self.clock.now_ms();
        Ok(self.active_mut()?.tab_unfocused(url, tab_id, now))
    }

    pub fn tab_closed(&mut self, url: &str, tab_id: TabId) -> Result<EventOutcome, ControlError> {
        let now = self.clock.now_ms();
        Ok(self.active_mut()?.tab_closed(url, tab_id, now))
    }

    /// Live flat report of the running session.
    pub fn report(&mut self) -> Result<Vec<PathUsage>, ControlError> {
        let now = self.clock.now_ms();
        Ok(self.active_mut()?.flat_report(now))
    }

    /// Flat report of a stored session, read without starting it.
    pub fn stored_report(&self, name: &str) -> Result<Vec<PathUsage>, ControlError> {
        let name = SessionName::new(name)?;
        let snapshot = self
            .load_snapshot(&name)?
            .ok_or_else(|| ControlError::SessionNotFound(name.to_string()))?;
        let mut session = Session::restore(name, snapshot, true);
        Ok(session.flat_report(self.clock.now_ms()))
    }

    /// Names of all stored sessions, sorted.
    pub fn list_sessions(&self) -> Result<Vec<String>, ControlError> {
        let mut names: Vec<String> = self
            .store
            .list_keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(SESSION_KEY_PREFIX).map(ToString::to_string))
            .collect();
        names.sort_unstable();
        Ok(names)
    }

    /// Deletes a stored session. The running session cannot be deleted.
    pub fn delete_session(&mut self, name: &str) -> Result<(), ControlError> {
        let name = SessionName::new(name)?;
        if self.active_session_name() == Some(&name) {
            return Err(ControlError::SessionActive(name.to_string()));
        }
        if !self.store.remove(&session_key(&name))? {
            return Err(ControlError::SessionNotFound(name.to_string()));
        }
        if self.store.get(ACTIVE_SESSION_KEY)?.as_deref() == Some(name.as_str()) {
            self.store.remove(ACTIVE_SESSION_KEY)?;
        }
        tracing::info!(session = %name, "session deleted");
        Ok(())
    }

    /// Reads and validates the stored snapshot for `name`.
    pub fn load_snapshot(&self, name: &SessionName) -> Result<Option<SessionSnapshot>, ControlError> {
        let Some(blob) = self.store.get(&session_key(name))? else {
            return Ok(None);
        };
        let snapshot: SessionSnapshot =
            serde_json::from_str(&blob).map_err(|source| ControlError::Snapshot {
                session: name.to_string(),
                source,
            })?;
        if snapshot.session_name != name.as_str() {
            return Err(ControlError::SnapshotMismatch {
                expected: name.to_string(),
                found: snapshot.session_name,
            });
        }
        Ok(Some(snapshot))
    }

    fn active_mut(&mut self) -> Result<&mut Session, ControlError> {
        match &mut self.state {
            State::Active(session) => Ok(session),
            State::Idle => Err(ControlError::NoActiveSession),
        }
    }

    fn persist_and_release(&mut self, clear_marker: bool) -> Result<(), ControlError> {
        let now = self.clock.now_ms();
        let session = self.active_mut()?;
        // Tab ids are meaningless once tracking ends.
        let snapshot = session.snapshot(false, now);
        let name = session.name().clone();

        let result = write_snapshot(&mut self.store, &name, &snapshot).and_then(|()| {
            if clear_marker {
                self.store.remove(ACTIVE_SESSION_KEY)?;
            } else {
                self.store.set(ACTIVE_SESSION_KEY, name.as_str())?;
            }
            Ok(())
        });
        if let Err(err) = result {
            if let State::Active(session) = &mut self.state {
                session.mark_changed();
            }
            tracing::error!(session = %name, error = %err, "failed to persist session; still active");
            return Err(err);
        }

        self.state = State::Idle;
        tracing::info!(session = %name, suspended = !clear_marker, "session stopped");
        Ok(())
    }
}

fn write_snapshot<S: BlobStore>(
    store: &mut S,
    name: &SessionName,
    snapshot: &SessionSnapshot,
) -> Result<(), ControlError> {
    let blob = serde_json::to_string(snapshot).map_err(|source| ControlError::Snapshot {
        session: name.to_string(),
        source,
    })?;
    store.set(&session_key(name), &blob)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::session::TrackerError;
    use crate::store::MemoryStore;

    /// Store whose writes can be switched off.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        writes_fail: bool,
    }

    impl BlobStore for FlakyStore {
        fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
            self.inner.get(key)
        }

        fn set(&mut self, key: &str, blob: &str) -> Result<(), StoreError> {
            if self.writes_fail {
                return Err(StoreError::new("read-only"));
            }
            self.inner.set(key, blob)
        }

        fn remove(&mut self, key: &str) -> Result<bool, StoreError> {
            if self.writes_fail {
                return Err(StoreError::new("read-only"));
            }
            self.inner.remove(key)
        }

        fn list_keys(&self) -> Result<Vec<String>, StoreError> {
            self.inner.list_keys()
        }
    }

    fn controller() -> (SessionController<MemoryStore>, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (
            SessionController::new(MemoryStore::new(), Arc::new(clock.clone())),
            clock,
        )
    }

    fn stored(ctl: &SessionController<MemoryStore>, name: &str) -> SessionSnapshot {
        ctl.load_snapshot(&SessionName::new(name).unwrap())
            .unwrap()
            .expect("snapshot should be stored")
    }

    #[test]
    fn events_without_session_are_rejected() {
        let (mut ctl, _clock) = controller();
        assert!(matches!(
            ctl.tab_focused("https://a.com", 1),
            Err(ControlError::NoActiveSession)
        ));
        assert!(matches!(ctl.report(), Err(ControlError::NoActiveSession)));
        assert!(matches!(ctl.stop(), Err(ControlError::NoActiveSession)));
        assert!(!ctl.autosave_tick().unwrap());
    }

    #[test]
    fn only_one_session_at_a_time() {
        let (mut ctl, _clock) = controller();
        assert_eq!(ctl.start("work", false).unwrap(), StartOutcome::Created);
        assert!(matches!(
            ctl.start("play", false),
            Err(ControlError::AlreadyActive(name)) if name == "work"
        ));
        assert_eq!(ctl.active_session_name().map(SessionName::as_str), Some("work"));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let (mut ctl, _clock) = controller();
        assert!(matches!(
            ctl.start("a/b", false),
            Err(ControlError::InvalidSessionName(_))
        ));
        assert!(!ctl.is_active());
    }

    #[test]
    fn stop_persists_without_instances_and_clears_marker() {
        let (mut ctl, clock) = controller();
        ctl.start("work", false).unwrap();
        ctl.tab_focused("https://a.com/x", 1).unwrap();
        clock.advance(2_000);
        ctl.autosave_tick().unwrap();
        assert_eq!(
            ctl.store().get(ACTIVE_SESSION_KEY).unwrap().as_deref(),
            Some("work")
        );

        clock.advance(1_000);
        ctl.stop().unwrap();
        assert!(!ctl.is_active());
        assert_eq!(ctl.store().get(ACTIVE_SESSION_KEY).unwrap(), None);

        let snapshot = stored(&ctl, "work");
        let x = &snapshot.data["a.com"].children["x"];
        assert_eq!(x.aggregate_time, 3_000);
        assert!(x.instances.is_none());
    }

    #[test]
    fn restart_accumulates_on_top_of_stored_time() {
        let (mut ctl, clock) = controller();
        ctl.start("work", false).unwrap();
        ctl.tab_focused("https://news.site", 1).unwrap();
        clock.advance(42_000);
        ctl.tab_closed("https://news.site", 1).unwrap();
        ctl.stop().unwrap();

        assert_eq!(ctl.start("work", true).unwrap(), StartOutcome::Restored);
        assert_eq!(
            ctl.report().unwrap(),
            vec![PathUsage {
                path: "news.site".to_string(),
                aggregate_time: 42_000,
                active_instances: 0,
                total_instances: 0,
            }]
        );

        ctl.tab_focused("https://news.site", 5).unwrap();
        clock.advance(1_000);
        assert_eq!(ctl.report().unwrap()[0].aggregate_time, 43_000);
    }

    #[test]
    fn autosave_includes_instances_and_skips_when_idle() {
        let (mut ctl, clock) = controller();
        ctl.start("work", false).unwrap();
        assert!(!ctl.autosave_tick().unwrap());

        ctl.tab_focused("https://a.com", 7).unwrap();
        clock.advance(500);
        assert!(ctl.autosave_tick().unwrap());

        let instances = stored(&ctl, "work").data["a.com"]
            .instances
            .clone()
            .unwrap_or_default();
        assert_eq!(instances.len(), 1);
        assert_eq!(instances[0].tab_id, 7);
        assert_eq!(instances[0].focused_since, Some(clock.now_ms()));

        ctl.tab_unfocused("https://a.com", 7).unwrap();
        assert!(ctl.autosave_tick().unwrap());
        assert!(!ctl.autosave_tick().unwrap());
    }

    #[test]
    fn try_resume_picks_up_autosaved_session() {
        let clock = ManualClock::new(0);
        let mut first = SessionController::new(MemoryStore::new(), Arc::new(clock.clone()));
        first.start("work", false).unwrap();
        first.tab_focused("https://a.com", 3).unwrap();
        clock.advance(1_000);
        first.autosave_tick().unwrap();

        // Simulate a process restart sharing the same store.
        let store = first.store().clone();
        let mut second = SessionController::new(store, Arc::new(clock.clone()));
        assert_eq!(second.try_resume(true).unwrap(), Some(StartOutcome::Restored));
        assert_eq!(second.active_session_name().map(SessionName::as_str), Some("work"));

        // The trusted tab keeps its identity and can be closed.
        clock.advance(500);
        assert!(second.tab_closed("https://a.com", 3).unwrap().is_applied());
        assert_eq!(second.report().unwrap()[0].aggregate_time, 1_500);
    }

    #[test]
    fn try_resume_without_marker_stays_idle() {
        let (mut ctl, _clock) = controller();
        assert_eq!(ctl.try_resume(true).unwrap(), None);
        assert!(!ctl.is_active());
    }

    #[test]
    fn untrusted_start_discards_instances() {
        let (mut ctl, _clock) = controller();
        ctl.start("work", false).unwrap();
        ctl.tab_focused("https://a.com", 3).unwrap();
        ctl.autosave_tick().unwrap();
        let store = ctl.store().clone();

        let mut fresh = SessionController::with_system_clock(store);
        fresh.start("work", false).unwrap();
        assert_eq!(
            fresh.tab_closed("https://a.com", 3).unwrap(),
            EventOutcome::Ignored(TrackerError::TabNotFound {
                tab_id: 3,
                path: "a.com".to_string(),
            })
        );
    }

    #[test]
    fn suspend_keeps_marker_but_drops_instances() {
        let (mut ctl, clock) = controller();
        ctl.start("work", false).unwrap();
        ctl.tab_focused("https://a.com", 3).unwrap();
        clock.advance(250);
        ctl.suspend().unwrap();

        assert!(!ctl.is_active());
        assert_eq!(
            ctl.store().get(ACTIVE_SESSION_KEY).unwrap().as_deref(),
            Some("work")
        );
        let node = &stored(&ctl, "work").data["a.com"];
        assert_eq!(node.aggregate_time, 250);
        assert!(node.instances.is_none());

        assert_eq!(ctl.try_resume(true).unwrap(), Some(StartOutcome::Restored));
    }

    #[test]
    fn failed_stop_keeps_session_active() {
        let clock = ManualClock::new(0);
        let mut ctl = SessionController::new(FlakyStore::default(), Arc::new(clock.clone()));
        ctl.start("work", false).unwrap();
        ctl.tab_focused("https://a.com", 1).unwrap();
        clock.advance(100);
        ctl.tab_unfocused("https://a.com", 1).unwrap();

        ctl.store.writes_fail = true;
        assert!(matches!(ctl.stop(), Err(ControlError::Store(_))));
        assert!(ctl.is_active());
        assert_eq!(ctl.report().unwrap()[0].aggregate_time, 100);

        // The failed write must not swallow the pending change.
        assert!(matches!(ctl.autosave_tick(), Err(ControlError::Store(_))));
        ctl.store.writes_fail = false;
        assert!(ctl.autosave_tick().unwrap());
        ctl.stop().unwrap();
        assert!(!ctl.is_active());
    }

    #[test]
    fn list_and_delete_sessions() {
        let (mut ctl, _clock) = controller();
        for name in ["b", "a"] {
            ctl.start(name, false).unwrap();
            ctl.stop().unwrap();
        }
        ctl.store.set(ACTIVE_SESSION_KEY, "a").unwrap();
        assert_eq!(ctl.list_sessions().unwrap(), vec!["a", "b"]);

        ctl.delete_session("a").unwrap();
        assert_eq!(ctl.list_sessions().unwrap(), vec!["b"]);
        assert_eq!(ctl.store().get(ACTIVE_SESSION_KEY).unwrap(), None);
        assert!(matches!(
            ctl.delete_session("a"),
            Err(ControlError::SessionNotFound(_))
        ));
    }

    #[test]
    fn active_session_cannot_be_deleted() {
        let (mut ctl, _clock) = controller();
        ctl.start("work", false).unwrap();
        assert!(matches!(
            ctl.delete_session("work"),
            Err(ControlError::SessionActive(_))
        ));
    }

    #[test]
    fn stored_report_reads_without_starting() {
        let (mut ctl, clock) = controller();
        ctl.start("work", false).unwrap();
        ctl.tab_focused("https://a.com/x", 1).unwrap();
        clock.advance(900);
        ctl.stop().unwrap();

        let report = ctl.stored_report("work").unwrap();
        assert_eq!(report[0].path, "a.com/x");
        assert_eq!(report[0].aggregate_time, 900);
        assert!(!ctl.is_active());
        assert!(matches!(
            ctl.stored_report("missing"),
            Err(ControlError::SessionNotFound(_))
        ));
    }

    #[test]
    fn mismatched_snapshot_name_is_rejected() {
        let (mut ctl, _clock) = controller();
        ctl.store
            .set("session:work", r#"{"session_name":"play","data":{}}"#)
            .unwrap();
        assert!(matches!(
            ctl.start("work", false),
            Err(ControlError::SnapshotMismatch { .. })
        ));
    }

    #[test]
    fn corrupt_snapshot_is_reported() {
        let (mut ctl, _clock) = controller();
        ctl.store.set("session:work", "{not json").unwrap();
        assert!(matches!(
            ctl.start("work", false),
            Err(ControlError::Snapshot { .. })
        ));
    }
}
