//! Native messaging host.
//!
//! The browser extension launches `bt` and talks to it over stdin/stdout
//! using length-prefixed JSON frames (see [`crate::protocol`]). A single task
//! owns the [`SessionController`]: incoming frames, autosave ticks and the
//! shutdown signal are all handled from one `select!` loop, so session state
//! is only ever touched sequentially.
//!
//! On stdin EOF or Ctrl-C the active session is suspended: its snapshot is
//! written without tab instances and the active marker is kept, so the next
//! host process picks the session up again.

use std::future::Future;
use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use bt_core::{BlobStore, ControlError, EventOutcome, SessionController};
use serde_json::{Value, json};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use super::util::open_database;
use crate::Config;
use crate::protocol::{Action, Request, Response, read_frame, write_frame};

/// Frames buffered between the stdin reader and the session task.
const FRAME_BUFFER: usize = 16;

/// Request handler wrapping the session controller.
pub struct Host<S> {
    controller: SessionController<S>,
}

impl<S: BlobStore> Host<S> {
    pub const fn new(controller: SessionController<S>) -> Self {
        Self { controller }
    }

    pub const fn controller(&self) -> &SessionController<S> {
        &self.controller
    }

    /// Resumes the session left active by a previous host process.
    pub fn resume(&mut self, trust_instances: bool) {
        match self.controller.try_resume(trust_instances) {
            Ok(Some(outcome)) => tracing::info!(?outcome, "resumed previous session"),
            Ok(None) => tracing::debug!("no session to resume"),
            Err(err) => tracing::warn!(error = %err, "failed to resume previous session"),
        }
    }

    /// Decodes and answers one frame.
    pub fn handle_frame(&mut self, body: &[u8]) -> Response {
        match Request::parse(body) {
            Ok(request) => self.handle(request),
            Err(bad) => {
                tracing::warn!(id = bad.id, error = %bad.error, "invalid request");
                Response::err(bad.id, format!("invalid request: {}", bad.error))
            }
        }
    }

    /// Answers one request.
    pub fn handle(&mut self, request: Request) -> Response {
        let Request { id, action } = request;
        tracing::debug!(id, ?action, "request");
        match self.dispatch(action) {
            Ok(data) => Response::ok(id, data),
            Err(err) => {
                tracing::debug!(id, error = %err, "request failed");
                Response::err(id, err)
            }
        }
    }

    fn dispatch(&mut self, action: Action) -> Result<Option<Value>, ControlError> {
        let ctl = &mut self.controller;
        match action {
            Action::TabFocused(tab) => ctl.tab_focused(&tab.url, tab.tab_id).map(event_data),
            Action::TabUnfocused(tab) => ctl.tab_unfocused(&tab.url, tab.tab_id).map(event_data),
            Action::TabClosed(tab) => ctl.tab_closed(&tab.url, tab.tab_id).map(event_data),
            Action::Start { session_name } => {
                // Tab ids from an earlier browser run are stale.
                ctl.start(&session_name, false)?;
                Ok(None)
            }
            Action::Stop => {
                ctl.stop()?;
                Ok(None)
            }
            Action::GetData => {
                let report = ctl.report()?;
                Ok(Some(json!({ "report": report })))
            }
            Action::GetActive => Ok(ctl
                .active_session_name()
                .map(|name| json!({ "session_name": name.as_str() }))),
            Action::Ping => Ok(None),
            Action::GetSessions => {
                let sessions = ctl.list_sessions()?;
                Ok(Some(json!({ "sessions": sessions })))
            }
            Action::DeleteSession { session_name } => {
                ctl.delete_session(&session_name)?;
                Ok(None)
            }
        }
    }

    /// Runs one autosave checkpoint, logging failures.
    pub fn autosave(&mut self) {
        if let Err(err) = self.controller.autosave_tick() {
            tracing::error!(error = %err, "autosave failed");
        }
    }

    /// Suspends the active session, if any.
    pub fn shutdown(&mut self) {
        if !self.controller.is_active() {
            return;
        }
        if let Err(err) = self.controller.suspend() {
            tracing::error!(error = %err, "failed to save session on shutdown");
        }
    }
}

fn event_data(outcome: EventOutcome) -> Option<Value> {
    match outcome {
        EventOutcome::Applied => None,
        EventOutcome::Ignored(reason) => Some(json!({ "ignored": reason.to_string() })),
    }
}

/// Serves requests from `reader` until EOF, a read error or `shutdown`
/// resolves, then suspends the active session.
pub async fn serve<S, R, W, F>(
    host: &mut Host<S>,
    reader: R,
    writer: &mut W,
    autosave_every: Duration,
    shutdown: F,
) -> Result<()>
where
    S: BlobStore,
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin,
    F: Future<Output = ()>,
{
    // `read_exact` is not cancel-safe, so frames are read on their own task
    // and handed over through a channel.
    let (tx, mut frames) = mpsc::channel(FRAME_BUFFER);
    let reader_task = tokio::spawn(read_frames(reader, tx));

    let mut autosave = tokio::time::interval_at(Instant::now() + autosave_every, autosave_every);
    autosave.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(Ok(body)) => {
                    let response = host.handle_frame(&body);
                    if let Err(err) = write_frame(writer, &response).await {
                        break Err(err).context("failed to write response");
                    }
                }
                Some(Err(err)) => {
                    tracing::error!(error = %err, "failed to read message");
                    // Best effort; the stream is unusable either way.
                    let _ = write_frame(writer, &Response::err(0, &err)).await;
                    break Ok(());
                }
                None => {
                    tracing::info!("connection closed");
                    break Ok(());
                }
            },
            _ = autosave.tick() => host.autosave(),
            () = &mut shutdown => {
                tracing::info!("shutdown requested");
                break Ok(());
            }
        }
    };

    reader_task.abort();
    host.shutdown();
    result
}

async fn read_frames<R>(mut reader: R, tx: mpsc::Sender<io::Result<Vec<u8>>>)
where
    R: AsyncRead + Unpin,
{
    loop {
        match read_frame(&mut reader).await {
            Ok(Some(body)) => {
                if tx.send(Ok(body)).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(err) => {
                let _ = tx.send(Err(err)).await;
                return;
            }
        }
    }
}

/// Runs the host on stdin/stdout.
pub fn run(config: &Config) -> Result<()> {
    let db = open_database(config)?;
    let mut host = Host::new(SessionController::with_system_clock(db));
    host.resume(config.resume_trusts_instances);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to initialize tokio runtime")?;

    tracing::info!(autosave_secs = config.autosave_interval().as_secs(), "native host started");
    let result = runtime.block_on(async {
        let shutdown = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        };
        serve(
            &mut host,
            tokio::io::stdin(),
            &mut tokio::io::stdout(),
            config.autosave_interval(),
            shutdown,
        )
        .await
    });
    // The stdin reader may still be blocked in a read.
    runtime.shutdown_background();
    result
}
