#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Recording session lifecycle around the engine's video capture.
//!
//! [`RecordingSession`] is a two-state machine (`Closed`/`Open`) whose close
//! operation is idempotent. [`ScopedRecording`] binds a session to an engine
//! for the length of a run and closes it on every exit path, including
//! unwinding.

use std::path::{Path, PathBuf};

use simtrace_core::{EngineAdapter, EngineError, RecordingQuality};
use thiserror::Error;
use tracing::{info, warn};

/// Lifecycle state of a recording session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No recording stream is active.
    #[default]
    Closed,
    /// The engine is writing a recording stream.
    Open,
}

/// Failures raised while driving a recording session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A session was opened while another one was still active.
    #[error("recording session '{}' is already open", path.display())]
    AlreadyOpen {
        /// Destination of the session that is still active.
        path: PathBuf,
    },
    /// The engine refused to start or stop recording.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Whether and where a run records video.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordingPlan {
    /// The run does not record.
    Disabled,
    /// The run records to `path` at the given quality.
    Enabled {
        /// Destination of the recording stream.
        path: PathBuf,
        /// Encoder quality requested from the engine.
        quality: RecordingQuality,
    },
}

/// Two-state recording session; at most one stream is open at a time.
#[derive(Debug, Default)]
pub struct RecordingSession {
    state: SessionState,
    path: Option<PathBuf>,
}

impl RecordingSession {
    /// Creates a closed session.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks the engine to start recording to `path`.
    ///
    /// The session only becomes `Open` once the engine has accepted the request.
    pub fn open<E>(
        &mut self,
        engine: &mut E,
        path: &Path,
        quality: RecordingQuality,
    ) -> Result<(), SessionError>
    where
        E: EngineAdapter + ?Sized,
    {
        if let (SessionState::Open, Some(active)) = (self.state, self.path.as_ref()) {
            return Err(SessionError::AlreadyOpen {
                path: active.clone(),
            });
        }

        engine.start_recording(path, quality)?;
        self.state = SessionState::Open;
        self.path = Some(path.to_path_buf());
        info!(path = %path.display(), %quality, "recording session opened");
        Ok(())
    }

    /// Stops the active recording. Closing a closed session is a no-op.
    ///
    /// The session is marked `Closed` before the engine is asked to stop, so a
    /// failing stop is reported once and never released twice.
    pub fn close<E>(&mut self, engine: &mut E) -> Result<(), SessionError>
    where
        E: EngineAdapter + ?Sized,
    {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        self.state = SessionState::Closed;
        let path = self.path.take();
        engine.stop_recording()?;
        if let Some(path) = path {
            info!(path = %path.display(), "recording session closed");
        }
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Reports whether a stream is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }
}

/// Recording session bound to an engine for the duration of a run.
///
/// Dropping the guard closes a still-open session; failures during that
/// implicit close are logged because `Drop` cannot report them.
#[derive(Debug)]
pub struct ScopedRecording<'e, E>
where
    E: EngineAdapter,
{
    engine: &'e mut E,
    session: RecordingSession,
}

impl<'e, E> ScopedRecording<'e, E>
where
    E: EngineAdapter,
{
    /// Opens the session described by `plan`. A disabled plan opens nothing.
    pub fn open(engine: &'e mut E, plan: &RecordingPlan) -> Result<Self, SessionError> {
        let mut session = RecordingSession::new();
        if let RecordingPlan::Enabled { path, quality } = plan {
            session.open(engine, path, *quality)?;
        }
        Ok(Self { engine, session })
    }

    /// Mutable access to the engine while the session is held.
    pub fn engine(&mut self) -> &mut E {
        &mut *self.engine
    }

    /// Read-only view of the session.
    #[must_use]
    pub fn session(&self) -> &RecordingSession {
        &self.session
    }

    /// Closes the session and releases the engine borrow.
    pub fn close(mut self) -> Result<(), SessionError> {
        self.session.close(&mut *self.engine)
    }
}

impl<E> Drop for ScopedRecording<'_, E>
where
    E: EngineAdapter,
{
    fn drop(&mut self) {
        if !self.session.is_open() {
            return;
        }
        if let Err(error) = self.session.close(&mut *self.engine) {
            warn!(%error, "recording session failed to close during unwind");
        }
    }
}
