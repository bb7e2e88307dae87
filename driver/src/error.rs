//! Failures surfaced by [`crate::Driver::run`].

use std::{error::Error, fmt, io, path::PathBuf};

use simtrace_core::{EngineError, ErrorClass, StepIndex};
use simtrace_system_checkpoint::CheckpointError;
use simtrace_system_recording::SessionError;
use simtrace_system_telemetry::TelemetryError;

use crate::ConfigError;

/// What went wrong during a run.
#[derive(Debug)]
pub enum RunErrorKind {
    /// The configuration was rejected before any I/O.
    Configuration(ConfigError),
    /// The results directory could not be prepared.
    ResultsDirectory {
        /// Directory that was being created.
        path: PathBuf,
        /// Underlying operating system error.
        source: io::Error,
    },
    /// The engine failed to advance, snapshot or render.
    Engine(EngineError),
    /// The telemetry log could not be written.
    Telemetry(TelemetryError),
    /// The recording session could not be opened or closed.
    Recording(SessionError),
    /// The terminal checkpoint could not be written.
    Checkpoint(CheckpointError),
}

impl RunErrorKind {
    /// Stable classification of the failure.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Configuration(_) => ErrorClass::Configuration,
            Self::ResultsDirectory { .. } => ErrorClass::Io,
            Self::Engine(error) => error.class(),
            Self::Telemetry(TelemetryError::ZeroCapacity) => ErrorClass::Configuration,
            Self::Telemetry(_) => ErrorClass::Io,
            Self::Recording(SessionError::Engine(error)) => error.class(),
            Self::Recording(SessionError::AlreadyOpen { .. }) => ErrorClass::Engine,
            Self::Checkpoint(CheckpointError::Engine(error)) => error.class(),
            Self::Checkpoint(CheckpointError::Directory { .. }) => ErrorClass::Io,
            Self::Checkpoint(
                CheckpointError::IdenticalNames(_) | CheckpointError::EmptyName,
            ) => ErrorClass::Configuration,
        }
    }
}

impl fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration(error) => write!(f, "invalid configuration: {error}"),
            Self::ResultsDirectory { path, source } => {
                write!(
                    f,
                    "results directory '{}' could not be created: {source}",
                    path.display()
                )
            }
            Self::Engine(error) => write!(f, "engine failure: {error}"),
            Self::Telemetry(error) => write!(f, "telemetry failure: {error}"),
            Self::Recording(error) => write!(f, "recording failure: {error}"),
            Self::Checkpoint(error) => write!(f, "checkpoint failure: {error}"),
        }
    }
}

/// Run failure annotated with where it happened and what was left on disk.
#[derive(Debug)]
pub struct RunError {
    step: Option<StepIndex>,
    kind: RunErrorKind,
    checkpoint: Option<PathBuf>,
}

impl RunError {
    /// Creates an error that is not tied to a particular step.
    #[must_use]
    pub fn new(kind: RunErrorKind) -> Self {
        Self {
            step: None,
            kind,
            checkpoint: None,
        }
    }

    /// Creates an error raised while processing `step`.
    #[must_use]
    pub fn at(step: StepIndex, kind: RunErrorKind) -> Self {
        Self {
            step: Some(step),
            kind,
            checkpoint: None,
        }
    }

    pub(crate) fn with_checkpoint(mut self, path: PathBuf) -> Self {
        self.checkpoint = Some(path);
        self
    }

    /// Step being processed when the failure happened, if any.
    #[must_use]
    pub fn step(&self) -> Option<StepIndex> {
        self.step
    }

    /// Underlying failure.
    #[must_use]
    pub fn kind(&self) -> &RunErrorKind {
        &self.kind
    }

    /// Stable classification of the failure.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        self.kind.class()
    }

    /// Partial checkpoint left behind for post-mortem analysis, if one was written.
    #[must_use]
    pub fn checkpoint(&self) -> Option<&PathBuf> {
        self.checkpoint.as_ref()
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(step) => write!(f, "run failed at step {step}: {}", self.kind),
            None => write!(f, "run failed: {}", self.kind),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            RunErrorKind::Configuration(error) => Some(error),
            RunErrorKind::ResultsDirectory { source, .. } => Some(source),
            RunErrorKind::Engine(error) => Some(error),
            RunErrorKind::Telemetry(error) => Some(error),
            RunErrorKind::Recording(error) => Some(error),
            RunErrorKind::Checkpoint(error) => Some(error),
        }
    }
}

impl From<ConfigError> for RunError {
    fn from(error: ConfigError) -> Self {
        Self::new(RunErrorKind::Configuration(error))
    }
}
