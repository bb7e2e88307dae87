#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Driver loop that advances an engine and persists its output.
//!
//! A [`Driver`] moves through `Initialized → Running → {Completed | Failed}`.
//! While running it advances the engine once per step, captures a frame on
//! the frame cadence and snapshots every tracked entity on the output
//! cadence. Whatever the outcome, the telemetry buffer is finalized, the
//! recording session is closed and exactly one outcome-tagged checkpoint is
//! written before [`Driver::run`] returns.

mod config;
mod error;

use std::{
    fs,
    path::{Path, PathBuf},
};

use simtrace_core::{CheckpointTag, EngineAdapter, StateRecord, StepIndex};
use simtrace_system_checkpoint::CheckpointManager;
use simtrace_system_frame_capture::FrameCapture;
use simtrace_system_recording::{RecordingPlan, ScopedRecording};
use simtrace_system_telemetry::{CsvLog, RecordLog, TelemetryError, TelemetrySink};
use tracing::{debug, error, info, warn};

pub use config::{
    ArtifactNames, ConfigError, RunConfig, RunLength, DEFAULT_FRAME_INTERVAL, DEFAULT_LOG_NAME,
    DEFAULT_OUTPUT_INTERVAL, DEFAULT_RECORDING_NAME,
};
pub use error::{RunError, RunErrorKind};

/// Number of progress reports emitted over the course of a run.
const PROGRESS_REPORTS: u64 = 10;

/// Lifecycle of a driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunState {
    /// Engine built, nothing started.
    Initialized,
    /// The step loop is executing.
    Running,
    /// Every configured step was advanced and the final checkpoint written.
    Completed,
    /// The run stopped on an error.
    Failed,
}

/// Summary of a completed run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Steps advanced by the engine.
    pub steps_advanced: u64,
    /// Steps whose snapshot was exported.
    pub exported_steps: u64,
    /// Rows written to the telemetry log.
    pub rows_written: u64,
    /// Batches written to the telemetry log.
    pub flushes: u64,
    /// Frames rendered.
    pub frames_captured: u64,
    /// Telemetry log location.
    pub log_path: PathBuf,
    /// Final checkpoint location.
    pub checkpoint: PathBuf,
}

#[derive(Debug, Default)]
struct Progress {
    steps_advanced: u64,
    exported_steps: u64,
}

/// Orchestrates a single run of an engine.
#[derive(Debug)]
pub struct Driver<E> {
    engine: E,
    config: RunConfig,
    state: RunState,
}

impl<E> Driver<E>
where
    E: EngineAdapter,
{
    /// Validates `config` and prepares a driver. No file is touched yet.
    pub fn new(engine: E, config: RunConfig) -> Result<Self, RunError> {
        config.validate()?;
        Ok(Self {
            engine,
            config,
            state: RunState::Initialized,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Configuration the driver was built with.
    #[must_use]
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Read-only access to the engine.
    #[must_use]
    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Returns the engine, consuming the driver.
    #[must_use]
    pub fn into_engine(self) -> E {
        self.engine
    }

    /// Executes the run to completion or to its first failure.
    ///
    /// Telemetry goes to a CSV log recreated at [`RunConfig::log_path`].
    pub fn run(&mut self) -> Result<RunReport, RunError> {
        self.run_with_log(|path| CsvLog::create(path))
    }

    /// Executes the run, writing telemetry into the log `open_log` creates at
    /// [`RunConfig::log_path`] once the results directory exists.
    pub fn run_with_log<L, F>(&mut self, open_log: F) -> Result<RunReport, RunError>
    where
        L: RecordLog,
        F: FnOnce(&Path) -> Result<L, TelemetryError>,
    {
        if self.state != RunState::Initialized {
            return Err(ConfigError::AlreadyRan.into());
        }

        let result = self.execute(open_log);
        self.state = if result.is_ok() {
            RunState::Completed
        } else {
            RunState::Failed
        };
        result
    }

    fn execute<L, F>(&mut self, open_log: F) -> Result<RunReport, RunError>
    where
        L: RecordLog,
        F: FnOnce(&Path) -> Result<L, TelemetryError>,
    {
        let total_steps = self.config.resolve_steps(self.engine.timestep())?;
        let results_dir = self.config.results_dir.clone();
        let checkpoints =
            CheckpointManager::new(&results_dir, self.config.artifacts.checkpoints.clone())
                .map_err(|error| RunError::new(RunErrorKind::Checkpoint(error)))?;
        let mut capture = self
            .config
            .frame_interval
            .map(|interval| FrameCapture::new(interval, &results_dir))
            .transpose()
            .map_err(|_| RunError::from(ConfigError::ZeroInterval("frame")))?;

        fs::create_dir_all(&results_dir).map_err(|source| {
            RunError::new(RunErrorKind::ResultsDirectory {
                path: results_dir.clone(),
                source,
            })
        })?;
        let log_path = self.config.log_path();
        let mut sink = open_log(&log_path)
            .and_then(|log| TelemetrySink::new(log, self.config.buffer_capacity))
            .map_err(|error| RunError::new(RunErrorKind::Telemetry(error)))?;
        let plan = match self.config.recording_quality {
            Some(quality) => RecordingPlan::Enabled {
                path: self.config.recording_path(),
                quality,
            },
            None => RecordingPlan::Disabled,
        };
        let mut recording = ScopedRecording::open(&mut self.engine, &plan)
            .map_err(|error| RunError::new(RunErrorKind::Recording(error)))?;

        self.state = RunState::Running;
        info!(
            total_steps,
            output_interval = self.config.output_interval,
            frame_interval = ?self.config.frame_interval,
            buffer_capacity = self.config.buffer_capacity,
            results_dir = %results_dir.display(),
            "run started"
        );

        let mut progress = Progress::default();
        let outcome = step_loop(
            recording.engine(),
            &mut sink,
            &mut capture,
            total_steps,
            self.config.output_interval,
            &mut progress,
        )
        .and_then(|()| {
            finalize_sink(&mut sink)
                .map_err(|kind| RunError::at(StepIndex::new(total_steps.saturating_sub(1)), kind))
        });

        if let Err(error) = outcome {
            let error = match save_partial(recording.engine(), &checkpoints, &mut sink) {
                Some(path) => error.with_checkpoint(path),
                None => error,
            };
            if let Err(close_error) = recording.close() {
                warn!(%close_error, "recording session failed to close after run failure");
            }
            error!(step = ?error.step(), %error, "run failed");
            return Err(error);
        }

        if let Err(close_error) = recording.close() {
            let error = RunError::new(RunErrorKind::Recording(close_error));
            let error = match save_partial(&mut self.engine, &checkpoints, &mut sink) {
                Some(path) => error.with_checkpoint(path),
                None => error,
            };
            error!(%error, "run failed while closing the recording session");
            return Err(error);
        }

        let checkpoint = checkpoints
            .save(&mut self.engine, CheckpointTag::Final)
            .map_err(|error| RunError::new(RunErrorKind::Checkpoint(error)))?;

        let stats = sink.stats();
        let report = RunReport {
            steps_advanced: progress.steps_advanced,
            exported_steps: progress.exported_steps,
            rows_written: stats.rows_flushed,
            flushes: stats.flushes,
            frames_captured: capture.as_ref().map_or(0, FrameCapture::captured),
            log_path,
            checkpoint,
        };
        info!(
            steps = report.steps_advanced,
            rows = report.rows_written,
            frames = report.frames_captured,
            "run completed"
        );
        Ok(report)
    }
}

fn step_loop<A, L>(
    engine: &mut A,
    sink: &mut TelemetrySink<L>,
    capture: &mut Option<FrameCapture>,
    total_steps: u64,
    output_interval: u64,
    progress: &mut Progress,
) -> Result<(), RunError>
where
    A: EngineAdapter,
    L: RecordLog,
{
    let report_every = (total_steps / PROGRESS_REPORTS).max(1);
    let mut step = StepIndex::ZERO;

    while step.get() < total_steps {
        engine
            .advance()
            .map_err(|error| RunError::at(step, RunErrorKind::Engine(error)))?;
        progress.steps_advanced += 1;

        if let Some(capture) = capture.as_mut() {
            let _ = capture
                .maybe_capture(step, |path| engine.render_frame(path))
                .map_err(|error| RunError::at(step, RunErrorKind::Engine(error)))?;
        }

        if step.is_multiple_of(output_interval) {
            let particles = engine
                .snapshot()
                .map_err(|error| RunError::at(step, RunErrorKind::Engine(error)))?;
            let count = particles.len();
            for particle in particles {
                sink.record(StateRecord::from_particle(step, particle))
                    .map_err(|error| RunError::at(step, RunErrorKind::Telemetry(error)))?;
            }
            progress.exported_steps += 1;
            debug!(%step, entities = count, buffered = sink.buffered(), "exported snapshot");
        }

        if progress.steps_advanced % report_every == 0 {
            info!(
                %step,
                percent = progress.steps_advanced * 100 / total_steps,
                rows = sink.stats().records_accepted,
                "run progress"
            );
        }
        step = step.next();
    }
    Ok(())
}

fn finalize_sink<L: RecordLog>(sink: &mut TelemetrySink<L>) -> Result<(), RunErrorKind> {
    sink.finalize().map(drop).map_err(RunErrorKind::Telemetry)
}

/// Failure-path cleanup: flush what is buffered, then leave a partial checkpoint.
///
/// Errors here are logged; the caller reports the failure that ended the run.
fn save_partial<A, L>(
    engine: &mut A,
    checkpoints: &CheckpointManager,
    sink: &mut TelemetrySink<L>,
) -> Option<PathBuf>
where
    A: EngineAdapter,
    L: RecordLog,
{
    if let Err(flush_error) = sink.finalize() {
        warn!(%flush_error, pending = sink.buffered(), "telemetry buffer lost on failure path");
    }

    match checkpoints.save(engine, CheckpointTag::Partial) {
        Ok(path) => Some(path),
        Err(checkpoint_error) => {
            error!(%checkpoint_error, "partial checkpoint could not be written");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use simtrace_core::scripted::ScriptedEngine;

    #[test]
    fn driver_starts_initialized() {
        let config = RunConfig::new("results", RunLength::Steps(1));
        let driver = Driver::new(ScriptedEngine::new(1), config).expect("valid config");
        assert_eq!(driver.state(), RunState::Initialized);
    }

    #[test]
    fn invalid_configuration_fails_before_io() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results = dir.path().join("never-created");
        let mut config = RunConfig::new(&results, RunLength::Steps(10));
        config.output_interval = 0;

        let error = Driver::new(ScriptedEngine::new(1), config).expect_err("rejected");
        assert_eq!(error.class(), simtrace_core::ErrorClass::Configuration);
        assert!(!results.exists());
    }

    #[test]
    fn a_driver_runs_only_once() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = RunConfig::new(dir.path(), RunLength::Steps(2));
        let mut driver = Driver::new(ScriptedEngine::new(1), config).expect("valid config");

        let _ = driver.run().expect("first run");
        let error = driver.run().expect_err("second run");
        assert!(matches!(
            error.kind(),
            RunErrorKind::Configuration(ConfigError::AlreadyRan)
        ));
        assert_eq!(driver.engine().steps(), 2);
    }
}
