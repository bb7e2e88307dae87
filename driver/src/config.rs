//! Run configuration consumed by the driver loop.

use std::path::PathBuf;

use simtrace_core::RecordingQuality;
use simtrace_system_checkpoint::CheckpointNames;
use simtrace_system_telemetry::DEFAULT_BUFFER_CAPACITY;
use thiserror::Error;

/// Default file name of the telemetry log inside the results directory.
pub const DEFAULT_LOG_NAME: &str = "particle_state_log.csv";
/// Default file name of the recording stream inside the results directory.
pub const DEFAULT_RECORDING_NAME: &str = "recording.jsonl";
/// Steps between two exported snapshots unless overridden.
pub const DEFAULT_OUTPUT_INTERVAL: u64 = 1_000;
/// Steps between two rendered frames unless overridden.
pub const DEFAULT_FRAME_INTERVAL: u64 = 500;

/// How long a run lasts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RunLength {
    /// A fixed number of engine steps.
    Steps(u64),
    /// Simulated seconds, converted using the engine timestep.
    SimulatedSeconds(f64),
}

/// File names of every artifact a run writes into its results directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArtifactNames {
    /// Telemetry log.
    pub log: String,
    /// Recording stream.
    pub recording: String,
    /// Outcome-tagged checkpoints.
    pub checkpoints: CheckpointNames,
}

impl Default for ArtifactNames {
    fn default() -> Self {
        Self {
            log: DEFAULT_LOG_NAME.to_owned(),
            recording: DEFAULT_RECORDING_NAME.to_owned(),
            checkpoints: CheckpointNames::default(),
        }
    }
}

/// Parameters of a single run. No argument parsing happens here.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// Total run length.
    pub run_length: RunLength,
    /// Steps between two exported snapshots.
    pub output_interval: u64,
    /// Steps between two rendered frames, or `None` to render no frames.
    pub frame_interval: Option<u64>,
    /// Records buffered before the telemetry log is written.
    pub buffer_capacity: usize,
    /// Directory receiving every artifact of the run.
    pub results_dir: PathBuf,
    /// Recording quality, or `None` to skip recording.
    pub recording_quality: Option<RecordingQuality>,
    /// Artifact file names.
    pub artifacts: ArtifactNames,
}

impl RunConfig {
    /// Creates a configuration with default cadences.
    #[must_use]
    pub fn new(results_dir: impl Into<PathBuf>, run_length: RunLength) -> Self {
        Self {
            run_length,
            output_interval: DEFAULT_OUTPUT_INTERVAL,
            frame_interval: Some(DEFAULT_FRAME_INTERVAL),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            results_dir: results_dir.into(),
            recording_quality: Some(RecordingQuality::default()),
            artifacts: ArtifactNames::default(),
        }
    }

    /// Checks every value that does not depend on the engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_interval == 0 {
            return Err(ConfigError::ZeroInterval("output"));
        }
        if self.frame_interval == Some(0) {
            return Err(ConfigError::ZeroInterval("frame"));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::ZeroBufferCapacity);
        }
        match self.run_length {
            RunLength::Steps(0) => return Err(ConfigError::ZeroSteps),
            RunLength::SimulatedSeconds(seconds) if !(seconds.is_finite() && seconds > 0.0) => {
                return Err(ConfigError::InvalidDuration(seconds));
            }
            RunLength::Steps(_) | RunLength::SimulatedSeconds(_) => {}
        }

        let names = [
            ("log", self.artifacts.log.as_str()),
            ("recording", self.artifacts.recording.as_str()),
            ("final checkpoint", self.artifacts.checkpoints.final_name.as_str()),
            ("partial checkpoint", self.artifacts.checkpoints.partial_name.as_str()),
        ];
        for (index, (role, name)) in names.iter().enumerate() {
            if name.trim().is_empty() {
                return Err(ConfigError::EmptyArtifactName(*role));
            }
            if let Some((other, _)) = names[..index].iter().find(|(_, other)| other == name) {
                return Err(ConfigError::ArtifactCollision {
                    first: *other,
                    second: *role,
                    name: (*name).to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Location of the telemetry log.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        self.results_dir.join(&self.artifacts.log)
    }

    /// Location of the recording stream.
    #[must_use]
    pub fn recording_path(&self) -> PathBuf {
        self.results_dir.join(&self.artifacts.recording)
    }

    /// Number of steps the run advances, given the engine's timestep in seconds.
    ///
    /// A duration is converted as `seconds * floor(1 / timestep)`.
    pub fn resolve_steps(&self, timestep: f64) -> Result<u64, ConfigError> {
        let steps = match self.run_length {
            RunLength::Steps(steps) => steps,
            RunLength::SimulatedSeconds(seconds) => {
                if !(timestep.is_finite() && timestep > 0.0) {
                    return Err(ConfigError::InvalidTimestep(timestep));
                }
                let steps_per_second = (1.0 / timestep).floor();
                (seconds * steps_per_second).floor() as u64
            }
        };

        if steps == 0 {
            return Err(ConfigError::ZeroSteps);
        }
        Ok(steps)
    }
}

/// Invalid configuration detected before any artifact is touched.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// A cadence was zero.
    #[error("{0} interval must be positive")]
    ZeroInterval(&'static str),
    /// The telemetry buffer could hold no records.
    #[error("buffer capacity must be positive")]
    ZeroBufferCapacity,
    /// The run would not advance a single step.
    #[error("run must advance at least one step")]
    ZeroSteps,
    /// A duration-based run was not a positive, finite number of seconds.
    #[error("run duration must be a positive number of seconds (got {0})")]
    InvalidDuration(f64),
    /// The engine reported an unusable timestep.
    #[error("engine timestep must be a positive number of seconds (got {0})")]
    InvalidTimestep(f64),
    /// An artifact had an empty file name.
    #[error("{0} file name must not be empty")]
    EmptyArtifactName(&'static str),
    /// Two artifacts would be written to the same file.
    #[error("{first} and {second} would both be written to '{name}'")]
    ArtifactCollision {
        /// Artifact listed first.
        first: &'static str,
        /// Artifact that collides with it.
        second: &'static str,
        /// Shared file name.
        name: String,
    },
    /// [`crate::Driver::run`] was called on a driver that already ran.
    #[error("driver has already run")]
    AlreadyRan,
}
