#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the simtrace pipeline.
//!
//! This crate defines the vocabulary that connects the driver loop, the
//! telemetry/frame/recording/checkpoint systems and any concrete engine. The
//! driver advances an [`EngineAdapter`] one step at a time, pulls
//! [`ParticleState`] snapshots at the export cadence and turns them into
//! immutable [`StateRecord`] rows. Engines report every failure as an
//! [`EngineError`]; nothing in the pipeline retries.

#[cfg(any(test, feature = "scripted"))]
pub mod scripted;

use std::{fmt, io, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Header row written once at the top of every output log.
pub const LOG_HEADER: [&str; 8] = ["step", "particle_id", "x", "y", "z", "vx", "vy", "vz"];

/// Discrete point in simulated time, counted in calls to [`EngineAdapter::advance`].
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StepIndex(u64);

impl StepIndex {
    /// The first step of every run.
    pub const ZERO: Self = Self(0);

    /// Creates a new step index with the provided numeric value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the step.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }

    /// Returns the step that immediately follows this one.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Reports whether the step falls on the provided cadence.
    ///
    /// A zero interval never matches; configuration validation rejects it
    /// before a run starts.
    #[must_use]
    pub const fn is_multiple_of(&self, interval: u64) -> bool {
        interval != 0 && self.0 % interval == 0
    }
}

impl fmt::Display for StepIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a tracked entity as reported by the engine.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(u32);

impl EntityId {
    /// Creates a new entity identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Three-component vector carried at simulation precision.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    /// Component along the x axis.
    pub x: f64,
    /// Component along the y axis.
    pub y: f64,
    /// Component along the z axis.
    pub z: f64,
}

impl Vec3 {
    /// Vector with every component set to zero.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Creates a vector from its components.
    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Returns the component-wise sum of two vectors.
    #[must_use]
    pub fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }

    /// Returns the vector scaled by `factor`.
    #[must_use]
    pub fn scale(self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

/// Position and velocity of a single tracked entity, as returned by the engine.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleState {
    /// Identifier reported by the engine; relayed without validation.
    pub id: EntityId,
    /// Position in world units.
    pub position: Vec3,
    /// Velocity in world units per second.
    pub velocity: Vec3,
}

impl ParticleState {
    /// Creates a new particle state descriptor.
    #[must_use]
    pub const fn new(id: EntityId, position: Vec3, velocity: Vec3) -> Self {
        Self {
            id,
            position,
            velocity,
        }
    }
}

/// One exported row of the output log.
///
/// Records are immutable once produced; the fields are only reachable through
/// accessors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    step: StepIndex,
    entity_id: EntityId,
    position: Vec3,
    velocity: Vec3,
}

impl StateRecord {
    /// Creates a record from its raw parts.
    #[must_use]
    pub const fn new(step: StepIndex, entity_id: EntityId, position: Vec3, velocity: Vec3) -> Self {
        Self {
            step,
            entity_id,
            position,
            velocity,
        }
    }

    /// Stamps an engine snapshot entry with the step it was taken at.
    #[must_use]
    pub const fn from_particle(step: StepIndex, particle: ParticleState) -> Self {
        Self::new(step, particle.id, particle.position, particle.velocity)
    }

    /// Step at which the snapshot was taken.
    #[must_use]
    pub const fn step(&self) -> StepIndex {
        self.step
    }

    /// Entity the record describes.
    #[must_use]
    pub const fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Position of the entity at the recorded step.
    #[must_use]
    pub const fn position(&self) -> Vec3 {
        self.position
    }

    /// Velocity of the entity at the recorded step.
    #[must_use]
    pub const fn velocity(&self) -> Vec3 {
        self.velocity
    }
}

/// Encoder quality requested when a recording session starts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordingQuality {
    /// Smallest artifact, coarsest sampling.
    Low,
    /// Balanced default.
    #[default]
    Medium,
    /// Every step is captured.
    High,
}

impl RecordingQuality {
    /// Canonical lowercase name of the quality level.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for RecordingQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordingQuality {
    type Err = UnknownQuality;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(UnknownQuality(value.to_owned())),
        }
    }
}

/// Raised when a recording quality name cannot be parsed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown recording quality '{0}' (expected low, medium or high)")]
pub struct UnknownQuality(pub String);

/// Outcome a checkpoint artifact is tagged with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointTag {
    /// Written after the run completed every configured step.
    Final,
    /// Written after the run failed; never overwrites the final artifact.
    Partial,
}

impl fmt::Display for CheckpointTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Final => f.write_str("final"),
            Self::Partial => f.write_str("partial"),
        }
    }
}

/// Coarse classification used when reporting run failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// The engine itself failed.
    Engine,
    /// A file could not be written.
    Io,
    /// The run was misconfigured and never started.
    Configuration,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine => f.write_str("engine"),
            Self::Io => f.write_str("io"),
            Self::Configuration => f.write_str("configuration"),
        }
    }
}

/// Failures reported by an [`EngineAdapter`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// The solver could not advance the simulation.
    #[error("solver failed at step {step}: {reason}")]
    Solver {
        /// Step the engine was attempting to compute.
        step: StepIndex,
        /// Engine-provided description of the failure.
        reason: String,
    },
    /// Entity state could not be read back from the engine.
    #[error("snapshot failed: {reason}")]
    Snapshot {
        /// Engine-provided description of the failure.
        reason: String,
    },
    /// A frame could not be rendered.
    #[error("rendering '{}' failed: {reason}", path.display())]
    Render {
        /// Destination of the frame.
        path: PathBuf,
        /// Engine-provided description of the failure.
        reason: String,
    },
    /// The recording stream could not be started, written or stopped.
    #[error("recording failed: {reason}")]
    Recording {
        /// Engine-provided description of the failure.
        reason: String,
    },
    /// Full simulation state could not be serialized.
    #[error("checkpoint '{}' failed: {reason}", path.display())]
    Checkpoint {
        /// Destination of the checkpoint.
        path: PathBuf,
        /// Engine-provided description of the failure.
        reason: String,
    },
    /// An artifact could not be written to disk.
    #[error("writing '{}' failed: {source}", path.display())]
    Io {
        /// File the engine was writing.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
}

impl EngineError {
    /// Wraps an I/O error raised while touching `path`.
    #[must_use]
    pub fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Stable classification for reporting.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Io { .. } => ErrorClass::Io,
            Self::Solver { .. }
            | Self::Snapshot { .. }
            | Self::Render { .. }
            | Self::Recording { .. }
            | Self::Checkpoint { .. } => ErrorClass::Engine,
        }
    }
}

/// Narrow contract the pipeline requires from a simulation engine.
///
/// Every call blocks until the engine is done. Implementations own whatever
/// internal parallelism they use; the pipeline only ever calls them from a
/// single thread.
pub trait EngineAdapter {
    /// Advances the simulation by exactly one step.
    fn advance(&mut self) -> Result<(), EngineError>;

    /// Returns the state of every tracked entity at the current step.
    fn snapshot(&mut self) -> Result<Vec<ParticleState>, EngineError>;

    /// Renders the current scene to an image at `path`.
    fn render_frame(&mut self, path: &Path) -> Result<(), EngineError>;

    /// Starts writing a recording stream to `path`.
    fn start_recording(&mut self, path: &Path, quality: RecordingQuality)
        -> Result<(), EngineError>;

    /// Stops the active recording stream and releases the encoder.
    fn stop_recording(&mut self) -> Result<(), EngineError>;

    /// Serializes full simulation state to `path`.
    fn save_checkpoint(&mut self, path: &Path) -> Result<(), EngineError>;

    /// Simulated seconds covered by one call to [`EngineAdapter::advance`].
    fn timestep(&self) -> f64;
}
