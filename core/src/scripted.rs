//! Scripted engine used by tests to exercise the pipeline without a solver.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{EngineAdapter, EngineError, EntityId, ParticleState, RecordingQuality, StepIndex, Vec3};

/// Deterministic engine whose particles move along straight lines.
///
/// Every artifact request writes a small marker file so tests can assert on
/// the file system, and individual operations can be told to fail.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    particles: u32,
    steps: u64,
    fail_advance_at: Option<StepIndex>,
    fail_snapshot_at: Option<StepIndex>,
    fail_render: bool,
    fail_stop: bool,
    fail_checkpoint: bool,
    recording: Option<PathBuf>,
    /// Calls made to [`EngineAdapter::start_recording`].
    pub start_calls: u32,
    /// Calls made to [`EngineAdapter::stop_recording`].
    pub stop_calls: u32,
    /// Frames rendered, in order.
    pub rendered: Vec<PathBuf>,
    /// Checkpoints written, in order.
    pub checkpoints: Vec<PathBuf>,
}

impl ScriptedEngine {
    /// Creates an engine tracking `particles` entities.
    #[must_use]
    pub fn new(particles: u32) -> Self {
        Self {
            particles,
            ..Self::default()
        }
    }

    /// Makes [`EngineAdapter::advance`] fail when computing `step`.
    #[must_use]
    pub fn failing_advance_at(mut self, step: u64) -> Self {
        self.fail_advance_at = Some(StepIndex::new(step));
        self
    }

    /// Makes [`EngineAdapter::snapshot`] fail once `step` has been advanced.
    #[must_use]
    pub fn failing_snapshot_at(mut self, step: u64) -> Self {
        self.fail_snapshot_at = Some(StepIndex::new(step));
        self
    }

    /// Makes every frame render fail.
    #[must_use]
    pub fn failing_render(mut self) -> Self {
        self.fail_render = true;
        self
    }

    /// Makes [`EngineAdapter::stop_recording`] fail.
    #[must_use]
    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    /// Makes [`EngineAdapter::save_checkpoint`] fail.
    #[must_use]
    pub fn failing_checkpoint(mut self) -> Self {
        self.fail_checkpoint = true;
        self
    }

    /// Number of successful calls to [`EngineAdapter::advance`].
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Reports whether a recording stream is active.
    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }
}

fn touch(path: &Path, contents: &str) -> Result<(), EngineError> {
    fs::write(path, contents).map_err(|error| EngineError::io(path, error))
}

impl EngineAdapter for ScriptedEngine {
    fn advance(&mut self) -> Result<(), EngineError> {
        let step = StepIndex::new(self.steps);
        if self.fail_advance_at == Some(step) {
            return Err(EngineError::Solver {
                step,
                reason: "scripted solver failure".to_owned(),
            });
        }
        self.steps += 1;
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Vec<ParticleState>, EngineError> {
        // `steps` counts completed advances, so the current step is one behind.
        let current = StepIndex::new(self.steps.saturating_sub(1));
        if self.fail_snapshot_at == Some(current) {
            return Err(EngineError::Snapshot {
                reason: format!("scripted readback failure at step {current}"),
            });
        }
        let time = self.steps as f64;
        Ok((0..self.particles)
            .map(|id| {
                let offset = f64::from(id);
                ParticleState::new(
                    EntityId::new(id),
                    Vec3::new(offset, time, 0.0),
                    Vec3::new(0.0, 1.0, 0.0),
                )
            })
            .collect())
    }

    fn render_frame(&mut self, path: &Path) -> Result<(), EngineError> {
        if self.fail_render {
            return Err(EngineError::Render {
                path: path.to_path_buf(),
                reason: "scripted render failure".to_owned(),
            });
        }
        touch(path, "frame")?;
        self.rendered.push(path.to_path_buf());
        Ok(())
    }

    fn start_recording(
        &mut self,
        path: &Path,
        quality: RecordingQuality,
    ) -> Result<(), EngineError> {
        if self.recording.is_some() {
            return Err(EngineError::Recording {
                reason: "encoder already running".to_owned(),
            });
        }
        touch(path, quality.as_str())?;
        self.start_calls += 1;
        self.recording = Some(path.to_path_buf());
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), EngineError> {
        self.stop_calls += 1;
        if self.recording.take().is_none() {
            return Err(EngineError::Recording {
                reason: "encoder released twice".to_owned(),
            });
        }
        if self.fail_stop {
            return Err(EngineError::Recording {
                reason: "scripted encoder failure".to_owned(),
            });
        }
        Ok(())
    }

    fn save_checkpoint(&mut self, path: &Path) -> Result<(), EngineError> {
        if self.fail_checkpoint {
            return Err(EngineError::Checkpoint {
                path: path.to_path_buf(),
                reason: "scripted serializer failure".to_owned(),
            });
        }
        touch(path, &format!("steps={}", self.steps))?;
        self.checkpoints.push(path.to_path_buf());
        Ok(())
    }

    fn timestep(&self) -> f64 {
        0.25
    }
}
