#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic ballistic particle engine implementing the simtrace engine contract.
//!
//! Particles start on a lattice, fall under constant gravity and bounce off
//! the walls of an axis-aligned domain. There are no inter-particle forces.
//! The engine exists to run the pipeline end to end: it renders top-down PNG
//! frames, streams a JSON-lines recording and writes JSON checkpoints that
//! [`BallisticEngine::restore`] can load again.

mod render;
mod scene;

use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use simtrace_core::{
    EngineAdapter, EngineError, EntityId, ParticleState, RecordingQuality, StepIndex, Vec3,
};
use tracing::{debug, info};

pub use scene::{ParticleBlock, SceneConfig, SceneError, MAX_PARTICLES};

const CHECKPOINT_FORMAT: &str = "simtrace-ballistic";
const CHECKPOINT_VERSION: u32 = 1;

/// Complete serializable state of the engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
struct EngineState {
    scene: SceneConfig,
    step: u64,
    particles: Vec<ParticleState>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CheckpointFile {
    format: String,
    version: u32,
    state: EngineState,
}

#[derive(Debug, Serialize)]
struct RecordingSample {
    step: u64,
    time: f64,
    particles: usize,
    centroid: Vec3,
    max_speed: f64,
}

#[derive(Debug)]
struct Recorder {
    path: PathBuf,
    writer: BufWriter<File>,
    every: u64,
}

/// Reference engine integrating free-falling particles inside a box.
#[derive(Debug)]
pub struct BallisticEngine {
    state: EngineState,
    recorder: Option<Recorder>,
    fault_at: Option<StepIndex>,
}

impl BallisticEngine {
    /// Builds the scene and samples its particle block.
    pub fn new(scene: SceneConfig) -> Result<Self, SceneError> {
        scene.validate()?;
        let particles = sample_block(&scene.block);
        info!(particles = particles.len(), "ballistic scene built");
        Ok(Self {
            state: EngineState {
                scene,
                step: 0,
                particles,
            },
            recorder: None,
            fault_at: None,
        })
    }

    /// Loads an engine from a checkpoint written by [`EngineAdapter::save_checkpoint`].
    pub fn restore(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|error| EngineError::io(path, error))?;
        let checkpoint: CheckpointFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|error| checkpoint_error(path, error.to_string()))?;

        if checkpoint.format != CHECKPOINT_FORMAT {
            return Err(checkpoint_error(
                path,
                format!("unsupported format '{}'", checkpoint.format),
            ));
        }
        if checkpoint.version != CHECKPOINT_VERSION {
            return Err(checkpoint_error(
                path,
                format!("unsupported version {}", checkpoint.version),
            ));
        }
        checkpoint
            .state
            .scene
            .validate()
            .map_err(|error| checkpoint_error(path, error.to_string()))?;

        info!(
            path = %path.display(),
            step = checkpoint.state.step,
            particles = checkpoint.state.particles.len(),
            "ballistic state restored"
        );
        Ok(Self {
            state: checkpoint.state,
            recorder: None,
            fault_at: None,
        })
    }

    /// Makes [`EngineAdapter::advance`] fail when it would compute `step`.
    #[must_use]
    pub fn with_fault_at(mut self, step: StepIndex) -> Self {
        self.fault_at = Some(step);
        self
    }

    /// Scene the engine was built from.
    #[must_use]
    pub fn scene(&self) -> &SceneConfig {
        &self.state.scene
    }

    /// Steps integrated since the scene was built.
    #[must_use]
    pub fn step(&self) -> StepIndex {
        StepIndex::new(self.state.step)
    }

    /// Current particle states.
    #[must_use]
    pub fn particles(&self) -> &[ParticleState] {
        &self.state.particles
    }

    fn sample(&self, particles: &[ParticleState]) -> RecordingSample {
        let count = particles.len();
        let sum = particles
            .iter()
            .fold(Vec3::ZERO, |sum, particle| sum.add(particle.position));
        let max_speed = particles
            .iter()
            .map(|particle| speed(particle.velocity))
            .fold(0.0, f64::max);
        RecordingSample {
            step: self.state.step,
            time: self.state.step as f64 * self.state.scene.timestep,
            particles: count,
            centroid: if count == 0 {
                Vec3::ZERO
            } else {
                sum.scale(1.0 / count as f64)
            },
            max_speed,
        }
    }

    fn record_sample(&mut self, particles: &[ParticleState]) -> Result<(), EngineError> {
        let Some(every) = self.recorder.as_ref().map(|recorder| recorder.every) else {
            return Ok(());
        };
        if self.state.step % every != 0 {
            return Ok(());
        }

        let sample = self.sample(particles);
        if let Some(recorder) = self.recorder.as_mut() {
            serde_json::to_writer(&mut recorder.writer, &sample).map_err(|error| {
                EngineError::Recording {
                    reason: error.to_string(),
                }
            })?;
            recorder
                .writer
                .write_all(b"\n")
                .map_err(|error| EngineError::io(&recorder.path, error))?;
        }
        Ok(())
    }
}

/// Integrates one step of `scene` into `particles`.
fn integrate(scene: &SceneConfig, particles: &mut [ParticleState]) {
    let h = scene.timestep / f64::from(scene.substeps);
    for _ in 0..scene.substeps {
        for particle in particles.iter_mut() {
            particle.velocity = particle.velocity.add(scene.gravity.scale(h));
            particle.position = particle.position.add(particle.velocity.scale(h));
            let Vec3 { x, y, z } = &mut particle.position;
            let velocity = &mut particle.velocity;
            reflect(x, &mut velocity.x, scene.lower.x, scene.upper.x, scene.restitution);
            reflect(y, &mut velocity.y, scene.lower.y, scene.upper.y, scene.restitution);
            reflect(z, &mut velocity.z, scene.lower.z, scene.upper.z, scene.restitution);
        }
    }
}

impl EngineAdapter for BallisticEngine {
    fn advance(&mut self) -> Result<(), EngineError> {
        let step = StepIndex::new(self.state.step);
        if self.fault_at == Some(step) {
            return Err(EngineError::Solver {
                step,
                reason: "injected fault".to_owned(),
            });
        }

        // State is committed only once the step fully succeeded.
        let mut particles = self.state.particles.clone();
        integrate(&self.state.scene, &mut particles);
        if particles
            .iter()
            .any(|particle| !is_finite(particle.position) || !is_finite(particle.velocity))
        {
            return Err(EngineError::Solver {
                step,
                reason: "particle state became non-finite".to_owned(),
            });
        }

        self.record_sample(&particles)?;
        self.state.particles = particles;
        self.state.step += 1;
        Ok(())
    }

    fn snapshot(&mut self) -> Result<Vec<ParticleState>, EngineError> {
        Ok(self.state.particles.clone())
    }

    fn render_frame(&mut self, path: &Path) -> Result<(), EngineError> {
        let frame = render::rasterize(&self.state.scene, &self.state.particles);
        render::write_png(&frame, path)?;
        debug!(path = %path.display(), "frame rendered");
        Ok(())
    }

    fn start_recording(
        &mut self,
        path: &Path,
        quality: RecordingQuality,
    ) -> Result<(), EngineError> {
        if let Some(active) = &self.recorder {
            return Err(EngineError::Recording {
                reason: format!("already recording to '{}'", active.path.display()),
            });
        }

        let file = File::create(path).map_err(|error| EngineError::io(path, error))?;
        self.recorder = Some(Recorder {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            every: sample_stride(quality),
        });
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), EngineError> {
        let Some(mut recorder) = self.recorder.take() else {
            return Err(EngineError::Recording {
                reason: "no recording in progress".to_owned(),
            });
        };
        recorder
            .writer
            .flush()
            .map_err(|error| EngineError::io(&recorder.path, error))
    }

    fn save_checkpoint(&mut self, path: &Path) -> Result<(), EngineError> {
        let checkpoint = CheckpointFile {
            format: CHECKPOINT_FORMAT.to_owned(),
            version: CHECKPOINT_VERSION,
            state: self.state.clone(),
        };
        let file = File::create(path).map_err(|error| EngineError::io(path, error))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, &checkpoint)
            .map_err(|error| checkpoint_error(path, error.to_string()))?;
        writer.flush().map_err(|error| EngineError::io(path, error))
    }

    fn timestep(&self) -> f64 {
        self.state.scene.timestep
    }
}

/// Steps between two recorded samples for each quality level.
fn sample_stride(quality: RecordingQuality) -> u64 {
    match quality {
        RecordingQuality::Low => 4,
        RecordingQuality::Medium => 2,
        RecordingQuality::High => 1,
    }
}

fn sample_block(block: &ParticleBlock) -> Vec<ParticleState> {
    let [nx, ny, nz] = block.lattice();
    let origin = block.center.add(block.size.scale(-0.5));
    let mut particles = Vec::with_capacity(nx * ny * nz);
    let mut id = 0u32;

    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let offset = Vec3::new(
                    (i as f64 + 0.5) * block.spacing,
                    (j as f64 + 0.5) * block.spacing,
                    (k as f64 + 0.5) * block.spacing,
                );
                particles.push(ParticleState::new(
                    EntityId::new(id),
                    origin.add(offset),
                    Vec3::ZERO,
                ));
                id += 1;
            }
        }
    }
    particles
}

fn reflect(position: &mut f64, velocity: &mut f64, lower: f64, upper: f64, restitution: f64) {
    if *position < lower {
        *position = lower;
        *velocity = -*velocity * restitution;
    } else if *position > upper {
        *position = upper;
        *velocity = -*velocity * restitution;
    }
}

fn speed(velocity: Vec3) -> f64 {
    (velocity.x * velocity.x + velocity.y * velocity.y + velocity.z * velocity.z).sqrt()
}

fn is_finite(value: Vec3) -> bool {
    value.x.is_finite() && value.y.is_finite() && value.z.is_finite()
}

fn checkpoint_error(path: &Path, reason: String) -> EngineError {
    EngineError::Checkpoint {
        path: path.to_path_buf(),
        reason,
    }
}
