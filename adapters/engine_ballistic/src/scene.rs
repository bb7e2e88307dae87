//! Scene description for the ballistic reference engine.

use serde::{Deserialize, Serialize};
use simtrace_core::Vec3;
use thiserror::Error;

/// Upper bound on the number of particles a scene may sample.
pub const MAX_PARTICLES: usize = 1_000_000;

/// Axis-aligned block of particles sampled on a regular lattice.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParticleBlock {
    /// Center of the block in world units.
    pub center: Vec3,
    /// Edge lengths of the block.
    pub size: Vec3,
    /// Lattice spacing between neighbouring particles.
    pub spacing: f64,
}

impl ParticleBlock {
    /// Number of lattice points along each axis.
    #[must_use]
    pub fn lattice(&self) -> [usize; 3] {
        [self.size.x, self.size.y, self.size.z].map(|edge| {
            let count = (edge / self.spacing).floor();
            if count >= 1.0 {
                count as usize
            } else {
                1
            }
        })
    }

    /// Total number of particles the block samples, or `None` if it overflows `usize`.
    #[must_use]
    pub fn particle_count(&self) -> Option<usize> {
        self.lattice()
            .iter()
            .try_fold(1usize, |count, &axis| count.checked_mul(axis))
    }
}

/// Everything the reference engine needs to build a scene.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SceneConfig {
    /// Simulated seconds per step.
    pub timestep: f64,
    /// Integration substeps per step.
    pub substeps: u32,
    /// Constant acceleration applied to every particle.
    pub gravity: Vec3,
    /// Lower corner of the simulation domain.
    pub lower: Vec3,
    /// Upper corner of the simulation domain.
    pub upper: Vec3,
    /// Fraction of normal velocity kept after hitting a domain wall.
    pub restitution: f64,
    /// Initial particle block.
    pub block: ParticleBlock,
    /// Width of rendered frames in pixels.
    pub frame_width: u32,
    /// Height of rendered frames in pixels.
    pub frame_height: u32,
}

impl SceneConfig {
    /// Small block on a shallow domain; the quick CPU preview run.
    #[must_use]
    pub fn cpu_preview() -> Self {
        Self {
            timestep: 4e-3,
            substeps: 4,
            gravity: Vec3::new(0.0, 0.0, -9.81),
            lower: Vec3::new(0.0, -25.0, -25.0),
            upper: Vec3::new(10.0, 10.0, 0.5),
            restitution: 0.3,
            block: ParticleBlock {
                center: Vec3::new(1.0, 5.0, 0.3),
                size: Vec3::new(0.2, 0.2, 0.2),
                spacing: 0.1,
            },
            frame_width: 320,
            frame_height: 240,
        }
    }

    /// Medium block over a wide basin; the hour-long GPU run.
    #[must_use]
    pub fn gpu_basin() -> Self {
        Self {
            timestep: 2e-3,
            substeps: 10,
            gravity: Vec3::new(0.0, 0.0, -9.81),
            lower: Vec3::new(0.0, -50.0, -50.0),
            upper: Vec3::new(20.0, 20.0, 2.0),
            restitution: 0.3,
            block: ParticleBlock {
                center: Vec3::new(2.0, 8.0, 1.0),
                size: Vec3::new(5.0, 5.0, 2.0),
                spacing: 0.25,
            },
            frame_width: 640,
            frame_height: 480,
        }
    }

    /// Large block in a deep domain; the two-hour GPU run.
    #[must_use]
    pub fn gpu_reservoir() -> Self {
        Self {
            timestep: 1.5e-3,
            substeps: 10,
            gravity: Vec3::new(0.0, 0.0, -9.81),
            lower: Vec3::new(-30.0, -50.0, -30.0),
            upper: Vec3::new(100.0, 50.0, 30.0),
            restitution: 0.3,
            block: ParticleBlock {
                center: Vec3::new(30.0, 0.0, 8.0),
                size: Vec3::new(15.0, 15.0, 6.0),
                spacing: 0.5,
            },
            frame_width: 1280,
            frame_height: 720,
        }
    }

    /// Rejects scenes the engine cannot integrate or render.
    pub fn validate(&self) -> Result<(), SceneError> {
        if !(self.timestep.is_finite() && self.timestep > 0.0) {
            return Err(SceneError::InvalidTimestep(self.timestep));
        }
        if self.substeps == 0 {
            return Err(SceneError::ZeroSubsteps);
        }
        let extents = [
            (self.lower.x, self.upper.x),
            (self.lower.y, self.upper.y),
            (self.lower.z, self.upper.z),
        ];
        if extents.iter().any(|(lower, upper)| !(lower < upper)) {
            return Err(SceneError::EmptyDomain);
        }
        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(SceneError::InvalidRestitution(self.restitution));
        }
        if !(self.block.spacing.is_finite() && self.block.spacing > 0.0) {
            return Err(SceneError::InvalidSpacing(self.block.spacing));
        }
        match self.block.particle_count() {
            Some(count) if count <= MAX_PARTICLES => {}
            Some(count) => return Err(SceneError::TooManyParticles(Some(count))),
            None => return Err(SceneError::TooManyParticles(None)),
        }
        if self.frame_width == 0 || self.frame_height == 0 {
            return Err(SceneError::EmptyFrame);
        }
        Ok(())
    }
}

/// Reasons a scene is rejected.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SceneError {
    /// Timestep was not a positive number of seconds.
    #[error("timestep must be positive (got {0})")]
    InvalidTimestep(f64),
    /// Integration would never move a particle.
    #[error("substeps must be positive")]
    ZeroSubsteps,
    /// A lower bound was not strictly below its upper bound.
    #[error("domain lower bound must be below its upper bound on every axis")]
    EmptyDomain,
    /// Restitution was outside `0.0..=1.0`.
    #[error("restitution must lie in 0..=1 (got {0})")]
    InvalidRestitution(f64),
    /// Lattice spacing was not positive.
    #[error("particle spacing must be positive (got {0})")]
    InvalidSpacing(f64),
    /// The block would sample more than [`MAX_PARTICLES`] particles.
    ///
    /// Carries the count, or `None` when it does not fit in `usize`.
    #[error("block samples {} particles, more than the supported maximum", count_label(.0))]
    TooManyParticles(Option<usize>),
    /// Frames would have no pixels.
    #[error("frame dimensions must be positive")]
    EmptyFrame,
}

fn count_label(count: &Option<usize>) -> String {
    count.map_or_else(|| "too many".to_owned(), |count| count.to_string())
}
