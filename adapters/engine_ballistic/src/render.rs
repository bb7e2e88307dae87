//! Top-down rasterization of particle positions.

use image::{ImageError, ImageFormat, Rgb, RgbImage};
use simtrace_core::{EngineError, ParticleState};
use std::path::Path;

use crate::SceneConfig;

const BACKGROUND: Rgb<u8> = Rgb([0x10, 0x14, 0x1c]);
const SHALLOW: [f64; 3] = [0x66 as f64, 0xcc as f64, 0xff as f64];
const DEEP: [f64; 3] = [0x12 as f64, 0x3a as f64, 0x8c as f64];

/// Projects particles onto the xy plane of the domain, shading by height.
pub(crate) fn rasterize(scene: &SceneConfig, particles: &[ParticleState]) -> RgbImage {
    let mut frame = RgbImage::from_pixel(scene.frame_width, scene.frame_height, BACKGROUND);
    let span_x = scene.upper.x - scene.lower.x;
    let span_y = scene.upper.y - scene.lower.y;
    let span_z = scene.upper.z - scene.lower.z;

    for particle in particles {
        let u = (particle.position.x - scene.lower.x) / span_x;
        let v = (particle.position.y - scene.lower.y) / span_y;
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            continue;
        }

        let column = pixel(u, scene.frame_width);
        // Image rows grow downwards; world y grows upwards.
        let row = pixel(1.0 - v, scene.frame_height);
        let height = ((particle.position.z - scene.lower.z) / span_z).clamp(0.0, 1.0);
        frame.put_pixel(column, row, shade(height));
    }
    frame
}

/// Writes a rasterized frame to `path` as PNG.
pub(crate) fn write_png(frame: &RgbImage, path: &Path) -> Result<(), EngineError> {
    frame
        .save_with_format(path, ImageFormat::Png)
        .map_err(|error| match error {
            ImageError::IoError(source) => EngineError::io(path, source),
            other => EngineError::Render {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        })
}

fn pixel(fraction: f64, extent: u32) -> u32 {
    let scaled = (fraction * f64::from(extent)).floor() as u32;
    scaled.min(extent - 1)
}

fn shade(height: f64) -> Rgb<u8> {
    let mix = |channel: usize| (DEEP[channel] + (SHALLOW[channel] - DEEP[channel]) * height) as u8;
    Rgb([mix(0), mix(1), mix(2)])
}
