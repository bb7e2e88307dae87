//! Named run profiles.

use std::fmt;

use clap::ValueEnum;
use serde::Deserialize;
use simtrace_core::RecordingQuality;
use simtrace_driver::RunLength;
use simtrace_engine_ballistic::SceneConfig;

/// Named combination of a scene and run parameters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum Preset {
    /// Ten simulated seconds of a small block; no frames and no recording.
    #[default]
    CpuPreview,
    /// One simulated hour over a wide basin.
    GpuHour,
    /// Two simulated hours in a deep reservoir.
    GpuLong,
}

/// Run parameters a preset supplies before file and flag overrides.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct PresetDefaults {
    pub(crate) scene: SceneConfig,
    pub(crate) run_length: RunLength,
    pub(crate) output_interval: u64,
    pub(crate) frame_interval: Option<u64>,
    pub(crate) buffer_capacity: usize,
    pub(crate) quality: Option<RecordingQuality>,
}

impl Preset {
    pub(crate) const ALL: [Self; 3] = [Self::CpuPreview, Self::GpuHour, Self::GpuLong];

    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::CpuPreview => "cpu-preview",
            Self::GpuHour => "gpu-hour",
            Self::GpuLong => "gpu-long",
        }
    }

    pub(crate) fn defaults(self) -> PresetDefaults {
        match self {
            Self::CpuPreview => PresetDefaults {
                scene: SceneConfig::cpu_preview(),
                run_length: RunLength::SimulatedSeconds(10.0),
                output_interval: 250,
                frame_interval: None,
                buffer_capacity: 500,
                quality: None,
            },
            Self::GpuHour => PresetDefaults {
                scene: SceneConfig::gpu_basin(),
                run_length: RunLength::SimulatedSeconds(3_600.0),
                output_interval: 1_000,
                frame_interval: Some(500),
                buffer_capacity: 500,
                quality: Some(RecordingQuality::Medium),
            },
            Self::GpuLong => PresetDefaults {
                scene: SceneConfig::gpu_reservoir(),
                run_length: RunLength::SimulatedSeconds(7_200.0),
                output_interval: 3_000,
                frame_interval: Some(1_500),
                buffer_capacity: 500,
                quality: Some(RecordingQuality::Medium),
            },
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One line per preset, as printed by `simtrace presets`.
pub(crate) fn describe(preset: Preset) -> String {
    let defaults = preset.defaults();
    let length = match defaults.run_length {
        RunLength::Steps(steps) => format!("{steps} steps"),
        RunLength::SimulatedSeconds(seconds) => format!("{seconds} s"),
    };
    let frames = defaults
        .frame_interval
        .map_or_else(|| "off".to_owned(), |interval| format!("every {interval}"));
    let recording = defaults
        .quality
        .map_or_else(|| "off".to_owned(), |quality| quality.to_string());
    format!(
        "{:<12} {length:>9}  dt {}  particles {:>6}  output every {}  frames {frames}  recording {recording}",
        preset.name(),
        defaults.scene.timestep,
        defaults.scene.block.particle_count().unwrap_or_default(),
        defaults.output_interval,
    )
}
