//! Layering of preset, run file and command-line values into one run.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::Args;
use serde::Deserialize;
use simtrace_core::RecordingQuality;
use simtrace_driver::{RunConfig, RunLength};
use simtrace_engine_ballistic::SceneConfig;

use crate::preset::Preset;

/// Directory that receives run artifacts when nothing else is configured.
const DEFAULT_RESULTS_ROOT: &str = "results";

/// Flags accepted by `simtrace run`.
#[derive(Args, Clone, Debug, Default, PartialEq)]
pub(crate) struct RunArgs {
    /// Named profile supplying the scene and default cadences.
    #[arg(long, value_enum)]
    pub(crate) preset: Option<Preset>,
    /// TOML file whose values override the preset.
    #[arg(long, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,
    /// Number of steps to advance.
    #[arg(long, conflicts_with = "duration_secs")]
    pub(crate) steps: Option<u64>,
    /// Simulated seconds to run, converted with the engine timestep.
    #[arg(long)]
    pub(crate) duration_secs: Option<f64>,
    /// Steps between two exported snapshots.
    #[arg(long)]
    pub(crate) output_interval: Option<u64>,
    /// Steps between two rendered frames.
    #[arg(long, conflicts_with = "no_frames")]
    pub(crate) frame_interval: Option<u64>,
    /// Render no frames.
    #[arg(long)]
    pub(crate) no_frames: bool,
    /// Records buffered before the log is written.
    #[arg(long)]
    pub(crate) buffer_capacity: Option<usize>,
    /// Directory receiving every artifact.
    #[arg(long, value_name = "DIR")]
    pub(crate) results_dir: Option<PathBuf>,
    /// Recording quality: low, medium or high.
    #[arg(long, conflicts_with = "no_recording")]
    pub(crate) quality: Option<RecordingQuality>,
    /// Skip the recording stream.
    #[arg(long)]
    pub(crate) no_recording: bool,
    /// Resume from an engine checkpoint instead of building the preset scene.
    #[arg(long, value_name = "CKPT")]
    pub(crate) restore: Option<PathBuf>,
    /// Make the engine fail when it computes this step of the run.
    #[arg(long, value_name = "STEP")]
    pub(crate) fail_at_step: Option<u64>,
}

/// Contents of a TOML run file. Every key is optional.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub(crate) struct RunFile {
    pub(crate) preset: Option<Preset>,
    pub(crate) steps: Option<u64>,
    pub(crate) duration_secs: Option<f64>,
    pub(crate) output_interval: Option<u64>,
    pub(crate) frame_interval: Option<u64>,
    pub(crate) frames: Option<bool>,
    pub(crate) buffer_capacity: Option<usize>,
    pub(crate) results_dir: Option<PathBuf>,
    pub(crate) quality: Option<RecordingQuality>,
    pub(crate) recording: Option<bool>,
    pub(crate) restore: Option<PathBuf>,
    pub(crate) fail_at_step: Option<u64>,
}

impl RunFile {
    /// Reads and parses a run file.
    pub(crate) fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read run file {}", path.display()))?;
        Self::parse(&contents).with_context(|| format!("invalid run file {}", path.display()))
    }

    fn parse(contents: &str) -> Result<Self> {
        let file: Self = toml::from_str(contents).context("failed to parse run file toml")?;
        if file.steps.is_some() && file.duration_secs.is_some() {
            bail!("run file sets both steps and duration-secs");
        }
        Ok(file)
    }
}

/// Everything needed to build the engine and the driver.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RunSettings {
    pub(crate) preset: Preset,
    pub(crate) scene: SceneConfig,
    pub(crate) restore: Option<PathBuf>,
    pub(crate) fail_at_step: Option<u64>,
    pub(crate) config: RunConfig,
}

impl RunSettings {
    /// Resolves the run from the preset, then the run file, then the flags.
    pub(crate) fn resolve(args: &RunArgs, file: &RunFile) -> Self {
        let preset = args.preset.or(file.preset).unwrap_or_default();
        let defaults = preset.defaults();

        let run_length = match (args.steps, args.duration_secs) {
            (Some(steps), _) => RunLength::Steps(steps),
            (None, Some(seconds)) => RunLength::SimulatedSeconds(seconds),
            (None, None) => match (file.steps, file.duration_secs) {
                (Some(steps), _) => RunLength::Steps(steps),
                (None, Some(seconds)) => RunLength::SimulatedSeconds(seconds),
                (None, None) => defaults.run_length,
            },
        };

        let results_dir = args
            .results_dir
            .clone()
            .or_else(|| file.results_dir.clone())
            .unwrap_or_else(|| Path::new(DEFAULT_RESULTS_ROOT).join(preset.name()));

        let mut quality = defaults.quality;
        if file.recording == Some(false) {
            quality = None;
        } else if let Some(requested) = file.quality {
            quality = Some(requested);
        }
        if args.no_recording {
            quality = None;
        } else if let Some(requested) = args.quality {
            quality = Some(requested);
        }

        let mut config = RunConfig::new(results_dir, run_length);
        config.output_interval = args
            .output_interval
            .or(file.output_interval)
            .unwrap_or(defaults.output_interval);
        config.frame_interval = if args.no_frames {
            None
        } else if args.frame_interval.is_some() {
            args.frame_interval
        } else if file.frames == Some(false) {
            None
        } else {
            file.frame_interval.or(defaults.frame_interval)
        };
        config.buffer_capacity = args
            .buffer_capacity
            .or(file.buffer_capacity)
            .unwrap_or(defaults.buffer_capacity);
        config.recording_quality = quality;

        Self {
            preset,
            scene: defaults.scene,
            restore: args.restore.clone().or_else(|| file.restore.clone()),
            fail_at_step: args.fail_at_step.or(file.fail_at_step),
            config,
        }
    }
}
