#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Fixed-cadence frame capture controller.

use std::path::{Path, PathBuf};

use simtrace_core::{EngineError, StepIndex};
use thiserror::Error;
use tracing::debug;

/// Number of digits the step index is zero-padded to inside frame file names.
pub const FRAME_INDEX_WIDTH: usize = 6;

/// Returns the deterministic file name used for the frame captured at `step`.
#[must_use]
pub fn frame_file_name(step: StepIndex) -> String {
    format!("frame_{:0width$}.png", step.get(), width = FRAME_INDEX_WIDTH)
}

/// Raised when the capture cadence is unusable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("frame interval must be positive")]
pub struct ZeroFrameInterval;

/// Decides on which steps a frame is exported and where it lands.
#[derive(Debug)]
pub struct FrameCapture {
    interval: u64,
    directory: PathBuf,
    captured: u64,
}

impl FrameCapture {
    /// Creates a controller exporting one frame every `interval` steps into `directory`.
    pub fn new(interval: u64, directory: impl Into<PathBuf>) -> Result<Self, ZeroFrameInterval> {
        if interval == 0 {
            return Err(ZeroFrameInterval);
        }

        Ok(Self {
            interval,
            directory: directory.into(),
            captured: 0,
        })
    }

    /// Delegates rendering to `render` when `step` falls on the capture cadence.
    ///
    /// Returns the path of the exported frame, or `None` when the step is
    /// skipped. Render failures are returned unchanged.
    pub fn maybe_capture<F>(
        &mut self,
        step: StepIndex,
        render: F,
    ) -> Result<Option<PathBuf>, EngineError>
    where
        F: FnOnce(&Path) -> Result<(), EngineError>,
    {
        if !step.is_multiple_of(self.interval) {
            return Ok(None);
        }

        let path = self.directory.join(frame_file_name(step));
        render(&path)?;
        self.captured += 1;
        debug!(%step, path = %path.display(), "captured frame");
        Ok(Some(path))
    }

    /// Number of frames exported so far.
    #[must_use]
    pub fn captured(&self) -> u64 {
        self.captured
    }

    /// Steps between two exported frames.
    #[must_use]
    pub fn interval(&self) -> u64 {
        self.interval
    }
}
