#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Outcome-tagged checkpoint persistence.
//!
//! A run ends with exactly one checkpoint. The artifact path is chosen by the
//! [`CheckpointTag`], and the two tags never share a path, so a failing run
//! cannot overwrite the checkpoint of an earlier successful one.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use simtrace_core::{CheckpointTag, EngineAdapter, EngineError};
use thiserror::Error;
use tracing::info;

/// Default file name of the checkpoint written after a completed run.
pub const DEFAULT_FINAL_NAME: &str = "final_state.ckpt";
/// Default file name of the checkpoint written after a failed run.
pub const DEFAULT_PARTIAL_NAME: &str = "partial_state.ckpt";

/// File names used for each checkpoint outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointNames {
    /// File written when the run completes every step.
    pub final_name: String,
    /// File written when the run fails.
    pub partial_name: String,
}

impl Default for CheckpointNames {
    fn default() -> Self {
        Self {
            final_name: DEFAULT_FINAL_NAME.to_owned(),
            partial_name: DEFAULT_PARTIAL_NAME.to_owned(),
        }
    }
}

/// Failures raised while persisting a checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Both outcomes were configured to write the same file.
    #[error("final and partial checkpoints must use different names (both '{0}')")]
    IdenticalNames(String),
    /// A checkpoint name was empty.
    #[error("checkpoint names must not be empty")]
    EmptyName,
    /// The checkpoint directory could not be created.
    #[error("checkpoint directory '{}' could not be created: {source}", path.display())]
    Directory {
        /// Directory that was being created.
        path: PathBuf,
        /// Underlying operating system error.
        #[source]
        source: io::Error,
    },
    /// The engine failed to serialize its state.
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Writes full engine state to outcome-specific artifacts.
#[derive(Debug)]
pub struct CheckpointManager {
    directory: PathBuf,
    names: CheckpointNames,
}

impl CheckpointManager {
    /// Creates a manager writing into `directory` using `names`.
    pub fn new(
        directory: impl Into<PathBuf>,
        names: CheckpointNames,
    ) -> Result<Self, CheckpointError> {
        if names.final_name.trim().is_empty() || names.partial_name.trim().is_empty() {
            return Err(CheckpointError::EmptyName);
        }
        if names.final_name == names.partial_name {
            return Err(CheckpointError::IdenticalNames(names.final_name));
        }

        Ok(Self {
            directory: directory.into(),
            names,
        })
    }

    /// Location of the artifact written for `tag`.
    #[must_use]
    pub fn path_for(&self, tag: CheckpointTag) -> PathBuf {
        let name = match tag {
            CheckpointTag::Final => &self.names.final_name,
            CheckpointTag::Partial => &self.names.partial_name,
        };
        self.directory.join(name)
    }

    /// Serializes engine state synchronously and returns the artifact path.
    ///
    /// There is no retry: the artifact either exists afterwards or the error
    /// is returned to the caller.
    pub fn save<E>(&self, engine: &mut E, tag: CheckpointTag) -> Result<PathBuf, CheckpointError>
    where
        E: EngineAdapter + ?Sized,
    {
        ensure_directory(&self.directory)?;
        let path = self.path_for(tag);
        engine.save_checkpoint(&path)?;
        info!(%tag, path = %path.display(), "checkpoint saved");
        Ok(path)
    }
}

fn ensure_directory(path: &Path) -> Result<(), CheckpointError> {
    fs::create_dir_all(path).map_err(|source| CheckpointError::Directory {
        path: path.to_path_buf(),
        source,
    })
}
