//! Per-episode run preparation.
//!
//! Parsing building models and weather files is someone else's job; the
//! driver only needs a ready-to-run model path, a weather path, and the
//! run's timing before it can spawn the simulator. [`RunPreparer`] is that
//! collaborator seam. [`StaticRunPreparer`] is the shipped implementation:
//! it copies fixed input files into each episode's working directory so
//! the simulator never touches the originals.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Errors while preparing an episode's working directory or input files.
#[derive(Debug, Error)]
pub enum SetupError {
    /// Filesystem operation failed.
    #[error("setup I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The preparer produced or was given unusable inputs.
    #[error("invalid run inputs: {0}")]
    Invalid(String),
}

/// Everything `reset` needs to know before spawning the simulator.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Ready-to-run building-model file.
    pub model_path: PathBuf,
    /// Weather file for this episode (possibly perturbed upstream).
    pub weather_path: PathBuf,
    /// Configured total episode duration in simulated seconds.
    pub episode_length_secs: f64,
    /// Simulator steps per simulated hour.
    pub steps_per_hour: u32,
}

impl RunPlan {
    /// Length of one simulator step in simulated seconds.
    #[must_use]
    pub fn step_size_secs(&self) -> f64 {
        3600.0 / f64::from(self.steps_per_hour.max(1))
    }
}

/// Collaborator that makes an episode's input files ready to run.
///
/// Called by `reset` with the episode index and the freshly created
/// working directory, before the simulator is spawned.
pub trait RunPreparer: Send {
    /// Prepares model and weather inputs for one episode.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError`] if the inputs cannot be made ready; this is
    /// fatal for the `reset` call, with no retry.
    fn prepare(&mut self, episode: u32, workdir: &Path) -> Result<RunPlan, SetupError>;
}

/// Preparer that copies a fixed model and weather file into each episode
/// directory.
#[derive(Debug, Clone)]
pub struct StaticRunPreparer {
    /// Source building-model file.
    pub model_path: PathBuf,
    /// Source weather file.
    pub weather_path: PathBuf,
    /// Episode duration in simulated seconds.
    pub episode_length_secs: f64,
    /// Simulator steps per simulated hour.
    pub steps_per_hour: u32,
}

impl StaticRunPreparer {
    /// Creates a preparer for fixed input files.
    #[must_use]
    pub fn new(
        model_path: impl Into<PathBuf>,
        weather_path: impl Into<PathBuf>,
        episode_length_secs: f64,
        steps_per_hour: u32,
    ) -> Self {
        Self {
            model_path: model_path.into(),
            weather_path: weather_path.into(),
            episode_length_secs,
            steps_per_hour,
        }
    }
}

impl RunPreparer for StaticRunPreparer {
    fn prepare(&mut self, episode: u32, workdir: &Path) -> Result<RunPlan, SetupError> {
        let model_name = self
            .model_path
            .file_name()
            .ok_or_else(|| SetupError::Invalid(format!("model path {:?} has no file name", self.model_path)))?;
        let weather_name = self
            .weather_path
            .file_name()
            .ok_or_else(|| SetupError::Invalid(format!("weather path {:?} has no file name", self.weather_path)))?;

        let model_copy = workdir.join(model_name);
        let weather_copy = workdir.join(weather_name);
        std::fs::copy(&self.model_path, &model_copy)?;
        std::fs::copy(&self.weather_path, &weather_copy)?;
        debug!(episode, workdir = %workdir.display(), "episode inputs staged");

        Ok(RunPlan {
            model_path: model_copy,
            weather_path: weather_copy,
            episode_length_secs: self.episode_length_secs,
            steps_per_hour: self.steps_per_hour,
        })
    }
}
