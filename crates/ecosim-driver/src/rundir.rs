//! Episode working directories and the simulator's socket config file.
//!
//! Every episode runs in its own directory under the experiment root,
//! named `<env_name>-res<episode>`, with an `output/` subdirectory for
//! the simulator's result files. The driver writes a small `socket.cfg`
//! into the directory before spawning; the simulator reads it to learn
//! which host/port to dial back to.
//!
//! Old episode directories are pruned at episode end so a long training
//! loop does not fill the disk.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::prepare::SetupError;

/// Name of the simulator-facing socket config file.
pub const SOCKET_CFG_FILE: &str = "socket.cfg";

/// Name of the per-episode output subdirectory.
pub const OUTPUT_SUBDIR: &str = "output";

/// Manages per-episode working directories under one experiment root.
#[derive(Debug)]
pub struct EpisodeWorkspace {
    root: PathBuf,
    env_name: String,
}

impl EpisodeWorkspace {
    /// Creates a workspace rooted at `root`, creating the root directory
    /// if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Io`] if the root cannot be created.
    pub fn new(root: impl Into<PathBuf>, env_name: impl Into<String>) -> Result<Self, SetupError> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            env_name: env_name.into(),
        })
    }

    /// Creates the working directory for one episode, with its `output/`
    /// subdirectory.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Io`] if directory creation fails; this is a
    /// fatal setup error for the episode.
    pub fn create(&self, episode: u32) -> Result<PathBuf, SetupError> {
        let dir = self.episode_dir(episode);
        std::fs::create_dir_all(dir.join(OUTPUT_SUBDIR))?;
        debug!(episode, dir = %dir.display(), "episode working directory created");
        Ok(dir)
    }

    /// The path an episode's working directory lives at.
    #[must_use]
    pub fn episode_dir(&self, episode: u32) -> PathBuf {
        self.root.join(format!("{}-res{episode}", self.env_name))
    }

    /// Writes the socket config file the simulator dials back with.
    ///
    /// The format is the fixed minimal one the simulator's co-simulation
    /// layer expects: a client element wrapping an IPC socket element with
    /// `port` and `hostname` attributes.
    ///
    /// # Errors
    ///
    /// Returns [`SetupError::Io`] if the file cannot be written.
    pub fn write_socket_cfg(&self, dir: &Path, host: &str, port: u16) -> Result<(), SetupError> {
        let content = format!(
            "<BCVTB-client><ipc><socket port=\"{port}\" hostname=\"{host}\" /></ipc></BCVTB-client>",
        );
        std::fs::write(dir.join(SOCKET_CFG_FILE), content)?;
        Ok(())
    }

    /// Removes the oldest episode directories beyond `keep`.
    ///
    /// Best-effort: removal failures are logged and skipped, never
    /// surfaced — pruning runs inside teardown.
    pub fn prune(&self, keep: usize) {
        let mut episodes = self.list_episode_dirs();
        if episodes.len() <= keep {
            return;
        }
        episodes.sort_unstable_by_key(|(index, _)| *index);
        let excess = episodes.len() - keep;
        for (index, path) in episodes.into_iter().take(excess) {
            match std::fs::remove_dir_all(&path) {
                Ok(()) => debug!(episode = index, dir = %path.display(), "pruned episode directory"),
                Err(err) => warn!(episode = index, dir = %path.display(), %err, "failed to prune episode directory"),
            }
        }
    }

    fn list_episode_dirs(&self) -> Vec<(u32, PathBuf)> {
        let prefix = format!("{}-res", self.env_name);
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let name = entry.file_name().into_string().ok()?;
                let index: u32 = name.strip_prefix(&prefix)?.parse().ok()?;
                entry.path().is_dir().then(|| (index, entry.path()))
            })
            .collect()
    }
}
