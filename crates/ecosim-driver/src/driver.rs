//! Episode state machine.
//!
//! [`EpisodeDriver`] orchestrates the codec, process supervisor, and
//! channel across the lifecycle
//!
//! ```text
//! Idle ──reset──► Starting ──handshake──► Active ──duration──► Terminal ──teardown──► Idle
//! ```
//!
//! `Starting` and `Terminal` are transient: both are entered and left
//! inside a single `reset`/`step` call, so callers only ever observe
//! `Idle` or `Active`. At any instant at most one episode is live; a new
//! `reset` fully retires the previous one (subprocess signalled,
//! connection closed) before creating the next.
//!
//! # Teardown
//!
//! Ending an episode is best-effort and never surfaces an error of its
//! own: it sends the terminate message with the last applied action, reads
//! the simulator's acknowledgement, sends the same terminate message a
//! second time (the simulator's shutdown sequence stalls without the
//! re-send; see DESIGN.md), closes the connection, pauses so the simulator
//! can flush its output files, and finally signals the process group.
//! Failures along the way are logged and swallowed.

use ecosim_core::channel::{ChannelConnection, CosimChannel};
use ecosim_core::codec::WireMessage;
use ecosim_core::process::{self, ProcessHandle, ProcessSpec};
use tracing::{debug, info, instrument, warn};

use crate::config::DriverConfig;
use crate::error::DriverError;
use crate::prepare::RunPreparer;
use crate::rundir::{EpisodeWorkspace, OUTPUT_SUBDIR};

/// Result of a `reset` or a successful `step`.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    /// Simulated seconds since episode start, from the simulator's reply.
    pub elapsed_secs: f64,
    /// Sensor/observation values carried by the reply.
    pub observations: Vec<f64>,
    /// Whether the episode has reached its configured duration.
    pub terminal: bool,
}

/// One live episode: the accepted connection, the subprocess, and the
/// protocol state captured from the handshake.
#[derive(Debug)]
struct Episode {
    index: u32,
    conn: ChannelConnection,
    process: ProcessHandle,
    /// Wire-format version echoed into every outbound message.
    header_version: i32,
    /// Simulated-time cursor; non-decreasing within the episode.
    elapsed_secs: f64,
    episode_length_secs: f64,
    last_action: Vec<f64>,
}

/// Co-simulation driver: owns the listening socket, the current episode,
/// and the monotonic episode counter.
///
/// `reset` and `step` are the only operations external callers need. The
/// driver holds no global state, so independent instances can coexist in
/// one process.
#[derive(Debug)]
pub struct EpisodeDriver<P> {
    config: DriverConfig,
    channel: CosimChannel,
    workspace: EpisodeWorkspace,
    preparer: P,
    episode: Option<Episode>,
    next_episode: u32,
}

impl<P: RunPreparer> EpisodeDriver<P> {
    /// Creates a driver, binding its listening socket.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Config`] on invalid configuration,
    /// [`DriverError::Setup`] if the experiment root cannot be created,
    /// or [`DriverError::Io`] if the socket bind fails.
    pub async fn new(config: DriverConfig, preparer: P) -> Result<Self, DriverError> {
        config.validate()?;
        let channel = CosimChannel::bind().await?;
        let workspace =
            EpisodeWorkspace::new(config.experiment_root.clone(), config.env_name.clone())?;
        info!(
            env = %config.env_name,
            host = %channel.host(),
            port = channel.port(),
            "co-simulation driver ready"
        );
        Ok(Self {
            config,
            channel,
            workspace,
            preparer,
            episode: None,
            next_episode: 0,
        })
    }

    /// The host the simulator must dial back to.
    #[must_use]
    pub fn host(&self) -> String {
        self.channel.host()
    }

    /// The port the simulator must dial back to.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.channel.port()
    }

    /// Whether an episode is currently active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.episode.is_some()
    }

    /// Index of the active episode, if any.
    #[must_use]
    pub fn episode_index(&self) -> Option<u32> {
        self.episode.as_ref().map(|episode| episode.index)
    }

    /// Simulated-time cursor of the active episode, if any.
    #[must_use]
    pub fn elapsed_secs(&self) -> Option<f64> {
        self.episode.as_ref().map(|episode| episode.elapsed_secs)
    }

    /// Non-blocking liveness probe for the active episode's subprocess.
    #[must_use]
    pub fn simulator_running(&mut self) -> bool {
        self.episode
            .as_mut()
            .is_some_and(|episode| episode.process.is_running())
    }

    /// Starts a fresh episode.
    ///
    /// Retires any prior episode, prepares the working directory and input
    /// files, spawns the simulator, waits for it to dial back, and reads
    /// the handshake. Returns the handshake's time cursor and observation
    /// values; if the handshake already reports the configured duration
    /// reached, the outcome is terminal and the episode is torn down
    /// before returning.
    ///
    /// # Errors
    ///
    /// Setup, spawn, connect, and handshake failures propagate after
    /// best-effort cleanup of whatever was partially created.
    #[instrument(skip_all)]
    pub async fn reset(&mut self) -> Result<StepOutcome, DriverError> {
        if let Some(episode) = self.episode.take() {
            self.end_episode(episode).await;
        }

        let index = self.next_episode;
        info!(episode = index, "starting episode");

        let workdir = self.workspace.create(index)?;
        let plan = self.preparer.prepare(index, &workdir)?;
        self.workspace
            .write_socket_cfg(&workdir, &self.channel.host(), self.channel.port())?;

        let spec = ProcessSpec::builder()
            .name(format!("{}-{index}", self.config.env_name))
            .program(&self.config.program)
            .arg("-w")
            .arg(plan.weather_path.display().to_string())
            .arg("-d")
            .arg(workdir.join(OUTPUT_SUBDIR).display().to_string())
            .arg(plan.model_path.display().to_string())
            .cwd(&workdir)
            .build();
        let mut process = process::spawn(&spec)?;

        let mut conn = match self
            .channel
            .accept_episode(self.config.connect_timeout())
            .await
        {
            Ok(conn) => conn,
            Err(err) => {
                warn!(episode = index, %err, "simulator never connected");
                process.terminate();
                return Err(err.into());
            }
        };
        conn.set_exchange_timeout(self.config.exchange_timeout());

        // The simulator speaks first: one unprompted message carrying the
        // wire-format header and the initial observation.
        let handshake = match conn.receive().await {
            Ok(message) => message,
            Err(err) => {
                warn!(episode = index, %err, "handshake failed");
                conn.close().await;
                process.terminate();
                return Err(err.into());
            }
        };
        debug!(
            episode = index,
            version = handshake.version,
            elapsed = handshake.elapsed_secs,
            observations = handshake.values.len(),
            "handshake received"
        );

        let terminal = handshake.elapsed_secs >= plan.episode_length_secs;
        let episode = Episode {
            index,
            conn,
            process,
            header_version: handshake.version,
            elapsed_secs: handshake.elapsed_secs,
            episode_length_secs: plan.episode_length_secs,
            last_action: self.config.initial_action.clone(),
        };

        if terminal {
            // Degenerate run: already over at handshake time.
            self.end_episode(episode).await;
        } else {
            self.episode = Some(episode);
        }

        Ok(StepOutcome {
            elapsed_secs: handshake.elapsed_secs,
            observations: handshake.values,
            terminal,
        })
    }

    /// Applies one action to the active episode.
    ///
    /// Returns `Ok(None)` — the no-op sentinel — when no episode is
    /// active; nothing is sent in that case. Otherwise the action is sent
    /// up to `action_repeat` times, the time cursor advances to each
    /// reply's elapsed time, and the repeat loop stops early the moment
    /// the simulator reports the episode duration reached. On terminal
    /// the episode is torn down before returning, so the caller's next
    /// `reset` starts clean.
    ///
    /// # Errors
    ///
    /// Exchange failures propagate after a best-effort teardown of the
    /// episode (the teardown's own errors are logged and swallowed).
    #[instrument(skip_all)]
    pub async fn step(&mut self, action: &[f64]) -> Result<Option<StepOutcome>, DriverError> {
        let Some(mut episode) = self.episode.take() else {
            debug!("step on an inactive driver; returning no-op");
            return Ok(None);
        };

        let mut terminal = false;
        let mut elapsed = episode.elapsed_secs;
        let mut observations = Vec::new();
        let mut repeats = 0;

        while repeats < self.config.action_repeat && !terminal {
            let outbound =
                WireMessage::step(episode.header_version, action.to_vec(), elapsed);
            let reply = match episode.conn.exchange(&outbound).await {
                Ok(reply) => reply,
                Err(err) => {
                    warn!(episode = episode.index, %err, "step exchange failed");
                    // Retire the episode so the next reset is not blocked
                    // by a half-open connection.
                    self.end_episode(episode).await;
                    return Err(err.into());
                }
            };
            elapsed = reply.elapsed_secs;
            observations = reply.values;
            terminal = elapsed >= episode.episode_length_secs;
            repeats += 1;
        }

        episode.elapsed_secs = elapsed;
        episode.last_action = action.to_vec();

        if terminal {
            info!(episode = episode.index, elapsed, "episode reached terminal time");
            self.end_episode(episode).await;
        } else {
            self.episode = Some(episode);
        }

        Ok(Some(StepOutcome {
            elapsed_secs: elapsed,
            observations,
            terminal,
        }))
    }

    /// Retires the driver, ending any live episode.
    ///
    /// The listening socket is released when the driver is dropped.
    pub async fn close(&mut self) {
        if let Some(episode) = self.episode.take() {
            self.end_episode(episode).await;
        }
    }

    /// Best-effort episode teardown; never fails.
    async fn end_episode(&mut self, mut episode: Episode) {
        debug!(episode = episode.index, "ending episode");

        let goodbye = WireMessage::terminate(
            episode.header_version,
            episode.last_action.clone(),
            episode.elapsed_secs,
        );
        match episode.conn.send(&goodbye).await {
            Ok(()) => match episode.conn.receive().await {
                Ok(ack) => {
                    debug!(episode = episode.index, flag = ack.flag, "terminate acknowledged");
                    // The simulator expects the terminate message again
                    // after its acknowledgement.
                    if let Err(err) = episode.conn.send(&goodbye).await {
                        warn!(episode = episode.index, %err, "terminate re-send failed");
                    }
                }
                Err(err) => {
                    warn!(episode = episode.index, %err, "no terminate acknowledgement");
                }
            },
            Err(err) => {
                warn!(episode = episode.index, %err, "terminate send failed");
            }
        }
        episode.conn.close().await;

        // Let the simulator finish writing its output files before the
        // group signal reaches it.
        tokio::time::sleep(self.config.flush_delay()).await;
        episode.process.terminate();

        self.workspace.prune(self.config.max_episode_dirs);
        self.next_episode = episode.index + 1;
        info!(episode = episode.index, "episode retired");
    }
}
