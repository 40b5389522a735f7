//! ecosim-driver - Episode state machine for external-simulator co-simulation.
//!
//! This crate drives a step-by-step building-energy simulator through a
//! narrow, synchronous, byte-oriented co-simulation protocol. Each episode
//! it spawns the simulator as a subprocess in a fresh working directory,
//! waits for it to dial back to the driver's listening socket, and then
//! exchanges one action message per step until the simulator reports the
//! configured episode duration reached.
//!
//! The only two operations callers need are [`EpisodeDriver::reset`] and
//! [`EpisodeDriver::step`]. Everything protocol- and process-level lives
//! in `ecosim-core`.
//!
//! # Example
//!
//! ```rust,ignore
//! use ecosim_driver::{DriverConfig, EpisodeDriver, StaticRunPreparer};
//!
//! let config = DriverConfig::new("/usr/local/bin/energyplus");
//! let preparer = StaticRunPreparer::new(
//!     "building.idf", "weather.epw",
//!     31_536_000.0, // one simulated year
//!     4,            // steps per hour
//! );
//! let mut driver = EpisodeDriver::new(config, preparer).await?;
//!
//! let first = driver.reset().await?;
//! while let Some(outcome) = driver.step(&[21.0, 25.0]).await? {
//!     if outcome.terminal {
//!         break;
//!     }
//! }
//! ```

pub mod config;
pub mod driver;
pub mod error;
pub mod prepare;
pub mod rundir;

pub use config::{ConfigError, DriverConfig};
pub use driver::{EpisodeDriver, StepOutcome};
pub use error::DriverError;
pub use prepare::{RunPlan, RunPreparer, SetupError, StaticRunPreparer};
pub use rundir::EpisodeWorkspace;
