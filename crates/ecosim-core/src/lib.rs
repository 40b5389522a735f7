//! ecosim-core - Leaf components of the co-simulation driver.
//!
//! This crate holds the pieces of the driver that do not know anything
//! about episodes:
//!
//! - [`codec`]: the line-oriented ASCII wire format spoken by the external
//!   simulator.
//! - [`process`]: subprocess lifecycle — process-group spawning, output
//!   draining into tracing, idempotent group termination.
//! - [`channel`]: the listening socket bound once per driver and the
//!   per-episode accepted connection with its strict request/response
//!   exchange.
//!
//! The episode state machine that orchestrates these lives in the
//! `ecosim-driver` crate.

pub mod channel;
pub mod codec;
pub mod process;

pub use channel::{ChannelConnection, ChannelError, CosimChannel};
pub use codec::{CodecError, WireMessage, FLAG_NORMAL, FLAG_TERMINATE};
pub use process::{spawn, ProcessError, ProcessHandle, ProcessSpec};
