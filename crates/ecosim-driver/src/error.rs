//! Driver error types.
//!
//! Every failure `reset` or `step` can surface is one of the variants
//! here, so callers can branch on the failure mode. All of them are fatal
//! for the current episode; the expected recovery is a fresh `reset`.

use std::time::Duration;

use ecosim_core::channel::ChannelError;
use ecosim_core::codec::CodecError;
use ecosim_core::process::ProcessError;
use thiserror::Error;

use crate::config::ConfigError;
use crate::prepare::SetupError;

/// Errors surfaced by the episode driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Configuration was rejected at driver construction.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Working directory or input-file preparation failed.
    #[error("episode setup failed: {0}")]
    Setup(#[from] SetupError),

    /// The simulator subprocess failed to start.
    #[error(transparent)]
    Spawn(#[from] ProcessError),

    /// The spawned simulator never dialed back.
    ///
    /// The episode is considered never started.
    #[error("simulator did not connect within {timeout:?}")]
    ConnectionTimeout {
        /// The configured connect bound.
        timeout: Duration,
    },

    /// The simulator did not reply within the configured exchange bound.
    #[error("simulator did not reply within {timeout:?}")]
    ExchangeTimeout {
        /// The configured exchange bound.
        timeout: Duration,
    },

    /// A wire message failed to decode.
    #[error("wire protocol violation: {0}")]
    Protocol(#[from] CodecError),

    /// The simulator dropped the connection mid-exchange.
    #[error("connection closed by simulator")]
    ConnectionClosed,

    /// Socket-level I/O failure.
    #[error("channel I/O error: {0}")]
    Io(std::io::Error),
}

impl From<ChannelError> for DriverError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::AcceptTimeout { timeout } => Self::ConnectionTimeout { timeout },
            ChannelError::ExchangeTimeout { timeout } => Self::ExchangeTimeout { timeout },
            ChannelError::ConnectionClosed => Self::ConnectionClosed,
            ChannelError::Codec(codec) => Self::Protocol(codec),
            ChannelError::Io(io) => Self::Io(io),
        }
    }
}
