//! Co-simulation channel.
//!
//! The driver owns a listening TCP socket bound once at construction on an
//! ephemeral loopback port. The freshly spawned simulator reads the bound
//! host/port from a config file in its working directory and dials back;
//! each episode accepts exactly one inbound connection and exchanges codec
//! messages over it in strict request/response order.
//!
//! # Ordering
//!
//! There is no pipelining: every exchange is one encoded write followed by
//! one blocking line read. The reference protocol has no per-exchange
//! timeout (a hung peer blocks forever); an optional timeout can be set on
//! the connection as a deliberate deviation, disabled by default.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;
use tracing::{debug, trace};

use crate::codec::{CodecError, WireMessage};

/// Errors from the co-simulation channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No peer connected within the accept bound.
    #[error("simulator did not connect within {timeout:?}")]
    AcceptTimeout {
        /// The configured accept timeout.
        timeout: Duration,
    },

    /// The peer did not reply within the configured exchange bound.
    #[error("simulator did not reply within {timeout:?}")]
    ExchangeTimeout {
        /// The configured exchange timeout.
        timeout: Duration,
    },

    /// The peer closed the connection before a full line arrived.
    #[error("connection closed by simulator")]
    ConnectionClosed,

    /// The peer's reply failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Socket-level I/O failure.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The driver's listening socket, created once and reused across episodes.
#[derive(Debug)]
pub struct CosimChannel {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl CosimChannel {
    /// Binds a listener on an ephemeral loopback port.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] if the bind fails.
    pub async fn bind() -> Result<Self, ChannelError> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let local_addr = listener.local_addr()?;
        debug!(%local_addr, "co-simulation channel listening");
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// The bound host address, for the simulator's socket config file.
    #[must_use]
    pub fn host(&self) -> String {
        self.local_addr.ip().to_string()
    }

    /// The bound port, for the simulator's socket config file.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.local_addr.port()
    }

    /// Waits for the just-spawned simulator to dial back.
    ///
    /// Accepts exactly one connection. Anything else queued on the
    /// listener backlog stays there — and would be the connection handed
    /// to the NEXT episode's accept, ahead of its own simulator. Nothing
    /// but the one spawned simulator is expected to know this port, so
    /// the hazard is theoretical; it matches the reference driver's
    /// accept behavior.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::AcceptTimeout`] if no peer connects within
    /// `timeout`, or [`ChannelError::Io`] on an accept failure.
    pub async fn accept_episode(
        &self,
        timeout: Duration,
    ) -> Result<ChannelConnection, ChannelError> {
        match tokio::time::timeout(timeout, self.listener.accept()).await {
            Ok(Ok((stream, peer))) => {
                debug!(%peer, "simulator connected");
                let (read_half, write_half) = stream.into_split();
                Ok(ChannelConnection {
                    reader: BufReader::new(read_half),
                    writer: write_half,
                    exchange_timeout: None,
                    closed: false,
                })
            }
            Ok(Err(err)) => Err(ChannelError::Io(err)),
            Err(_) => Err(ChannelError::AcceptTimeout { timeout }),
        }
    }
}

/// The accepted connection for the current episode.
///
/// At most one exists at a time; it is closed and discarded at episode end.
#[derive(Debug)]
pub struct ChannelConnection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    exchange_timeout: Option<Duration>,
    closed: bool,
}

impl ChannelConnection {
    /// Sets an optional bound on each reply read.
    ///
    /// `None` reproduces the reference behavior of waiting indefinitely.
    pub fn set_exchange_timeout(&mut self, timeout: Option<Duration>) {
        self.exchange_timeout = timeout;
    }

    /// Writes one encoded message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Io`] if the write fails.
    pub async fn send(&mut self, message: &WireMessage) -> Result<(), ChannelError> {
        let line = message.encode();
        trace!(flag = message.flag, len = line.len(), "sending message");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Reads and decodes the next line from the peer.
    ///
    /// Used directly for the initial handshake, which the simulator sends
    /// without a prior request.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::ConnectionClosed`] if the peer closes the
    /// connection before a full line arrives, [`ChannelError::Codec`] if
    /// the line fails to decode, [`ChannelError::ExchangeTimeout`] if a
    /// reply bound is set and expires, or [`ChannelError::Io`] on socket
    /// failure.
    pub async fn receive(&mut self) -> Result<WireMessage, ChannelError> {
        let mut line = String::new();
        let n = match self.exchange_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.reader.read_line(&mut line))
                .await
                .map_err(|_| ChannelError::ExchangeTimeout { timeout })??,
            None => self.reader.read_line(&mut line).await?,
        };
        // EOF, or EOF in the middle of a line: the peer is gone.
        if n == 0 || !line.ends_with('\n') {
            return Err(ChannelError::ConnectionClosed);
        }
        trace!(len = n, "received message");
        Ok(WireMessage::decode(&line)?)
    }

    /// One strict request/response round: send, then block for the reply.
    ///
    /// # Errors
    ///
    /// Propagates the errors of [`Self::send`] and [`Self::receive`].
    pub async fn exchange(
        &mut self,
        outbound: &WireMessage,
    ) -> Result<WireMessage, ChannelError> {
        self.send(outbound).await?;
        self.receive().await
    }

    /// Shuts down the connection. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(err) = self.writer.shutdown().await {
            debug!(%err, "connection shutdown failed");
        }
    }
}
