//! Shared test fixtures: a scripted fake simulator peer.
//!
//! The real simulator is an external process that dials back to the
//! driver's listening socket and speaks the line protocol. These tests
//! replace it with an in-process tokio task following a small script:
//! send a handshake, answer each step by advancing elapsed time by a fixed
//! increment, and acknowledge the terminate handshake (including observing
//! the driver's required terminate re-send).

use std::sync::Once;

use ecosim_core::codec::WireMessage;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

/// Installs the test tracing subscriber once per test binary, so driver
/// logs show up under `--nocapture` (filtered via `RUST_LOG`).
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Script for one fake-simulator connection.
#[derive(Debug, Clone)]
pub struct PeerScript {
    /// Wire-format version the peer advertises.
    pub version: i32,
    /// Elapsed time carried by the handshake.
    pub handshake_elapsed: f64,
    /// Observation values carried by the handshake.
    pub handshake_values: Vec<f64>,
    /// How far each step reply advances elapsed time.
    pub step_increment: f64,
    /// Observation values carried by every step reply.
    pub reply_values: Vec<f64>,
    /// Drop the socket right after the handshake.
    pub close_after_handshake: bool,
}

impl Default for PeerScript {
    fn default() -> Self {
        Self {
            version: 2,
            handshake_elapsed: 0.0,
            handshake_values: vec![20.0, 21.0],
            step_increment: 900.0,
            reply_values: vec![20.5, 21.5],
            close_after_handshake: false,
        }
    }
}

/// What the fake peer observed over one connection.
#[derive(Debug, Default)]
pub struct PeerReport {
    /// Number of normal step messages answered.
    pub steps_served: u32,
    /// Number of terminate messages received before the acknowledgement.
    pub terminate_messages: u32,
    /// Whether the terminate message arrived a second time after the
    /// acknowledgement was sent.
    pub saw_second_terminate: bool,
}

/// Spawns a fake simulator that connects to `port` and follows `script`.
pub fn spawn_peer(port: u16, script: PeerScript) -> JoinHandle<PeerReport> {
    tokio::spawn(async move {
        let mut report = PeerReport::default();
        let stream = TcpStream::connect(("127.0.0.1", port))
            .await
            .expect("peer connect");
        let (read_half, mut write_half) = stream.into_split();
        let mut lines = BufReader::new(read_half).lines();

        let handshake = WireMessage::step(
            script.version,
            script.handshake_values.clone(),
            script.handshake_elapsed,
        );
        write_half
            .write_all(handshake.encode().as_bytes())
            .await
            .expect("peer handshake write");

        if script.close_after_handshake {
            return report;
        }

        let mut elapsed = script.handshake_elapsed;
        while let Ok(Some(line)) = lines.next_line().await {
            let msg = WireMessage::decode(&line).expect("peer decode");
            if msg.is_terminate() {
                report.terminate_messages += 1;
                // Acknowledge, then wait for the driver's re-send.
                write_half
                    .write_all(msg.encode().as_bytes())
                    .await
                    .expect("peer ack write");
                if let Ok(Some(line)) = lines.next_line().await {
                    if let Ok(again) = WireMessage::decode(&line) {
                        if again.is_terminate() {
                            report.saw_second_terminate = true;
                        }
                    }
                }
                break;
            }

            elapsed += script.step_increment;
            let reply =
                WireMessage::step(script.version, script.reply_values.clone(), elapsed);
            write_half
                .write_all(reply.encode().as_bytes())
                .await
                .expect("peer reply write");
            report.steps_served += 1;
        }
        report
    })
}
