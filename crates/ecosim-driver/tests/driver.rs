//! End-to-end episode lifecycle tests against a scripted fake simulator.
//!
//! The subprocess the driver spawns is a stand-in (`true`) that exits
//! immediately and ignores its arguments; the protocol side of the
//! simulator is played by the in-process peer from `common`.

mod common;

use std::path::Path;

use common::{init_tracing, spawn_peer, PeerScript};
use ecosim_driver::{DriverConfig, DriverError, EpisodeDriver, StaticRunPreparer};
use tempfile::TempDir;

/// Builds a fast-teardown config rooted in a scratch directory.
fn test_config(root: &Path) -> DriverConfig {
    init_tracing();
    let mut config = DriverConfig::new("true");
    config.experiment_root = root.to_path_buf();
    config.env_name = "test-env".to_string();
    config.connect_timeout_secs = 5;
    config.flush_delay_ms = 10;
    config
}

/// Creates dummy model/weather inputs and a preparer over them.
fn test_preparer(root: &Path, episode_length_secs: f64) -> StaticRunPreparer {
    let model = root.join("building.idf");
    let weather = root.join("weather.epw");
    std::fs::write(&model, "model").unwrap();
    std::fs::write(&weather, "weather").unwrap();
    StaticRunPreparer::new(model, weather, episode_length_secs, 4)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reset_returns_handshake_observation() {
    let tmp = TempDir::new().unwrap();
    let preparer = test_preparer(tmp.path(), 3600.0);
    let mut driver = EpisodeDriver::new(test_config(tmp.path()), preparer)
        .await
        .unwrap();

    let peer = spawn_peer(driver.port(), PeerScript::default());

    let outcome = driver.reset().await.unwrap();
    assert_eq!(outcome.elapsed_secs, 0.0);
    assert_eq!(outcome.observations, vec![20.0, 21.0]);
    assert!(!outcome.terminal);
    assert!(driver.is_active());
    assert_eq!(driver.episode_index(), Some(0));
    assert_eq!(driver.elapsed_secs(), Some(0.0));

    driver.close().await;
    assert!(!driver.is_active());

    let report = peer.await.unwrap();
    assert_eq!(report.terminate_messages, 1);
    assert!(report.saw_second_terminate);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_step_advances_to_terminal_on_exact_step() {
    let tmp = TempDir::new().unwrap();
    // Four 900 s replies reach the 3600 s episode length exactly.
    let preparer = test_preparer(tmp.path(), 3600.0);
    let mut driver = EpisodeDriver::new(test_config(tmp.path()), preparer)
        .await
        .unwrap();

    let peer = spawn_peer(driver.port(), PeerScript::default());
    driver.reset().await.unwrap();

    for expected_step in 1..=3u32 {
        let outcome = driver.step(&[21.0, 25.0]).await.unwrap().unwrap();
        assert!(!outcome.terminal, "step {expected_step} must not be terminal");
        assert_eq!(outcome.elapsed_secs, 900.0 * f64::from(expected_step));
        assert_eq!(outcome.observations, vec![20.5, 21.5]);
    }

    // The fourth step reaches the configured duration: terminal, and the
    // driver transitions back to idle without raising.
    let outcome = driver.step(&[21.0, 25.0]).await.unwrap().unwrap();
    assert!(outcome.terminal);
    assert_eq!(outcome.elapsed_secs, 3600.0);
    assert!(!driver.is_active());

    // Past the end: the documented no-op sentinel, and no message is sent.
    let sentinel = driver.step(&[21.0, 25.0]).await.unwrap();
    assert!(sentinel.is_none());

    let report = peer.await.unwrap();
    assert_eq!(report.steps_served, 4);
    assert_eq!(report.terminate_messages, 1);
    assert!(report.saw_second_terminate);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_action_repeat_sends_action_twice_per_step() {
    let tmp = TempDir::new().unwrap();
    let preparer = test_preparer(tmp.path(), 1_000_000.0);
    let mut config = test_config(tmp.path());
    config.action_repeat = 2;
    let mut driver = EpisodeDriver::new(config, preparer).await.unwrap();

    let peer = spawn_peer(driver.port(), PeerScript::default());
    driver.reset().await.unwrap();

    let outcome = driver.step(&[22.0]).await.unwrap().unwrap();
    assert_eq!(outcome.elapsed_secs, 1800.0);
    assert!(!outcome.terminal);

    driver.close().await;
    let report = peer.await.unwrap();
    assert_eq!(report.steps_served, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_peer_disconnect_surfaces_connection_closed() {
    let tmp = TempDir::new().unwrap();
    let preparer = test_preparer(tmp.path(), 3600.0);
    let mut driver = EpisodeDriver::new(test_config(tmp.path()), preparer)
        .await
        .unwrap();

    let script = PeerScript {
        close_after_handshake: true,
        ..PeerScript::default()
    };
    let peer = spawn_peer(driver.port(), script);

    let outcome = driver.reset().await.unwrap();
    assert!(!outcome.terminal);
    peer.await.unwrap();

    // The peer is gone: the next step must fail fast, not hang.
    let err = driver.step(&[21.0]).await.unwrap_err();
    assert!(matches!(err, DriverError::ConnectionClosed), "got {err:?}");

    // The failed episode was retired; the driver degrades to idle.
    assert!(!driver.is_active());
    assert!(driver.step(&[21.0]).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_back_to_back_resets_retire_previous_episode() {
    let tmp = TempDir::new().unwrap();
    let preparer = test_preparer(tmp.path(), 3600.0);
    let mut driver = EpisodeDriver::new(test_config(tmp.path()), preparer)
        .await
        .unwrap();

    let first_peer = spawn_peer(driver.port(), PeerScript::default());
    driver.reset().await.unwrap();
    assert_eq!(driver.episode_index(), Some(0));

    let second_peer = spawn_peer(driver.port(), PeerScript::default());
    driver.reset().await.unwrap();

    // The first episode's connection got the full terminate handshake
    // before the second episode started.
    let first_report = first_peer.await.unwrap();
    assert_eq!(first_report.terminate_messages, 1);
    assert!(first_report.saw_second_terminate);

    // Exactly one episode is live, with the next monotonic index.
    assert!(driver.is_active());
    assert_eq!(driver.episode_index(), Some(1));

    driver.close().await;
    let second_report = second_peer.await.unwrap();
    assert_eq!(second_report.terminate_messages, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_handshake_already_terminal_tears_down() {
    let tmp = TempDir::new().unwrap();
    // Zero-length episode: the handshake's elapsed time already reaches
    // the configured duration.
    let preparer = test_preparer(tmp.path(), 0.0);
    let mut driver = EpisodeDriver::new(test_config(tmp.path()), preparer)
        .await
        .unwrap();

    let peer = spawn_peer(driver.port(), PeerScript::default());

    let outcome = driver.reset().await.unwrap();
    assert!(outcome.terminal);
    assert!(!driver.is_active());

    let report = peer.await.unwrap();
    assert_eq!(report.steps_served, 0);
    assert_eq!(report.terminate_messages, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_connection_timeout_when_simulator_never_dials() {
    let tmp = TempDir::new().unwrap();
    let preparer = test_preparer(tmp.path(), 3600.0);
    let mut config = test_config(tmp.path());
    config.connect_timeout_secs = 1;
    let mut driver = EpisodeDriver::new(config, preparer).await.unwrap();

    // No peer connects at all.
    let err = driver.reset().await.unwrap_err();
    assert!(matches!(err, DriverError::ConnectionTimeout { .. }), "got {err:?}");
    assert!(!driver.is_active());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_step_before_any_reset_is_noop() {
    let tmp = TempDir::new().unwrap();
    let preparer = test_preparer(tmp.path(), 3600.0);
    let mut driver = EpisodeDriver::new(test_config(tmp.path()), preparer)
        .await
        .unwrap();

    assert!(driver.step(&[21.0]).await.unwrap().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_episode_directories_created_and_pruned() {
    let tmp = TempDir::new().unwrap();
    let preparer = test_preparer(tmp.path(), 3600.0);
    let mut config = test_config(tmp.path());
    config.max_episode_dirs = 2;
    let mut driver = EpisodeDriver::new(config, preparer).await.unwrap();

    for _ in 0..4 {
        let peer = spawn_peer(driver.port(), PeerScript::default());
        driver.reset().await.unwrap();
        driver.close().await;
        peer.await.unwrap();
    }

    let episode_dirs: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| {
            entry
                .file_name()
                .to_string_lossy()
                .starts_with("test-env-res")
        })
        .collect();
    assert_eq!(episode_dirs.len(), 2, "only the newest directories survive");
}
