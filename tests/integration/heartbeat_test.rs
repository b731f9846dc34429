// tests/integration/heartbeat_test.rs

//! Heartbeat liveness: probes on silence, reconnect on an ignored probe.

use super::test_helpers::FakeServer;
use citrine_client::Connection;
use citrine_client::core::protocol::Message;
use std::time::Duration;

#[tokio::test]
async fn silence_triggers_a_probe_then_a_reconnect() {
    let server = FakeServer::bind().await;
    let mut config = server.config();
    config.heartbeat_interval_ms = 50;
    config.heartbeat_timeout_ms = 100;
    config.max_reconnections = 1;
    let _connection = Connection::connect(config);

    let mut session = server.accept().await;
    let (_, message) = session.recv().await;
    assert_eq!(message, Message::HeartbeatRequest);

    // Ignore the probe: the client must declare the session dead, close the
    // socket, and dial again.
    let _second = server.accept().await;
}

#[tokio::test]
async fn answered_probes_keep_the_session_alive() {
    let server = FakeServer::bind().await;
    let mut config = server.config();
    config.heartbeat_interval_ms = 40;
    config.heartbeat_timeout_ms = 200;
    config.max_reconnections = 1;
    let _connection = Connection::connect(config);

    let mut session = server.accept().await;
    for _ in 0..4 {
        let (correlation, message) = session.recv().await;
        assert_eq!(message, Message::HeartbeatRequest);
        session.send(correlation, Message::HeartbeatResponse).await;
    }

    // Several probe cycles passed with answers; no reconnect happened.
    server.expect_no_connection(Duration::from_millis(150)).await;
}
