// tests/integration/reconnect_test.rs

//! Reconnect backoff, replay, and budget exhaustion.

use super::test_helpers::{FakeServer, WAIT, test_config};
use bytes::Bytes;
use citrine_client::CitrineError;
use citrine_client::Connection;
use citrine_client::core::protocol::{Message, ReadEventResult};
use tokio::net::TcpListener;
use tokio::time::timeout;

#[tokio::test]
async fn pending_request_is_replayed_after_peer_close() {
    let server = FakeServer::bind().await;
    let connection = Connection::connect(server.config());
    let (client, mut replies) = connection.attach();

    let correlation = connection.send(
        &client,
        Message::ReadEvent {
            stream: "orders".into(),
            event_number: 7,
            resolve_links: false,
        },
    );

    let mut session = server.accept().await;
    let (received, _) = session.recv().await;
    assert_eq!(received, correlation);

    // The server dies before answering; at-least-once delivery means the
    // request reappears on the next session under the same correlation id.
    drop(session);

    let mut session = server.accept().await;
    let (replayed, message) = session.recv().await;
    assert_eq!(replayed, correlation);
    assert!(matches!(message, Message::ReadEvent { .. }));

    let completed = Message::ReadEventCompleted {
        result: ReadEventResult::NotFound,
        event: None,
    };
    session.send(correlation, completed.clone()).await;
    let reply = timeout(WAIT, replies.recv()).await.unwrap().unwrap();
    assert_eq!(reply, Ok(completed));
}

#[tokio::test]
async fn exhausted_budget_terminates_and_fails_every_client() {
    // A port with nothing listening on it.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = test_config(port);
    config.max_reconnections = 2;
    let connection = Connection::connect(config);
    let (client, mut replies) = connection.attach();
    connection.send(
        &client,
        Message::Ping {
            payload: Bytes::new(),
        },
    );

    let reply = timeout(WAIT, replies.recv()).await.unwrap().unwrap();
    assert_eq!(reply, Err(CitrineError::ConnectionLost));

    // The manager is terminated: late requests fail immediately.
    connection.send(
        &client,
        Message::Ping {
            payload: Bytes::new(),
        },
    );
    let reply = timeout(WAIT, replies.recv()).await.unwrap().unwrap();
    assert_eq!(reply, Err(CitrineError::ConnectionLost));
}
