// tests/integration/connection_test.rs

//! Request/response flows over a live session.

use super::test_helpers::{FakeServer, WAIT};
use bytes::{BufMut, Bytes, BytesMut};
use citrine_client::CitrineError;
use citrine_client::Connection;
use citrine_client::core::protocol::message::command;
use citrine_client::core::protocol::Message;
use std::time::Duration;
use tokio::time::timeout;
use uuid::Uuid;

#[tokio::test]
async fn connect_then_echo() {
    let server = FakeServer::bind().await;
    let mut config = server.config();
    config.max_reconnections = 0;
    let connection = Connection::connect(config);
    let (client, mut replies) = connection.attach();

    let correlation = connection.send(
        &client,
        Message::Ping {
            payload: Bytes::from_static(b"hello"),
        },
    );

    let mut session = server.accept().await;
    let (received, message) = session.recv().await;
    assert_eq!(received, correlation);
    assert_eq!(
        message,
        Message::Ping {
            payload: Bytes::from_static(b"hello")
        }
    );

    session
        .send(
            correlation,
            Message::Pong {
                payload: Bytes::from_static(b"hello"),
            },
        )
        .await;
    let reply = timeout(WAIT, replies.recv()).await.unwrap().unwrap();
    assert_eq!(
        reply,
        Ok(Message::Pong {
            payload: Bytes::from_static(b"hello")
        })
    );

    // The one-shot is finished: a duplicate response is stray and nothing
    // more reaches the client.
    session
        .send(
            correlation,
            Message::Pong {
                payload: Bytes::new(),
            },
        )
        .await;
    assert!(
        timeout(Duration::from_millis(200), replies.recv())
            .await
            .is_err()
    );
}

#[tokio::test]
async fn server_ping_gets_a_pong_with_the_same_correlation() {
    let server = FakeServer::bind().await;
    let _connection = Connection::connect(server.config());
    let mut session = server.accept().await;

    let probe = Uuid::new_v4();
    session
        .send(
            probe,
            Message::Ping {
                payload: Bytes::from_static(b"are you there"),
            },
        )
        .await;

    let (correlation, message) = session.recv().await;
    assert_eq!(correlation, probe);
    assert_eq!(
        message,
        Message::Pong {
            payload: Bytes::from_static(b"are you there")
        }
    );
}

#[tokio::test]
async fn stray_subscribe_completed_is_defensively_unsubscribed() {
    let server = FakeServer::bind().await;
    let _connection = Connection::connect(server.config());
    let mut session = server.accept().await;

    let ghost = Uuid::new_v4();
    session
        .send(
            ghost,
            Message::SubscribeCompleted {
                last_commit_position: 0,
                last_event_number: Some(12),
            },
        )
        .await;

    let (correlation, message) = session.recv().await;
    assert_eq!(correlation, ghost);
    assert_eq!(message, Message::Unsubscribe);
}

#[tokio::test]
async fn payload_decode_failure_is_relayed_to_the_owner() {
    let server = FakeServer::bind().await;
    let connection = Connection::connect(server.config());
    let (client, mut replies) = connection.attach();

    let correlation = connection.send(
        &client,
        Message::WriteEvents {
            stream: "orders".into(),
            expected_version: -1,
            events: vec![],
        },
    );

    let mut session = server.accept().await;
    let (received, _) = session.recv().await;
    assert_eq!(received, correlation);

    // A WriteEventsCompleted frame whose result code does not exist: the
    // frame itself is fine, so it must surface to the owner as a failure,
    // not kill the session.
    let mut frame = BytesMut::new();
    frame.put_u32_le(18 + 17);
    frame.put_u8(command::WRITE_EVENTS_COMPLETED);
    frame.put_u8(0);
    frame.extend_from_slice(correlation.as_bytes());
    frame.put_u8(0xEE);
    frame.extend_from_slice(&[0u8; 16]);
    session.send_raw(&frame).await;

    let reply = timeout(WAIT, replies.recv()).await.unwrap().unwrap();
    assert!(matches!(reply, Err(CitrineError::Decode(_))));

    // The session survived the bad payload.
    let probe = Uuid::new_v4();
    session
        .send(
            probe,
            Message::Ping {
                payload: Bytes::new(),
            },
        )
        .await;
    let (correlation, message) = session.recv().await;
    assert_eq!(correlation, probe);
    assert!(matches!(message, Message::Pong { .. }));
}
