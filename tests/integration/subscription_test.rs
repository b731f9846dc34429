// tests/integration/subscription_test.rs

//! Subscription flows: replay across reconnects, claim of the unsubscribe,
//! and cleanup after a client death.

use super::test_helpers::{FakeServer, WAIT};
use bytes::Bytes;
use citrine_client::Connection;
use citrine_client::core::protocol::{Message, RecordedEvent};
use tokio::time::timeout;
use uuid::Uuid;

fn recorded_event(number: u64) -> RecordedEvent {
    RecordedEvent {
        stream: "orders".into(),
        event_number: number,
        event_id: Uuid::new_v4(),
        event_type: "order-placed".into(),
        data: Bytes::from_static(b"{}"),
        metadata: Bytes::new(),
    }
}

#[tokio::test]
async fn subscription_survives_a_reconnect() {
    let server = FakeServer::bind().await;
    let connection = Connection::connect(server.config());
    let (client, mut replies) = connection.attach();

    let correlation = connection.send(
        &client,
        Message::SubscribeToStream {
            stream: "orders".into(),
            resolve_links: true,
        },
    );

    let mut session = server.accept().await;
    let (received, _) = session.recv().await;
    assert_eq!(received, correlation);
    session
        .send(
            correlation,
            Message::SubscribeCompleted {
                last_commit_position: 0,
                last_event_number: None,
            },
        )
        .await;
    assert!(matches!(
        timeout(WAIT, replies.recv()).await.unwrap().unwrap(),
        Ok(Message::SubscribeCompleted { .. })
    ));

    session
        .send(
            correlation,
            Message::StreamEventAppeared {
                event: recorded_event(0),
            },
        )
        .await;
    assert!(matches!(
        timeout(WAIT, replies.recv()).await.unwrap().unwrap(),
        Ok(Message::StreamEventAppeared { .. })
    ));

    // Kill the session: the subscription must re-issue itself on the next
    // one, under the same correlation id, without failing its client.
    drop(session);
    let mut session = server.accept().await;
    let (replayed, message) = session.recv().await;
    assert_eq!(replayed, correlation);
    assert!(matches!(message, Message::SubscribeToStream { .. }));

    session
        .send(
            correlation,
            Message::SubscribeCompleted {
                last_commit_position: 64,
                last_event_number: Some(0),
            },
        )
        .await;
    assert!(matches!(
        timeout(WAIT, replies.recv()).await.unwrap().unwrap(),
        Ok(Message::SubscribeCompleted { .. })
    ));

    session
        .send(
            correlation,
            Message::StreamEventAppeared {
                event: recorded_event(1),
            },
        )
        .await;
    assert!(matches!(
        timeout(WAIT, replies.recv()).await.unwrap().unwrap(),
        Ok(Message::StreamEventAppeared { .. })
    ));
}

#[tokio::test]
async fn unsubscribe_is_claimed_by_the_live_subscription() {
    let server = FakeServer::bind().await;
    let connection = Connection::connect(server.config());
    let (client, mut replies) = connection.attach();

    let subscription = connection.send(
        &client,
        Message::SubscribeToStream {
            stream: "orders".into(),
            resolve_links: false,
        },
    );
    let mut session = server.accept().await;
    session.recv().await;
    session
        .send(
            subscription,
            Message::SubscribeCompleted {
                last_commit_position: 0,
                last_event_number: None,
            },
        )
        .await;
    timeout(WAIT, replies.recv()).await.unwrap().unwrap().unwrap();

    // The unsubscribe request is absorbed by the live subscription and goes
    // out under the subscription's correlation id, not the fresh one.
    let fresh = connection.send(&client, Message::Unsubscribe);
    let (correlation, message) = session.recv().await;
    assert_eq!(message, Message::Unsubscribe);
    assert_eq!(correlation, subscription);
    assert_ne!(correlation, fresh);

    session.send(subscription, Message::UnsubscribeCompleted).await;
    assert_eq!(
        timeout(WAIT, replies.recv()).await.unwrap().unwrap(),
        Ok(Message::UnsubscribeCompleted)
    );
}

#[tokio::test]
async fn dead_subscriber_triggers_a_farewell_unsubscribe() {
    let server = FakeServer::bind().await;
    let connection = Connection::connect(server.config());
    let (client, mut replies) = connection.attach();

    let subscription = connection.send(
        &client,
        Message::SubscribeToStream {
            stream: "orders".into(),
            resolve_links: false,
        },
    );
    let mut session = server.accept().await;
    session.recv().await;
    session
        .send(
            subscription,
            Message::SubscribeCompleted {
                last_commit_position: 0,
                last_event_number: None,
            },
        )
        .await;
    timeout(WAIT, replies.recv()).await.unwrap().unwrap().unwrap();

    // The client dies; the manager notices and unsubscribes on its behalf.
    drop(replies);
    drop(client);

    let (correlation, message) = session.recv().await;
    assert_eq!(correlation, subscription);
    assert_eq!(message, Message::Unsubscribe);
}
