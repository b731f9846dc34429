// src/connection/heartbeat.rs

//! The pair of one-shot heartbeat timers guarding a live session.

use crate::connection::manager::{Control, Event};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time;

/// Two cancellable one-shot timers bundled with the heartbeat epoch they
/// were armed under: one fires `HeartbeatDue` after the heartbeat interval,
/// the other `HeartbeatTimeout` after interval plus timeout. The manager
/// compares the carried epoch against its current one, so an event from a
/// cancelled bundle that already reached the mailbox is ignored.
#[derive(Debug)]
pub struct HeartbeatTimer {
    id: u64,
    due: JoinHandle<()>,
    timeout: JoinHandle<()>,
}

impl HeartbeatTimer {
    pub fn arm(
        id: u64,
        interval: Duration,
        timeout: Duration,
        events: UnboundedSender<Event>,
    ) -> Self {
        let due = tokio::spawn({
            let events = events.clone();
            async move {
                time::sleep(interval).await;
                let _ = events.send(Event::Control(Control::HeartbeatDue(id)));
            }
        });
        let timeout = tokio::spawn(async move {
            time::sleep(interval + timeout).await;
            let _ = events.send(Event::Control(Control::HeartbeatTimeout(id)));
        });
        Self { id, due, timeout }
    }

    /// The epoch this bundle was armed under.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cancels both timers. Idempotent.
    pub fn cancel(&self) {
        self.due.abort();
        self.timeout.abort();
    }
}

impl Drop for HeartbeatTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
