// src/connection/mod.rs

//! Manages the lifecycle of the single TCP session to the server: the
//! connection state machine, the framing pipeline, heartbeat liveness,
//! reconnect backoff, and the per-request operation table.

pub mod heartbeat;
pub mod manager;
pub mod operations;
pub mod pipeline;
pub mod retry;

pub use heartbeat::HeartbeatTimer;
pub use manager::{ConnectionManager, Control, Event};
pub use operations::{Operation, OperationTable};
pub use pipeline::Pipeline;
pub use retry::RetrySchedule;

use crate::core::errors::CitrineError;
use crate::core::protocol::Message;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

/// What a local client receives for each of its operations: the decoded
/// inbound message, or a structured failure.
pub type Reply = Result<Message, CitrineError>;

/// Identifies a local client attached to the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(pub u64);

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "client#{}", self.0)
    }
}

/// A handle to a local client: its identity plus the channel replies are
/// delivered on. The manager watches the channel to observe client death.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    id: ClientId,
    tx: UnboundedSender<Reply>,
}

impl ClientHandle {
    pub fn new(id: ClientId, tx: UnboundedSender<Reply>) -> Self {
        Self { id, tx }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Delivers a reply, ignoring a receiver that has already gone away:
    /// the death notification cleans the client up separately.
    pub fn deliver(&self, reply: Reply) {
        if self.tx.send(reply).is_err() {
            debug!("{} is gone, dropping reply", self.id);
        }
    }

    /// Resolves once the client's receiving side has been dropped.
    pub async fn closed(&self) {
        self.tx.closed().await;
    }
}
