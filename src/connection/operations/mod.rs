// src/connection/operations/mod.rs

//! Per-request sub-state machines and the table that indexes them.
//!
//! Every outbound package that is not claimed by an existing operation
//! creates one; the variant is chosen by the message kind. Operations
//! consume the inbound messages for their correlation id, decide what to
//! replay after a reconnect, and deliver replies to the client that
//! originated them.

mod persistent;
mod request;
mod subscription;
mod table;
mod write;

pub use persistent::PersistentSubscriptionOperation;
pub use request::RequestOperation;
pub use subscription::SubscriptionOperation;
pub use table::OperationTable;
pub use write::WriteEventsOperation;

use crate::connection::ClientHandle;
use crate::core::errors::CitrineError;
use crate::core::protocol::{Message, PackageOut};
use uuid::Uuid;

/// The outcome of feeding a message to an operation: the operation's next
/// state (`None` = the operation is finished and leaves the table) and an
/// optional package to transmit.
#[derive(Debug)]
pub struct OperationStep {
    pub operation: Option<Operation>,
    pub send: Option<PackageOut>,
}

impl OperationStep {
    pub fn done() -> Self {
        Self {
            operation: None,
            send: None,
        }
    }

    pub fn retain(operation: Operation) -> Self {
        Self {
            operation: Some(operation),
            send: None,
        }
    }

    pub fn transmit(operation: Operation, package: PackageOut) -> Self {
        Self {
            operation: Some(operation),
            send: Some(package),
        }
    }
}

/// A pending operation, one variant per command kind.
#[derive(Debug)]
pub enum Operation {
    Request(RequestOperation),
    Write(WriteEventsOperation),
    Subscription(SubscriptionOperation),
    Persistent(PersistentSubscriptionOperation),
}

impl Operation {
    /// Builds a fresh operation for an outbound package that no existing
    /// operation claimed.
    pub fn from_package(package: PackageOut, client: ClientHandle, retries: u32) -> Operation {
        match &package.message {
            Message::SubscribeToStream { .. } => {
                Operation::Subscription(SubscriptionOperation::new(package, client))
            }
            Message::ConnectToPersistentSubscription { .. } => {
                Operation::Persistent(PersistentSubscriptionOperation::new(package, client))
            }
            Message::WriteEvents { .. } => {
                Operation::Write(WriteEventsOperation::new(package, client, retries))
            }
            _ => Operation::Request(RequestOperation::new(package, client, retries)),
        }
    }

    /// The correlation id this operation currently answers to.
    pub fn id(&self) -> Uuid {
        match self {
            Operation::Request(op) => op.id(),
            Operation::Write(op) => op.id(),
            Operation::Subscription(op) => op.id(),
            Operation::Persistent(op) => op.id(),
        }
    }

    /// The client replies are delivered to.
    pub fn client(&self) -> &ClientHandle {
        match self {
            Operation::Request(op) => op.client(),
            Operation::Write(op) => op.client(),
            Operation::Subscription(op) => op.client(),
            Operation::Persistent(op) => op.client(),
        }
    }

    /// Consumes an inbound message (or failure) addressed to this operation.
    pub fn inspect_in(self, result: Result<Message, CitrineError>) -> OperationStep {
        match self {
            Operation::Request(op) => op.inspect_in(result),
            Operation::Write(op) => op.inspect_in(result),
            Operation::Subscription(op) => op.inspect_in(result),
            Operation::Persistent(op) => op.inspect_in(result),
        }
    }

    /// Whether this operation wants to absorb a follow-up outbound message
    /// from its client instead of letting it become a new operation.
    pub fn claims_outgoing(&self, message: &Message) -> bool {
        match self {
            Operation::Request(op) => op.claims_outgoing(message),
            Operation::Write(op) => op.claims_outgoing(message),
            Operation::Subscription(op) => op.claims_outgoing(message),
            Operation::Persistent(op) => op.claims_outgoing(message),
        }
    }

    /// Applies a claimed outbound message.
    pub fn apply_outgoing(self, message: Message) -> OperationStep {
        match self {
            Operation::Request(op) => op.apply_outgoing(message),
            Operation::Write(op) => op.apply_outgoing(message),
            Operation::Subscription(op) => op.apply_outgoing(message),
            Operation::Persistent(op) => op.apply_outgoing(message),
        }
    }

    /// Invoked on (re)connect to replay this operation on the new session.
    pub fn connected(self) -> OperationStep {
        match self {
            Operation::Request(op) => op.connected(),
            Operation::Write(op) => op.connected(),
            Operation::Subscription(op) => op.connected(),
            Operation::Persistent(op) => op.connected(),
        }
    }

    /// Invoked when the session is lost. `None` drops the operation after
    /// failing its client with `ConnectionLost`.
    pub fn connection_lost(self) -> Option<Operation> {
        match self {
            Operation::Request(op) => op.connection_lost(),
            Operation::Write(op) => op.connection_lost(),
            Operation::Subscription(op) => op.connection_lost(),
            Operation::Persistent(op) => op.connection_lost(),
        }
    }

    /// Invoked when the originating client dies; the returned farewell
    /// package is transmitted if a session is live.
    pub fn client_terminated(&self) -> Option<PackageOut> {
        match self {
            Operation::Request(op) => op.client_terminated(),
            Operation::Write(op) => op.client_terminated(),
            Operation::Subscription(op) => op.client_terminated(),
            Operation::Persistent(op) => op.client_terminated(),
        }
    }
}
