// src/connection/operations/request.rs

//! The one-shot request operation: one outbound package, one reply.

use super::{Operation, OperationStep};
use crate::connection::ClientHandle;
use crate::core::errors::CitrineError;
use crate::core::protocol::{Message, NotHandledReason, PackageOut};
use tracing::{debug, warn};
use uuid::Uuid;

/// Covers every plain request/response command: `Ping`, `ReadEvent`,
/// `Authenticate`, the transaction steps, an explicit `Unsubscribe`, and so
/// on. The first inbound for its correlation id completes it, except for a
/// retriable `NotHandled`, which parks the operation until the next
/// (re)connect replays it.
#[derive(Debug)]
pub struct RequestOperation {
    package: PackageOut,
    client: ClientHandle,
    retries_left: u32,
}

impl RequestOperation {
    pub fn new(package: PackageOut, client: ClientHandle, retries: u32) -> Self {
        Self {
            package,
            client,
            retries_left: retries,
        }
    }

    pub fn id(&self) -> Uuid {
        self.package.correlation
    }

    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    pub fn inspect_in(self, result: Result<Message, CitrineError>) -> OperationStep {
        match result {
            Ok(Message::NotHandled {
                reason: reason @ (NotHandledReason::NotReady | NotHandledReason::TooBusy),
            }) => {
                debug!(
                    command = self.package.message.name(),
                    "server is {reason}, holding request for replay"
                );
                OperationStep::retain(self.into())
            }
            Ok(Message::NotHandled { reason }) => {
                self.client
                    .deliver(Err(CitrineError::NotHandled(reason.to_string())));
                OperationStep::done()
            }
            Ok(Message::BadRequest { reason }) => {
                self.client.deliver(Err(CitrineError::Server(reason)));
                OperationStep::done()
            }
            Ok(Message::NotAuthenticated { reason }) => {
                self.client
                    .deliver(Err(CitrineError::NotAuthenticated(reason)));
                OperationStep::done()
            }
            Ok(message) => {
                self.client.deliver(Ok(message));
                OperationStep::done()
            }
            Err(e) => {
                self.client.deliver(Err(e));
                OperationStep::done()
            }
        }
    }

    pub fn claims_outgoing(&self, _message: &Message) -> bool {
        false
    }

    pub fn apply_outgoing(self, message: Message) -> OperationStep {
        warn!(
            command = message.name(),
            "request operation cannot absorb outgoing messages"
        );
        OperationStep::retain(self.into())
    }

    pub fn connected(self) -> OperationStep {
        let package = self.package.clone();
        OperationStep::transmit(self.into(), package)
    }

    pub fn connection_lost(mut self) -> Option<Operation> {
        if self.retries_left == 0 {
            self.client.deliver(Err(CitrineError::ConnectionLost));
            return None;
        }
        self.retries_left -= 1;
        Some(self.into())
    }

    pub fn client_terminated(&self) -> Option<PackageOut> {
        None
    }
}

impl From<RequestOperation> for Operation {
    fn from(op: RequestOperation) -> Self {
        Operation::Request(op)
    }
}
