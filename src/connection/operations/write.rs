// src/connection/operations/write.rs

//! The append operation, with idempotent retry on server-side timeouts.

use super::{Operation, OperationStep};
use crate::connection::ClientHandle;
use crate::core::errors::CitrineError;
use crate::core::protocol::{Message, NotHandledReason, OperationResult, PackageOut};
use tracing::{debug, warn};
use uuid::Uuid;

/// Handles `WriteEvents`. The correlation id doubles as the idempotency key,
/// so a `PrepareTimeout`/`CommitTimeout` outcome re-sends the same package
/// under the same id instead of completing: the server deduplicates a write
/// it already applied.
#[derive(Debug)]
pub struct WriteEventsOperation {
    package: PackageOut,
    client: ClientHandle,
    retries_left: u32,
}

impl WriteEventsOperation {
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

    pub fn inspect_in(mut self, result: Result<Message, CitrineError>) -> OperationStep {
        match result {
            Ok(Message::WriteEventsCompleted {
                result: OperationResult::PrepareTimeout | OperationResult::CommitTimeout,
                ..
            }) => {
                if self.retries_left == 0 {
                    self.client.deliver(Err(CitrineError::OperationTimedOut(
                        "write kept timing out on the server".into(),
                    )));
                    return OperationStep::done();
                }
                self.retries_left -= 1;
                debug!(
                    retries_left = self.retries_left,
                    "write timed out on the server, re-sending"
                );
                let package = self.package.clone();
                OperationStep::transmit(self.into(), package)
            }
            Ok(Message::NotHandled {
                reason: reason @ (NotHandledReason::NotReady | NotHandledReason::TooBusy),
            }) => {
                debug!("server is {reason}, holding write for replay");
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
            "write operation cannot absorb outgoing messages"
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

impl From<WriteEventsOperation> for Operation {
    fn from(op: WriteEventsOperation) -> Self {
        Operation::Write(op)
    }
}
