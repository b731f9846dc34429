// src/connection/operations/persistent.rs

//! The persistent (competing-consumer) subscription operation.

use super::{Operation, OperationStep};
use crate::connection::ClientHandle;
use crate::core::errors::CitrineError;
use crate::core::protocol::{Message, PackageOut};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PersistentState {
    Pending,
    Live,
    Unsubscribing,
}

/// A consumer of a server-side persistent subscription group. Besides the
/// subscribe/confirm/event flow this variant also absorbs the client's
/// acknowledgements, forwarding them under the subscription's own
/// correlation id.
#[derive(Debug)]
pub struct PersistentSubscriptionOperation {
    package: PackageOut,
    client: ClientHandle,
    state: PersistentState,
}

impl PersistentSubscriptionOperation {
    pub fn new(package: PackageOut, client: ClientHandle) -> Self {
        Self {
            package,
            client,
            state: PersistentState::Pending,
        }
    }

    pub fn id(&self) -> Uuid {
        self.package.correlation
    }

    pub fn client(&self) -> &ClientHandle {
        &self.client
    }

    pub fn inspect_in(mut self, result: Result<Message, CitrineError>) -> OperationStep {
        let message = match result {
            Ok(message) => message,
            Err(e) => {
                self.client.deliver(Err(e));
                return OperationStep::retain(self.into());
            }
        };
        match message {
            Message::UnsubscribeCompleted => {
                self.client.deliver(Ok(Message::UnsubscribeCompleted));
                OperationStep::done()
            }
            Message::SubscriptionDropped { reason } => {
                self.client
                    .deliver(Err(CitrineError::SubscriptionDropped(reason.to_string())));
                OperationStep::done()
            }
            message if self.state == PersistentState::Unsubscribing => {
                debug!(
                    command = message.name(),
                    "dropping event racing the unsubscribe"
                );
                OperationStep::retain(self.into())
            }
            message @ Message::PersistentSubscriptionConfirmation { .. } => {
                self.state = PersistentState::Live;
                self.client.deliver(Ok(message));
                OperationStep::retain(self.into())
            }
            message @ Message::PersistentSubscriptionEventAppeared { .. } => {
                self.client.deliver(Ok(message));
                OperationStep::retain(self.into())
            }
            message => {
                warn!(
                    command = message.name(),
                    "unexpected message for a persistent subscription"
                );
                OperationStep::retain(self.into())
            }
        }
    }

    pub fn claims_outgoing(&self, message: &Message) -> bool {
        matches!(
            message,
            Message::Unsubscribe
                | Message::PersistentSubscriptionAck { .. }
                | Message::PersistentSubscriptionNak { .. }
        )
    }

    pub fn apply_outgoing(mut self, message: Message) -> OperationStep {
        match message {
            Message::Unsubscribe => {
                self.state = PersistentState::Unsubscribing;
                let package = self.farewell_package(Message::Unsubscribe);
                OperationStep::transmit(self.into(), package)
            }
            message @ (Message::PersistentSubscriptionAck { .. }
            | Message::PersistentSubscriptionNak { .. }) => {
                let package = self.farewell_package(message);
                OperationStep::transmit(self.into(), package)
            }
            other => {
                warn!(
                    command = other.name(),
                    "persistent subscription cannot absorb this outgoing message"
                );
                OperationStep::retain(self.into())
            }
        }
    }

    pub fn connected(mut self) -> OperationStep {
        match self.state {
            PersistentState::Pending | PersistentState::Live => {
                self.state = PersistentState::Pending;
                let package = self.package.clone();
                OperationStep::transmit(self.into(), package)
            }
            PersistentState::Unsubscribing => {
                self.client.deliver(Ok(Message::UnsubscribeCompleted));
                OperationStep::done()
            }
        }
    }

    pub fn connection_lost(self) -> Option<Operation> {
        match self.state {
            PersistentState::Pending | PersistentState::Live => Some(self.into()),
            PersistentState::Unsubscribing => {
                self.client.deliver(Ok(Message::UnsubscribeCompleted));
                None
            }
        }
    }

    pub fn client_terminated(&self) -> Option<PackageOut> {
        match self.state {
            PersistentState::Pending | PersistentState::Live => {
                Some(self.farewell_package(Message::Unsubscribe))
            }
            PersistentState::Unsubscribing => None,
        }
    }

    fn farewell_package(&self, message: Message) -> PackageOut {
        PackageOut {
            correlation: self.package.correlation,
            message,
            credentials: self.package.credentials.clone(),
        }
    }
}

impl From<PersistentSubscriptionOperation> for Operation {
    fn from(op: PersistentSubscriptionOperation) -> Self {
        Operation::Persistent(op)
    }
}
