// src/connection/operations/subscription.rs

//! The volatile stream subscription operation.

use super::{Operation, OperationStep};
use crate::connection::ClientHandle;
use crate::core::errors::CitrineError;
use crate::core::protocol::{Message, PackageOut};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubscriptionState {
    /// Subscribe sent, confirmation not yet received.
    Pending,
    /// Confirmed; events are flowing.
    Live,
    /// Unsubscribe sent, waiting for the server to confirm.
    Unsubscribing,
}

/// A server-push subscription to a single stream (or to all streams). The
/// subscription survives reconnects: the subscribe package is re-sent on
/// every new session under the same correlation id.
#[derive(Debug)]
pub struct SubscriptionOperation {
    package: PackageOut,
    client: ClientHandle,
    state: SubscriptionState,
}

impl SubscriptionOperation {
    pub fn new(package: PackageOut, client: ClientHandle) -> Self {
        Self {
            package,
            client,
            state: SubscriptionState::Pending,
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
                // One undecodable event does not tear the subscription down.
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
            message if self.state == SubscriptionState::Unsubscribing => {
                debug!(
                    command = message.name(),
                    "dropping event racing the unsubscribe"
                );
                OperationStep::retain(self.into())
            }
            message @ Message::SubscribeCompleted { .. } => {
                self.state = SubscriptionState::Live;
                self.client.deliver(Ok(message));
                OperationStep::retain(self.into())
            }
            message @ Message::StreamEventAppeared { .. } => {
                self.client.deliver(Ok(message));
                OperationStep::retain(self.into())
            }
            message => {
                warn!(
                    command = message.name(),
                    "unexpected message for a subscription"
                );
                OperationStep::retain(self.into())
            }
        }
    }

    pub fn claims_outgoing(&self, message: &Message) -> bool {
        matches!(message, Message::Unsubscribe)
    }

    pub fn apply_outgoing(mut self, message: Message) -> OperationStep {
        match message {
            Message::Unsubscribe => {
                self.state = SubscriptionState::Unsubscribing;
                let package = self.unsubscribe_package();
                OperationStep::transmit(self.into(), package)
            }
            other => {
                warn!(
                    command = other.name(),
                    "subscription cannot absorb this outgoing message"
                );
                OperationStep::retain(self.into())
            }
        }
    }

    pub fn connected(mut self) -> OperationStep {
        match self.state {
            SubscriptionState::Pending | SubscriptionState::Live => {
                self.state = SubscriptionState::Pending;
                let package = self.package.clone();
                OperationStep::transmit(self.into(), package)
            }
            SubscriptionState::Unsubscribing => {
                // The server-side subscription died with the old session;
                // the unsubscribe is effectively complete.
                self.client.deliver(Ok(Message::UnsubscribeCompleted));
                OperationStep::done()
            }
        }
    }

    pub fn connection_lost(self) -> Option<Operation> {
        match self.state {
            SubscriptionState::Pending | SubscriptionState::Live => Some(self.into()),
            SubscriptionState::Unsubscribing => {
                self.client.deliver(Ok(Message::UnsubscribeCompleted));
                None
            }
        }
    }

    pub fn client_terminated(&self) -> Option<PackageOut> {
        match self.state {
            SubscriptionState::Pending | SubscriptionState::Live => {
                Some(self.unsubscribe_package())
            }
            SubscriptionState::Unsubscribing => None,
        }
    }

    fn unsubscribe_package(&self) -> PackageOut {
        PackageOut {
            correlation: self.package.correlation,
            message: Message::Unsubscribe,
            credentials: self.package.credentials.clone(),
        }
    }
}

impl From<SubscriptionOperation> for Operation {
    fn from(op: SubscriptionOperation) -> Self {
        Operation::Subscription(op)
    }
}
