// src/client.rs

//! The public face of the connection: spawns the manager and turns local
//! calls into mailbox events.

use crate::config::ClientConfig;
use crate::connection::manager::{ConnectionManager, Control, Event};
use crate::connection::{ClientHandle, ClientId, Reply};
use crate::core::errors::CitrineError;
use crate::core::protocol::{Credentials, Message, PackageOut};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

/// A handle to a running connection manager.
///
/// Local clients are registered with [`Connection::attach`] and receive
/// their replies on the returned channel; dropping that channel is how a
/// client "dies" and gets its pending operations cleaned up. Dropping the
/// `Connection` itself shuts the manager down.
#[derive(Debug)]
pub struct Connection {
    events: UnboundedSender<Event>,
    default_credentials: Option<Credentials>,
    next_client_id: AtomicU64,
}

impl Connection {
    /// Spawns a connection manager for the given endpoint. The first
    /// connect attempt is issued immediately.
    pub fn connect(config: ClientConfig) -> Connection {
        let default_credentials = config.default_credentials.clone();
        let (manager, events) = ConnectionManager::new(config);
        tokio::spawn(manager.run());
        Connection {
            events,
            default_credentials,
            next_client_id: AtomicU64::new(1),
        }
    }

    /// Registers a local client and returns its handle together with the
    /// channel its replies arrive on.
    pub fn attach(&self) -> (ClientHandle, UnboundedReceiver<Reply>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ClientId(self.next_client_id.fetch_add(1, Ordering::Relaxed));
        (ClientHandle::new(id, tx), rx)
    }

    /// Sends a message under a fresh correlation id with the configured
    /// default credentials. Returns the correlation id.
    pub fn send(&self, client: &ClientHandle, message: Message) -> Uuid {
        self.send_package(
            client,
            PackageOut::new(message, self.default_credentials.clone()),
        )
    }

    /// Sends a message under a fresh correlation id with explicit
    /// credentials.
    pub fn send_with(
        &self,
        client: &ClientHandle,
        message: Message,
        credentials: Credentials,
    ) -> Uuid {
        self.send_package(client, PackageOut::new(message, Some(credentials)))
    }

    /// Submits a fully formed package.
    pub fn send_package(&self, client: &ClientHandle, package: PackageOut) -> Uuid {
        let correlation = package.correlation;
        let event = Event::Outgoing {
            client: client.clone(),
            package,
        };
        if self.events.send(event).is_err() {
            client.deliver(Err(CitrineError::ConnectionLost));
        }
        correlation
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.events.send(Event::Control(Control::Shutdown));
    }
}
