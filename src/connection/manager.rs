// src/connection/manager.rs

//! The top-level connection state machine.
//!
//! The manager is a single-consumer event loop: every socket signal, timer
//! tick, inbound frame, outbound request and client death arrives as one
//! [`Event`] in its mailbox and is handled to completion before the next.
//! All mutation of the operation table and the heartbeat epoch happens
//! inside that loop, so none of it needs a lock.

use crate::config::ClientConfig;
use crate::connection::heartbeat::HeartbeatTimer;
use crate::connection::operations::{Operation, OperationTable};
use crate::connection::pipeline::Pipeline;
use crate::connection::retry::RetrySchedule;
use crate::connection::{ClientHandle, ClientId};
use crate::core::errors::CitrineError;
use crate::core::protocol::{Message, PackageIn, PackageOut};
use rand::Rng;
use std::collections::HashSet;
use std::mem;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

// Spread reconnect attempts out so that many clients do not stampede a
// recovering server in lockstep.
const MAX_RECONNECT_JITTER_MS: u64 = 500;

/// Everything the manager reacts to.
#[derive(Debug)]
pub enum Event {
    /// An outbound package submitted by a local client.
    Outgoing {
        client: ClientHandle,
        package: PackageOut,
    },
    /// A decoded package from the pipeline.
    Incoming(PackageIn),
    /// Socket, timer and lifecycle signals.
    Control(Control),
}

#[derive(Debug)]
pub enum Control {
    Connected(TcpStream),
    ConnectFailed,
    Retry,
    PeerClosed,
    SocketError(CitrineError),
    PipelineFailed,
    HeartbeatDue(u64),
    HeartbeatTimeout(u64),
    ClientTerminated(ClientId),
    Shutdown,
}

enum ConnectionState {
    /// Socket connect in flight; no pipeline yet.
    Connecting { ops: OperationTable },
    /// Session live.
    Connected {
        ops: OperationTable,
        pipeline: Pipeline,
        heartbeat: HeartbeatTimer,
    },
    /// Waiting out a backoff delay before the next connect attempt.
    Reconnecting {
        ops: OperationTable,
        retry: RetrySchedule,
    },
    /// Absorbing; reached when the reconnect budget is spent.
    Terminated,
}

impl ConnectionState {
    fn ops_and_pipeline(&mut self) -> (Option<&mut OperationTable>, Option<&Pipeline>) {
        match self {
            ConnectionState::Connecting { ops } => (Some(ops), None),
            ConnectionState::Connected { ops, pipeline, .. } => (Some(ops), Some(pipeline)),
            ConnectionState::Reconnecting { ops, .. } => (Some(ops), None),
            ConnectionState::Terminated => (None, None),
        }
    }
}

/// Drives the single TCP session: connects and reconnects with bounded
/// backoff, multiplexes operations over the session by correlation id, and
/// enforces liveness with heartbeat probes.
pub struct ConnectionManager {
    config: ClientConfig,
    events_tx: UnboundedSender<Event>,
    events_rx: UnboundedReceiver<Event>,
    state: ConnectionState,
    /// Monotone heartbeat epoch; timer events carrying an older value are
    /// stale and ignored.
    heartbeat_seq: u64,
    /// Clients already being watched for death. Watches survive reconnects.
    watched: HashSet<ClientId>,
}

impl ConnectionManager {
    pub fn new(config: ClientConfig) -> (Self, UnboundedSender<Event>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            config,
            events_tx: events_tx.clone(),
            events_rx,
            state: ConnectionState::Connecting {
                ops: OperationTable::default(),
            },
            heartbeat_seq: 0,
            watched: HashSet::new(),
        };
        (manager, events_tx)
    }

    /// The event loop. Runs until a `Shutdown` control arrives.
    pub async fn run(mut self) {
        self.spawn_connect();
        while let Some(event) = self.events_rx.recv().await {
            if !self.handle(event) {
                break;
            }
        }
    }

    fn handle(&mut self, event: Event) -> bool {
        match event {
            Event::Outgoing { client, package } => self.on_outgoing(client, package),
            Event::Incoming(package) => self.on_incoming(package),
            Event::Control(control) => match control {
                Control::Connected(socket) => self.on_socket_connected(socket),
                Control::ConnectFailed => self.on_connect_failed(),
                Control::Retry => self.on_retry(),
                Control::PeerClosed => self.on_session_lost("peer closed the connection"),
                Control::SocketError(e) => {
                    let reason = format!("socket error: {e}");
                    self.on_session_lost(&reason);
                }
                Control::PipelineFailed => self.on_session_lost("pipeline failed"),
                Control::HeartbeatDue(id) => self.on_heartbeat_due(id),
                Control::HeartbeatTimeout(id) => self.on_heartbeat_timeout(id),
                Control::ClientTerminated(client) => self.on_client_terminated(client),
                Control::Shutdown => {
                    self.on_shutdown();
                    return false;
                }
            },
        }
        true
    }

    /// Applies the claim rule to an outbound package: an existing operation
    /// under the package's correlation id, or one owned by the sender that
    /// claims the message, absorbs it; otherwise a fresh operation is
    /// created and (when a session is live) its package transmitted.
    fn on_outgoing(&mut self, client: ClientHandle, package: PackageOut) {
        if matches!(self.state, ConnectionState::Terminated) {
            client.deliver(Err(CitrineError::ConnectionLost));
            return;
        }
        self.watch_client(&client);
        let retries = self.config.operation_retries;

        let (ops, pipeline) = self.state.ops_and_pipeline();
        let Some(ops) = ops else {
            return;
        };

        let claimed = if ops.contains(&package.correlation) {
            Some(package.correlation)
        } else {
            ops.claiming(client.id(), &package.message)
        };

        if let Some(id) = claimed {
            if let Some(operation) = ops.take(&id) {
                let step = operation.apply_outgoing(package.message);
                if let Some(next) = step.operation {
                    ops.insert(next);
                }
                if let (Some(out), Some(pipeline)) = (step.send, pipeline) {
                    pipeline.send(out);
                }
            }
            return;
        }

        if let Some(pipeline) = pipeline {
            pipeline.send(package.clone());
        }
        ops.insert(Operation::from_package(package, client, retries));
    }

    fn on_incoming(&mut self, package: PackageIn) {
        let PackageIn {
            correlation,
            message,
        } = package;
        let ConnectionState::Connected {
            ops,
            pipeline,
            heartbeat,
        } = &mut self.state
        else {
            debug!("inbound package while not connected, ignoring");
            return;
        };

        // Server-initiated probes are answered in place. They prove the
        // pipeline is alive but are not treated as evidence for our own
        // probe cycle, so the heartbeat epoch is left untouched.
        match &message {
            Ok(Message::HeartbeatRequest) => {
                pipeline.send(PackageOut {
                    correlation,
                    message: Message::HeartbeatResponse,
                    credentials: None,
                });
                return;
            }
            Ok(Message::Ping { payload }) => {
                pipeline.send(PackageOut {
                    correlation,
                    message: Message::Pong {
                        payload: payload.clone(),
                    },
                    credentials: None,
                });
                return;
            }
            _ => {}
        }

        if let Some(operation) = ops.take(&correlation) {
            let step = operation.inspect_in(message);
            if let Some(next) = step.operation {
                ops.insert(next);
            }
            if let Some(out) = step.send {
                pipeline.send(out);
            }
        } else {
            match &message {
                // A confirmation nobody asked for would leave a zombie
                // subscription streaming at us; cut it off at the server.
                Ok(Message::SubscribeCompleted { .. }) => {
                    warn!(%correlation, "subscription confirmed for an unknown correlation id, unsubscribing");
                    pipeline.send(PackageOut {
                        correlation,
                        message: Message::Unsubscribe,
                        credentials: self.config.default_credentials.clone(),
                    });
                }
                Ok(Message::Pong { .. })
                | Ok(Message::HeartbeatResponse)
                | Ok(Message::UnsubscribeCompleted) => {
                    debug!(%correlation, "unsolicited response, dropping");
                }
                Ok(message) => {
                    warn!(%correlation, command = message.name(), "unsolicited message, dropping");
                }
                Err(e) => {
                    warn!(%correlation, "failure for an unknown correlation id: {e}");
                }
            }
        }

        // Any other inbound is fresh evidence of a live peer: restart the
        // heartbeat cycle under a new epoch.
        heartbeat.cancel();
        self.heartbeat_seq += 1;
        *heartbeat = HeartbeatTimer::arm(
            self.heartbeat_seq,
            self.config.heartbeat_interval(),
            self.config.heartbeat_timeout(),
            self.events_tx.clone(),
        );
    }

    fn on_socket_connected(&mut self, socket: TcpStream) {
        match mem::replace(&mut self.state, ConnectionState::Terminated) {
            ConnectionState::Connecting { ops } | ConnectionState::Reconnecting { ops, .. } => {
                info!("connected to {}", self.config.addr());
                if let Err(e) = socket.set_nodelay(true) {
                    debug!("failed to set TCP_NODELAY: {e}");
                }
                let pipeline = Pipeline::start(
                    socket,
                    self.events_tx.clone(),
                    self.config.pipeline_buffer,
                );
                let mut ops = ops;
                let mut table = OperationTable::default();
                for operation in ops.drain() {
                    let step = operation.connected();
                    if let Some(out) = step.send {
                        pipeline.send(out);
                    }
                    if let Some(next) = step.operation {
                        table.insert(next);
                    }
                }
                self.heartbeat_seq += 1;
                let heartbeat = HeartbeatTimer::arm(
                    self.heartbeat_seq,
                    self.config.heartbeat_interval(),
                    self.config.heartbeat_timeout(),
                    self.events_tx.clone(),
                );
                self.state = ConnectionState::Connected {
                    ops: table,
                    pipeline,
                    heartbeat,
                };
            }
            other => {
                debug!("socket connected in an unexpected state, dropping it");
                self.state = other;
            }
        }
    }

    fn on_connect_failed(&mut self) {
        match mem::replace(&mut self.state, ConnectionState::Terminated) {
            ConnectionState::Connecting { ops } => {
                warn!("connect to {} failed", self.config.addr());
                self.schedule_reconnect(ops, RetrySchedule::from_config(&self.config));
            }
            ConnectionState::Reconnecting { ops, retry } => {
                warn!("connect to {} failed", self.config.addr());
                self.schedule_reconnect(ops, retry);
            }
            other => {
                debug!("connect failure in an unexpected state, ignoring");
                self.state = other;
            }
        }
    }

    fn on_retry(&mut self) {
        if matches!(self.state, ConnectionState::Reconnecting { .. }) {
            self.spawn_connect();
        } else {
            debug!("retry timer fired in an unexpected state, ignoring");
        }
    }

    fn on_session_lost(&mut self, reason: &str) {
        match mem::replace(&mut self.state, ConnectionState::Terminated) {
            ConnectionState::Connected {
                ops,
                pipeline,
                heartbeat,
            } => {
                // Timers first, so nothing fires against the next state.
                heartbeat.cancel();
                pipeline.abort();
                warn!("session to {} lost: {reason}", self.config.addr());
                let mut ops = ops;
                let mut kept = OperationTable::default();
                for operation in ops.drain() {
                    if let Some(next) = operation.connection_lost() {
                        kept.insert(next);
                    }
                }
                self.schedule_reconnect(kept, RetrySchedule::from_config(&self.config));
            }
            other => {
                debug!("session-loss signal in an unexpected state ({reason}), ignoring");
                self.state = other;
            }
        }
    }

    fn on_heartbeat_due(&mut self, id: u64) {
        let ConnectionState::Connected {
            pipeline,
            heartbeat,
            ..
        } = &self.state
        else {
            return;
        };
        if heartbeat.id() != id {
            debug!("stale heartbeat-due event, ignoring");
            return;
        }
        pipeline.send(PackageOut {
            correlation: Uuid::new_v4(),
            message: Message::HeartbeatRequest,
            credentials: None,
        });
    }

    fn on_heartbeat_timeout(&mut self, id: u64) {
        let ConnectionState::Connected { heartbeat, .. } = &self.state else {
            return;
        };
        if heartbeat.id() != id {
            debug!("stale heartbeat-timeout event, ignoring");
            return;
        }
        let timeout = self.config.heartbeat_timeout();
        let reason = format!("no heartbeat within {timeout:?}");
        self.on_session_lost(&reason);
    }

    fn on_client_terminated(&mut self, client: ClientId) {
        self.watched.remove(&client);
        let (ops, pipeline) = self.state.ops_and_pipeline();
        let Some(ops) = ops else {
            return;
        };
        let operations = ops.take_client_operations(client);
        if operations.is_empty() {
            return;
        }
        info!(
            "{client} died with {} pending operations, cleaning up",
            operations.len()
        );
        for operation in operations {
            if let (Some(farewell), Some(pipeline)) = (operation.client_terminated(), pipeline) {
                pipeline.send(farewell);
            }
        }
    }

    fn on_shutdown(&mut self) {
        info!("connection manager shutting down");
        match mem::replace(&mut self.state, ConnectionState::Terminated) {
            ConnectionState::Connected {
                ops,
                pipeline,
                heartbeat,
            } => {
                heartbeat.cancel();
                pipeline.abort();
                self.terminate(ops);
            }
            ConnectionState::Connecting { ops } | ConnectionState::Reconnecting { ops, .. } => {
                self.terminate(ops);
            }
            ConnectionState::Terminated => {}
        }
    }

    fn schedule_reconnect(&mut self, ops: OperationTable, mut retry: RetrySchedule) {
        match retry.next() {
            Some(delay) => {
                info!(
                    "next connect attempt in ~{:?}, {} left afterwards",
                    delay,
                    retry.remaining()
                );
                self.spawn_retry(delay);
                self.state = ConnectionState::Reconnecting { ops, retry };
            }
            None => {
                error!(
                    "reconnect budget for {} exhausted, terminating",
                    self.config.addr()
                );
                self.terminate(ops);
            }
        }
    }

    /// Fails every remaining operation with `ConnectionLost` and parks the
    /// manager in its absorbing state.
    fn terminate(&mut self, mut ops: OperationTable) {
        for operation in ops.drain() {
            operation.client().deliver(Err(CitrineError::ConnectionLost));
        }
        self.state = ConnectionState::Terminated;
    }

    fn watch_client(&mut self, client: &ClientHandle) {
        if !self.watched.insert(client.id()) {
            return;
        }
        let events = self.events_tx.clone();
        let client = client.clone();
        tokio::spawn(async move {
            client.closed().await;
            let _ = events.send(Event::Control(Control::ClientTerminated(client.id())));
        });
    }

    fn spawn_connect(&self) {
        let addr = self.config.addr();
        let timeout = self.config.connect_timeout();
        let events = self.events_tx.clone();
        debug!("connecting to {addr}");
        tokio::spawn(async move {
            let control = match time::timeout(timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(socket)) => Control::Connected(socket),
                Ok(Err(e)) => {
                    debug!("connect to {addr} failed: {e}");
                    Control::ConnectFailed
                }
                Err(_) => {
                    debug!("connect to {addr} timed out");
                    Control::ConnectFailed
                }
            };
            let _ = events.send(Event::Control(control));
        });
    }

    fn spawn_retry(&self, delay: Duration) {
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..MAX_RECONNECT_JITTER_MS));
        let wait = delay + jitter;
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            time::sleep(wait).await;
            let _ = events.send(Event::Control(Control::Retry));
        });
    }
}
