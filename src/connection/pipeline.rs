// src/connection/pipeline.rs

//! The framing adapter between the byte-level socket and the message-level
//! connection manager.

use crate::connection::manager::{Control, Event};
use crate::core::protocol::{PackageCodec, PackageOut};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, warn};

/// Owns the split socket halves inside two tasks: a reader that decodes
/// frames into the manager's mailbox and a writer that drains a bounded
/// outbound buffer onto the wire. Aborting the pipeline drops both halves,
/// which closes the socket.
#[derive(Debug)]
pub struct Pipeline {
    out_tx: mpsc::Sender<PackageOut>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Pipeline {
    pub fn start(socket: TcpStream, events: mpsc::UnboundedSender<Event>, capacity: usize) -> Self {
        let (read_half, write_half) = socket.into_split();
        let (out_tx, mut out_rx) = mpsc::channel::<PackageOut>(capacity);

        let reader = tokio::spawn({
            let events = events.clone();
            async move {
                let mut framed = FramedRead::new(read_half, PackageCodec);
                loop {
                    match framed.next().await {
                        Some(Ok(package)) => {
                            if events.send(Event::Incoming(package)).is_err() {
                                break;
                            }
                        }
                        Some(Err(e)) => {
                            let _ = events.send(Event::Control(Control::SocketError(e)));
                            break;
                        }
                        None => {
                            let _ = events.send(Event::Control(Control::PeerClosed));
                            break;
                        }
                    }
                }
            }
        });

        let writer = tokio::spawn(async move {
            let mut framed = FramedWrite::new(write_half, PackageCodec);
            while let Some(package) = out_rx.recv().await {
                if let Err(e) = framed.send(package).await {
                    warn!("pipeline write failed: {e}");
                    let _ = events.send(Event::Control(Control::PipelineFailed));
                    break;
                }
            }
        });

        Self {
            out_tx,
            reader,
            writer,
        }
    }

    /// Queues a package for transmission. A full buffer drops the package:
    /// the event loop must not block, and anything that matters is replayed
    /// on reconnect.
    pub fn send(&self, package: PackageOut) {
        match self.out_tx.try_send(package) {
            Ok(()) => {}
            Err(TrySendError::Full(package)) => {
                warn!(
                    command = package.message.name(),
                    "outbound pipeline buffer full, dropping package"
                );
            }
            Err(TrySendError::Closed(package)) => {
                debug!(
                    command = package.message.name(),
                    "pipeline already closed, dropping package"
                );
            }
        }
    }

    /// Tears the pipeline down, closing the socket.
    pub fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.abort();
    }
}
