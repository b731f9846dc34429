// tests/integration/test_helpers.rs

//! A scripted CitrineDB server for driving the connection core end-to-end.

use citrine_client::config::ClientConfig;
use citrine_client::core::protocol::{Message, PackageCodec, PackageOut};
use futures::{SinkExt, StreamExt};
use std::sync::Once;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing_subscriber::filter::EnvFilter;
use uuid::Uuid;

/// Upper bound for anything a test waits on.
pub const WAIT: Duration = Duration::from_secs(5);

static TRACING: Once = Once::new();

/// Wires up test logging once per test binary. Quiet by default; set
/// `RUST_LOG` to see the connection manager's lifecycle when a test fails.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .compact()
            .with_test_writer()
            .try_init();
    });
}

/// Test timings: fast reconnects, heartbeats effectively disabled so they
/// never interleave with scripted traffic. Heartbeat tests override them.
pub fn test_config(port: u16) -> ClientConfig {
    init_tracing();
    ClientConfig {
        host: "127.0.0.1".into(),
        port,
        connect_timeout_ms: 1_000,
        max_reconnections: 3,
        reconnection_delay_min_ms: 10,
        reconnection_delay_max_ms: 40,
        heartbeat_interval_ms: 60_000,
        heartbeat_timeout_ms: 60_000,
        operation_retries: 3,
        pipeline_buffer: 64,
        default_credentials: None,
    }
}

pub struct FakeServer {
    listener: TcpListener,
}

impl FakeServer {
    pub async fn bind() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        Self { listener }
    }

    pub fn port(&self) -> u16 {
        self.listener.local_addr().unwrap().port()
    }

    pub fn config(&self) -> ClientConfig {
        test_config(self.port())
    }

    pub async fn accept(&self) -> ServerSession {
        let (stream, _) = tokio::time::timeout(WAIT, self.listener.accept())
            .await
            .expect("timed out waiting for a connection")
            .unwrap();
        ServerSession {
            framed: Framed::new(stream, PackageCodec),
        }
    }

    /// Asserts that no client dials in within `wait`.
    pub async fn expect_no_connection(&self, wait: Duration) {
        assert!(
            tokio::time::timeout(wait, self.listener.accept())
                .await
                .is_err(),
            "unexpected new connection"
        );
    }
}

pub struct ServerSession {
    framed: Framed<TcpStream, PackageCodec>,
}

impl ServerSession {
    /// Receives the next package, failing the test on timeout, close, or an
    /// undecodable frame.
    pub async fn recv(&mut self) -> (Uuid, Message) {
        let package = tokio::time::timeout(WAIT, self.framed.next())
            .await
            .expect("timed out waiting for a package")
            .expect("connection closed by the client")
            .expect("frame error");
        (
            package.correlation,
            package.message.expect("undecodable package"),
        )
    }

    pub async fn send(&mut self, correlation: Uuid, message: Message) {
        self.framed
            .send(PackageOut {
                correlation,
                message,
                credentials: None,
            })
            .await
            .unwrap();
    }

    /// Writes raw bytes straight onto the socket, bypassing the codec.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        let stream = self.framed.get_mut();
        stream.write_all(bytes).await.unwrap();
        stream.flush().await.unwrap();
    }
}
