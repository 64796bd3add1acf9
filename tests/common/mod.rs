//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use resource_arbiter::{ArbiterConfig, ResourceServer};

pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Start a server on an ephemeral loopback port.
pub async fn start_server(
    users: &[&str],
    client_limit: i64,
    z_time_ms: i64,
) -> (Arc<ResourceServer>, SocketAddr) {
    let mut config = ArbiterConfig::default();
    config.listener.bind_host = "127.0.0.1".into();
    config.listener.port = 0;
    config.listener.client_limit = client_limit;
    config.leases.z_time_ms = z_time_ms;
    config.auth.permitted_users = users.iter().map(|u| u.to_string()).collect();

    let server = Arc::new(ResourceServer::new(&config));
    let addr = server.start().await.expect("server failed to start");
    (server, addr)
}

/// Poll `condition` until it holds or the receive timeout elapses.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + RECV_TIMEOUT;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not reached in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Line-oriented JSON client.
pub struct TestClient {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl TestClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect failed");
        let (reader, writer) = stream.into_split();
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Connect and wait until the server has admitted the session.
    pub async fn connect_admitted(server: &ResourceServer, addr: SocketAddr) -> Self {
        let before = server.sessions().len();
        let client = Self::connect(addr).await;
        wait_until(|| server.sessions().len() > before).await;
        client
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).await.expect("write failed");
    }

    pub async fn send_json(&mut self, value: &Value) {
        let bytes = serde_json::to_vec(value).expect("encode failed");
        self.send_raw(&bytes).await;
    }

    pub async fn auth(&mut self, username: &str) {
        self.send_json(&json!({ "username": username })).await;
    }

    /// Auth and wait until the server has bound the username.
    pub async fn login(&mut self, server: &ResourceServer, username: &str) {
        self.auth(username).await;
        wait_until(|| {
            server
                .sessions()
                .iter()
                .any(|s| s.username.as_deref() == Some(username))
        })
        .await;
    }

    pub async fn request(&mut self, username: &str, time_ms: i64, mask: u32) {
        self.send_json(&json!({ "username": username, "time": time_ms, "request": mask }))
            .await;
    }

    /// Next status message, or `None` if the server closed the connection.
    pub async fn recv(&mut self) -> Option<Value> {
        let mut line = String::new();
        let read = tokio::time::timeout(RECV_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for a message");
        match read {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(serde_json::from_str(line.trim_end()).expect("server sent invalid JSON")),
        }
    }

    pub async fn expect(&mut self, expected: Value) {
        assert_eq!(self.recv().await, Some(expected));
    }

    pub async fn expect_closed(&mut self) {
        assert_eq!(self.recv().await, None, "expected the server to close");
    }

    /// Assert nothing arrives within `window`.
    pub async fn expect_silence(&mut self, window: Duration) {
        let mut line = String::new();
        let read = tokio::time::timeout(window, self.reader.read_line(&mut line)).await;
        assert!(read.is_err(), "unexpected message: {line:?}");
    }
}

pub fn status(username: &str, resource: u8, status: u8) -> Value {
    json!({ "username": username, "resource": resource, "status": status })
}
