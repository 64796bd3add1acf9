//! TCP listener and accept loop.
//!
//! # Responsibilities
//! - Bind to the configured host and port
//! - Accept incoming TCP connections
//! - Run admission before any session exists; drop rejected streams
//! - Spawn a connection task per admitted peer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::arbiter::Arbiter;
use crate::net::connection::serve_connection;

/// Pause after a failed accept so a persistent error cannot spin the loop.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Error type for listener operations.
#[derive(Debug)]
pub enum ListenerError {
    /// Failed to bind to address.
    Bind(std::io::Error),
    /// Failed to accept connection.
    Accept(std::io::Error),
}

impl std::fmt::Display for ListenerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListenerError::Bind(e) => write!(f, "Failed to bind: {}", e),
            ListenerError::Accept(e) => write!(f, "Failed to accept: {}", e),
        }
    }
}

impl std::error::Error for ListenerError {}

/// A bound listener feeding peers to the arbiter.
pub struct Listener {
    inner: TcpListener,
    arbiter: Arc<Arbiter>,
    max_frame_bytes: usize,
}

impl Listener {
    /// Bind `host:port`. Port 0 lets the OS pick a free port.
    pub async fn bind(
        host: &str,
        port: u16,
        arbiter: Arc<Arbiter>,
        max_frame_bytes: usize,
    ) -> Result<Self, ListenerError> {
        let inner = TcpListener::bind((host, port))
            .await
            .map_err(ListenerError::Bind)?;

        let local_addr = inner.local_addr().map_err(ListenerError::Bind)?;

        tracing::info!(
            address = %local_addr,
            client_limit = arbiter.client_limit(),
            "Listener bound"
        );

        Ok(Self {
            inner,
            arbiter,
            max_frame_bytes,
        })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, std::io::Error> {
        self.inner.local_addr()
    }

    /// Accept until `shutdown` fires.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            tokio::select! {
                accepted = self.inner.accept() => match accepted {
                    Ok((stream, peer_addr)) => self.admit(stream, peer_addr),
                    Err(e) => {
                        let err = ListenerError::Accept(e);
                        tracing::warn!(error = %err, "Accept failed");
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
                _ = shutdown.recv() => {
                    tracing::info!("Listener received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }

    fn admit(&self, stream: tokio::net::TcpStream, peer_addr: SocketAddr) {
        match self.arbiter.admit(peer_addr) {
            Ok(admitted) => {
                let arbiter = Arc::clone(&self.arbiter);
                let max_frame_bytes = self.max_frame_bytes;
                tokio::spawn(serve_connection(
                    arbiter,
                    admitted.id,
                    stream,
                    admitted.outbox,
                    max_frame_bytes,
                ));
            }
            Err(_) => {
                // Silent close: dropping the stream is the whole reply.
                drop(stream);
            }
        }
    }
}
