//! Per-connection task.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and session keys
//! - Feed inbound bytes through the frame decoder into the arbiter
//! - Drain the session's outbox onto the socket
//! - Report the disconnect to the arbiter exactly once on exit

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;

use crate::arbiter::{Arbiter, Disposition, Outbound};
use crate::observability::metrics;
use crate::protocol::{FrameDecoder, FrameError};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

const READ_BUFFER_SIZE: usize = 4096;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Drive one admitted connection until either side closes it.
pub async fn serve_connection(
    arbiter: Arc<Arbiter>,
    id: ConnectionId,
    stream: TcpStream,
    mut outbox: mpsc::UnboundedReceiver<Outbound>,
    max_frame_bytes: usize,
) {
    let (mut reader, mut writer) = stream.into_split();
    let mut decoder = FrameDecoder::new(max_frame_bytes);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        tokio::select! {
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    tracing::debug!(connection_id = %id, "Peer closed connection");
                    break;
                }
                Ok(n) => {
                    decoder.push(&buf[..n]);
                    if dispatch_frames(&arbiter, id, &mut decoder) == Disposition::Close {
                        tracing::debug!(connection_id = %id, "Closing connection");
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(connection_id = %id, error = %e, "Read failed");
                    break;
                }
            },
            outbound = outbox.recv() => match outbound {
                Some(Outbound::Message(response)) => {
                    let bytes = match response.encode() {
                        Ok(bytes) => bytes,
                        Err(e) => {
                            tracing::error!(connection_id = %id, error = %e, "Failed to encode response");
                            continue;
                        }
                    };
                    if let Err(e) = writer.write_all(&bytes).await {
                        tracing::debug!(connection_id = %id, error = %e, "Write failed");
                        break;
                    }
                }
                Some(Outbound::Close) | None => break,
            },
        }
    }

    let _ = writer.shutdown().await;
    arbiter.disconnect(id);
    tracing::trace!(connection_id = %id, "Connection closed");
}

/// Hand every complete document to the arbiter. Stops early on `Close`.
fn dispatch_frames(arbiter: &Arbiter, id: ConnectionId, decoder: &mut FrameDecoder) -> Disposition {
    while let Some(frame) = decoder.next_frame() {
        match frame {
            Ok(value) => {
                if arbiter.handle_frame(id, &value) == Disposition::Close {
                    return Disposition::Close;
                }
            }
            Err(FrameError::Malformed(e)) => {
                tracing::debug!(connection_id = %id, error = %e, "Dropping malformed JSON");
                metrics::record_malformed("json");
            }
            Err(FrameError::Oversized(size)) => {
                tracing::warn!(connection_id = %id, size, "Dropping oversized partial message");
                metrics::record_malformed("oversized");
            }
        }
    }
    Disposition::Continue
}
