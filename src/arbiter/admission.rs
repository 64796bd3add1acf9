//! Connection admission.
//!
//! # Responsibilities
//! - Reject peers once the client limit is reached
//! - Reject banned addresses
//! - Register admitted peers as unauthenticated sessions
//!
//! # Design Decisions
//! - The limit is checked before the ban list
//! - Rejected peers get no payload; the listener just drops the stream

use std::net::{IpAddr, SocketAddr};

use thiserror::Error;
use tokio::sync::mpsc;

use super::{Arbiter, Outbound, ServerEvent};
use crate::net::connection::ConnectionId;
use crate::observability::metrics;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("client limit of {limit} reached")]
    CapacityExceeded { limit: usize },

    #[error("address {0} is banned")]
    Banned(IpAddr),
}

impl AdmissionError {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdmissionError::CapacityExceeded { .. } => "capacity",
            AdmissionError::Banned(_) => "banned",
        }
    }
}

/// An admitted connection: its id and the queue its writer drains.
#[derive(Debug)]
pub struct Admitted {
    pub id: ConnectionId,
    pub outbox: mpsc::UnboundedReceiver<Outbound>,
}

impl Arbiter {
    /// Decide whether a freshly accepted peer may open a session.
    pub fn admit(&self, remote_addr: SocketAddr) -> Result<Admitted, AdmissionError> {
        let limit = self.client_limit();

        let result = if self.sessions.len() >= limit {
            Err(AdmissionError::CapacityExceeded { limit })
        } else if self.bans.is_banned(&remote_addr.ip()) {
            Err(AdmissionError::Banned(remote_addr.ip()))
        } else {
            let (tx, rx) = mpsc::unbounded_channel();
            let id = ConnectionId::new();
            if self.sessions.try_insert(id, remote_addr, tx, limit) {
                Ok(Admitted { id, outbox: rx })
            } else {
                // Lost a race with another admission.
                Err(AdmissionError::CapacityExceeded { limit })
            }
        };

        match &result {
            Ok(admitted) => {
                tracing::info!(
                    connection_id = %admitted.id,
                    peer_addr = %remote_addr,
                    "Connection admitted"
                );
                metrics::record_admission("accepted");
                metrics::record_active_sessions(self.sessions.len());
                self.events.emit(ServerEvent::UsersChanged);
            }
            Err(reason) => {
                tracing::info!(peer_addr = %remote_addr, reason = %reason, "Connection rejected");
                metrics::record_admission(reason.as_str());
            }
        }

        result
    }
}
