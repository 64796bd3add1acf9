//! Per-connection message dispatch.
//!
//! | session state  | Auth message  | Resource request |
//! |----------------|---------------|------------------|
//! | unauthorized   | auth handler  | ignored          |
//! | authorized     | ignored       | request handler  |
//!
//! Documents that are not a recognizable message are dropped.

use serde_json::Value;

use super::Arbiter;
use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::protocol::Inbound;

/// What the connection task should do after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Continue,
    Close,
}

impl Arbiter {
    /// Route one decoded JSON document from connection `id`.
    pub fn handle_frame(&self, id: ConnectionId, frame: &Value) -> Disposition {
        let halted = self.halted.read().expect("halt gate poisoned");
        if *halted {
            return Disposition::Close;
        }

        let message = match Inbound::from_value(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(connection_id = %id, error = %e, "Dropping unrecognized message");
                metrics::record_malformed("shape");
                return Disposition::Continue;
            }
        };

        let Some(session_user) = self.sessions.username(id) else {
            // Session already gone (stopped or evicted).
            return Disposition::Close;
        };

        match (message, session_user.is_some()) {
            (Inbound::Auth { username }, false) => self.handle_auth(id, &username),
            (Inbound::ResourceRequest(request), true) => self.handle_resource_request(id, &request),
            (Inbound::Auth { .. }, true) => {
                tracing::debug!(connection_id = %id, "Ignoring auth from authorized session");
                Disposition::Continue
            }
            (Inbound::ResourceRequest(_), false) => {
                tracing::debug!(connection_id = %id, "Ignoring resource request before auth");
                Disposition::Continue
            }
        }
    }
}
