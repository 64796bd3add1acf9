//! Authorization handshake.
//!
//! # Outcomes
//! - Reject-auth mode on: close, nothing else
//! - Name already live on another connection: close, no ban
//! - Name on the allow-list: session bound to it
//! - Anything else: peer address banned for the rest of the run, close
//!
//! No failure reply is ever written; closing the stream is the only signal.

use super::sessions::AuthOutcome;
use super::{Arbiter, Disposition, ServerEvent};
use crate::net::connection::ConnectionId;
use crate::observability::metrics;

impl Arbiter {
    /// Handle `{"username": ...}` from a session that is not yet authorized.
    pub fn handle_auth(&self, id: ConnectionId, username: &str) -> Disposition {
        if self.rejects_auth() {
            tracing::info!(connection_id = %id, username, "Auth rejected: reject mode active");
            metrics::record_auth("reject_mode");
            return Disposition::Close;
        }

        let settings = self.settings.load();
        let outcome = self
            .sessions
            .authorize(id, username, |name| settings.is_permitted(name));

        match outcome {
            AuthOutcome::Authorized => {
                tracing::info!(connection_id = %id, username, "User authorized");
                metrics::record_auth("authorized");
                self.events.emit(ServerEvent::UsersChanged);
                Disposition::Continue
            }
            AuthOutcome::Duplicate => {
                tracing::warn!(connection_id = %id, username, "Auth rejected: user already connected");
                metrics::record_auth("duplicate");
                Disposition::Close
            }
            AuthOutcome::NotPermitted => {
                if let Some(addr) = self.sessions.remote_addr(id) {
                    if self.bans.ban(addr.ip()) {
                        tracing::warn!(
                            connection_id = %id,
                            username,
                            peer_addr = %addr,
                            "Unknown user, address banned"
                        );
                        metrics::record_banned_addresses(self.bans.len());
                    }
                }
                metrics::record_auth("banned");
                Disposition::Close
            }
            AuthOutcome::UnknownConnection => Disposition::Close,
        }
    }
}
