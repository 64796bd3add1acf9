//! Session table.
//!
//! # Responsibilities
//! - Map live connections to their (possibly not yet known) username
//! - Enforce the client limit atomically at admission
//! - Enforce at most one live session per username
//! - Hold each connection's outbound channel
//!
//! # Design Decisions
//! - One mutex guards the whole table: admission and authorization are
//!   check-then-act and must not interleave
//! - Sending on an outbox never blocks, so it is safe under the lock

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::SystemTime;

use serde::Serialize;
use tokio::sync::mpsc;

use crate::net::connection::ConnectionId;
use crate::protocol::Response;

/// Instruction for a connection's writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Message(Response),
    Close,
}

pub type Outbox = mpsc::UnboundedSender<Outbound>;

#[derive(Debug)]
struct Session {
    remote_addr: SocketAddr,
    username: Option<String>,
    last_hold_hint_ms: Option<i64>,
    connected_at: SystemTime,
    outbox: Outbox,
}

/// Point-in-time view of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub connection_id: u64,
    pub remote_addr: SocketAddr,
    pub username: Option<String>,
    pub last_hold_hint_ms: Option<i64>,
    pub connected_at: SystemTime,
}

/// Result of trying to bind a username to a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Authorized,
    /// Another live session already uses the name.
    Duplicate,
    /// The name is not on the allow-list.
    NotPermitted,
    /// The connection has no session (already gone).
    UnknownConnection,
}

#[derive(Debug, Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<ConnectionId, Session>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an unauthenticated session unless `limit` sessions are live.
    pub fn try_insert(
        &self,
        id: ConnectionId,
        remote_addr: SocketAddr,
        outbox: Outbox,
        limit: usize,
    ) -> bool {
        let mut sessions = self.inner.lock().expect("session table mutex poisoned");
        if sessions.len() >= limit {
            return false;
        }
        sessions.insert(
            id,
            Session {
                remote_addr,
                username: None,
                last_hold_hint_ms: None,
                connected_at: SystemTime::now(),
                outbox,
            },
        );
        true
    }

    /// Bind `username` to the session if no other live session has it and
    /// `is_permitted` accepts it. Duplicates are checked first.
    pub fn authorize(
        &self,
        id: ConnectionId,
        username: &str,
        is_permitted: impl FnOnce(&str) -> bool,
    ) -> AuthOutcome {
        let mut sessions = self.inner.lock().expect("session table mutex poisoned");
        if !sessions.contains_key(&id) {
            return AuthOutcome::UnknownConnection;
        }
        if sessions
            .values()
            .any(|s| s.username.as_deref() == Some(username))
        {
            return AuthOutcome::Duplicate;
        }
        if !is_permitted(username) {
            return AuthOutcome::NotPermitted;
        }
        if let Some(session) = sessions.get_mut(&id) {
            session.username = Some(username.to_string());
        }
        AuthOutcome::Authorized
    }

    pub fn remove(&self, id: ConnectionId) -> bool {
        self.inner
            .lock()
            .expect("session table mutex poisoned")
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("session table mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `Some(None)` for a live but unauthenticated session.
    pub fn username(&self, id: ConnectionId) -> Option<Option<String>> {
        self.inner
            .lock()
            .expect("session table mutex poisoned")
            .get(&id)
            .map(|s| s.username.clone())
    }

    pub fn remote_addr(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.inner
            .lock()
            .expect("session table mutex poisoned")
            .get(&id)
            .map(|s| s.remote_addr)
    }

    pub fn record_hold_hint(&self, id: ConnectionId, hint_ms: i64) {
        if let Some(session) = self
            .inner
            .lock()
            .expect("session table mutex poisoned")
            .get_mut(&id)
        {
            session.last_hold_hint_ms = Some(hint_ms);
        }
    }

    /// Queue a message for a connection. Returns `false` if it is gone.
    pub fn send_to(&self, id: ConnectionId, response: Response) -> bool {
        let sessions = self.inner.lock().expect("session table mutex poisoned");
        match sessions.get(&id) {
            Some(session) => session.outbox.send(Outbound::Message(response)).is_ok(),
            None => false,
        }
    }

    /// Queue a message for whichever live session is authorized as
    /// `username`. Returns `false` if that user is not connected.
    pub fn send_to_user(&self, username: &str, response: Response) -> bool {
        let sessions = self.inner.lock().expect("session table mutex poisoned");
        sessions
            .values()
            .find(|s| s.username.as_deref() == Some(username))
            .map(|s| s.outbox.send(Outbound::Message(response)).is_ok())
            .unwrap_or(false)
    }

    /// Tell every connection to close and empty the table.
    /// Returns how many sessions were dropped.
    pub fn close_all(&self) -> usize {
        let mut sessions = self.inner.lock().expect("session table mutex poisoned");
        for session in sessions.values() {
            let _ = session.outbox.send(Outbound::Close);
        }
        let closed = sessions.len();
        sessions.clear();
        closed
    }

    pub fn snapshot(&self) -> Vec<SessionInfo> {
        let sessions = self.inner.lock().expect("session table mutex poisoned");
        let mut infos: Vec<SessionInfo> = sessions
            .iter()
            .map(|(id, s)| SessionInfo {
                connection_id: id.as_u64(),
                remote_addr: s.remote_addr,
                username: s.username.clone(),
                last_hold_hint_ms: s.last_hold_hint_ms,
                connected_at: s.connected_at,
            })
            .collect();
        infos.sort_by_key(|info| info.connection_id);
        infos
    }
}
