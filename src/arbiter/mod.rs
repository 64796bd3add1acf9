//! Resource arbitration core.
//!
//! # Data Flow
//! ```text
//! Accepted peer
//!     → admission.rs (client limit, ban list)
//!     → sessions.rs (new unauthenticated session)
//!
//! Inbound JSON document
//!     → router.rs (classify by shape and session state)
//!     → auth.rs (allow-list, duplicate check, ban)
//!     → request.rs (per-slot claim, lease, eviction notice)
//!     → replies queued on the connection's outbox
//!
//! Every table mutation
//!     → events.rs (UsersChanged | ResourcesChanged)
//! ```
//!
//! # Design Decisions
//! - Handlers never block or await; replies go onto unbounded outboxes
//! - Rejections are silent: a closed connection is the only signal
//! - Disconnecting does not free resources; leases run out on their own

pub mod admission;
pub mod auth;
pub mod bans;
pub mod events;
pub mod request;
pub mod resources;
pub mod router;
pub mod sessions;

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use tokio::sync::broadcast;

use crate::config::validation::{clamp_client_limit, normalize_z_time};
use crate::config::ArbiterConfig;
use crate::net::connection::ConnectionId;
use crate::observability::metrics;
use crate::protocol::Response;

pub use admission::{AdmissionError, Admitted};
pub use bans::BanList;
pub use events::{EventBus, ServerEvent};
pub use resources::{ResourceTable, SlotInfo, RESOURCE_COUNT};
pub use router::Disposition;
pub use sessions::{Outbound, SessionInfo, SessionTable};

/// Runtime-adjustable arbitration settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub client_limit: usize,
    pub permitted_users: Vec<String>,
    pub z_time: Duration,
}

impl Settings {
    pub fn from_config(config: &ArbiterConfig) -> Self {
        Self {
            client_limit: clamp_client_limit(config.listener.client_limit),
            permitted_users: config.auth.permitted_users.clone(),
            z_time: normalize_z_time(config.leases.z_time_ms),
        }
    }

    pub fn is_permitted(&self, username: &str) -> bool {
        self.permitted_users.iter().any(|u| u == username)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_config(&ArbiterConfig::default())
    }
}

/// Shared arbitration state: sessions, slots, bans and settings.
///
/// All mutation of the session and resource tables goes through the
/// handlers on this type.
#[derive(Debug)]
pub struct Arbiter {
    settings: ArcSwap<Settings>,
    sessions: SessionTable,
    resources: ResourceTable,
    bans: BanList,
    events: EventBus,
    reject_auth: AtomicBool,
    reject_requests: AtomicBool,
    /// Set while the server is stopping. Message handling holds the read
    /// side, so taking the write side waits out in-flight messages.
    halted: RwLock<bool>,
}

impl Arbiter {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: ArcSwap::from_pointee(settings),
            sessions: SessionTable::new(),
            resources: ResourceTable::new(),
            bans: BanList::new(),
            events: EventBus::default(),
            reject_auth: AtomicBool::new(false),
            reject_requests: AtomicBool::new(false),
            halted: RwLock::new(false),
        }
    }

    pub fn from_config(config: &ArbiterConfig) -> Self {
        Self::new(Settings::from_config(config))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    /// Set the client limit, clamped to the absolute maximum.
    /// Live sessions above a lowered limit are not dropped.
    pub fn set_client_limit(&self, limit: i64) {
        let limit = clamp_client_limit(limit);
        self.settings.rcu(|current| Settings {
            client_limit: limit,
            ..Settings::clone(current)
        });
        tracing::info!(client_limit = limit, "Client limit updated");
    }

    pub fn client_limit(&self) -> usize {
        self.settings.load().client_limit
    }

    /// Replace the allow-list. Already authorized sessions keep their name.
    pub fn set_permitted_users(&self, users: Vec<String>) {
        let count = users.len();
        self.settings.rcu(|current| Settings {
            permitted_users: users.clone(),
            ..Settings::clone(current)
        });
        tracing::info!(permitted_users = count, "Permitted users updated");
    }

    pub fn permitted_users(&self) -> Vec<String> {
        self.settings.load().permitted_users.clone()
    }

    /// Set the lease duration in ms; negative values select the default.
    /// Applies to leases granted from now on.
    pub fn set_z_time(&self, ms: i64) {
        let z_time = normalize_z_time(ms);
        self.settings.rcu(|current| Settings {
            z_time,
            ..Settings::clone(current)
        });
        tracing::info!(z_time_ms = z_time.as_millis() as u64, "Lease duration updated");
    }

    pub fn z_time(&self) -> Duration {
        self.settings.load().z_time
    }

    pub fn set_reject_auth(&self, reject: bool) {
        self.reject_auth.store(reject, Ordering::SeqCst);
        tracing::info!(reject, "Reject-auth mode changed");
    }

    pub fn rejects_auth(&self) -> bool {
        self.reject_auth.load(Ordering::SeqCst)
    }

    pub fn set_reject_requests(&self, reject: bool) {
        self.reject_requests.store(reject, Ordering::SeqCst);
        tracing::info!(reject, "Reject-resource-requests mode changed");
    }

    pub fn rejects_requests(&self) -> bool {
        self.reject_requests.load(Ordering::SeqCst)
    }

    /// Stop handling client messages. Returns once no message is being
    /// handled; later messages close their connection.
    pub fn halt(&self) {
        *self.halted.write().expect("halt gate poisoned") = true;
        tracing::debug!("Message handling halted");
    }

    /// Resume handling client messages after [`halt`](Self::halt).
    pub fn resume(&self) {
        *self.halted.write().expect("halt gate poisoned") = false;
    }

    pub fn is_halted(&self) -> bool {
        *self.halted.read().expect("halt gate poisoned")
    }

    /// Free every slot, telling live owners they were evicted.
    pub fn free_all(&self) {
        let freed = self.resources.free_all_with(|index, owner| {
            if self.sessions.send_to_user(owner, Response::evicted(owner, index)) {
                metrics::record_resource_response(crate::protocol::Status::Evicted);
            }
        });
        tracing::info!(freed = freed.len(), "All resources freed");
        self.events.emit(ServerEvent::ResourcesChanged);
    }

    /// Forget a closed connection. Owned slots are left alone.
    pub fn disconnect(&self, id: ConnectionId) {
        if self.sessions.remove(id) {
            tracing::debug!(connection_id = %id, "Session removed");
            metrics::record_active_sessions(self.sessions.len());
            self.events.emit(ServerEvent::UsersChanged);
        }
    }

    /// Close every connection and empty the session table.
    pub fn close_all_sessions(&self) {
        let closed = self.sessions.close_all();
        if closed > 0 {
            tracing::info!(closed, "All sessions closed");
            metrics::record_active_sessions(0);
            self.events.emit(ServerEvent::UsersChanged);
        }
    }

    pub fn clear_bans(&self) {
        self.bans.clear();
        metrics::record_banned_addresses(0);
    }

    pub fn resource_owners(&self) -> [Option<String>; RESOURCE_COUNT] {
        self.resources.owners()
    }

    pub fn resource_snapshot(&self) -> Vec<SlotInfo> {
        self.resources.snapshot()
    }

    pub fn resource_times(&self) -> HashMap<String, SystemTime> {
        self.resources.acquisition_times()
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions.snapshot()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn banned_addresses(&self) -> Vec<IpAddr> {
        self.bans.snapshot()
    }

    pub fn is_banned(&self, addr: &IpAddr) -> bool {
        self.bans.is_banned(addr)
    }
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
