//! Operator-facing server.
//!
//! `ResourceServer` wraps the arbiter with a listener lifecycle and exposes
//! the full control surface: start/stop, settings, reject toggles, queries
//! and change notifications. None of this is reachable from the client
//! protocol.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::arbiter::{Arbiter, ServerEvent, SessionInfo, SlotInfo, RESOURCE_COUNT};
use crate::config::validation::normalize_port;
use crate::config::ArbiterConfig;
use crate::lifecycle::Shutdown;
use crate::net::listener::{Listener, ListenerError};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),

    #[error("server is already running")]
    AlreadyRunning,
}

struct Running {
    shutdown: Shutdown,
    local_addr: SocketAddr,
    accept_task: JoinHandle<()>,
}

/// The resource arbitration service.
pub struct ResourceServer {
    arbiter: Arc<Arbiter>,
    bind_host: String,
    port: AtomicU16,
    max_frame_bytes: usize,
    running: Mutex<Option<Running>>,
}

impl ResourceServer {
    /// Create a stopped server from configuration.
    pub fn new(config: &ArbiterConfig) -> Self {
        Self {
            arbiter: Arc::new(Arbiter::from_config(config)),
            bind_host: config.listener.bind_host.clone(),
            port: AtomicU16::new(normalize_port(config.listener.port)),
            max_frame_bytes: config.listener.max_frame_bytes,
            running: Mutex::new(None),
        }
    }

    /// Bind the listener and start accepting clients.
    ///
    /// Returns the bound address (useful when the port is 0). On bind
    /// failure the server stays stopped.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        if self.is_running() {
            return Err(ServerError::AlreadyRunning);
        }

        let port = self.port();
        let listener = match Listener::bind(
            &self.bind_host,
            port,
            Arc::clone(&self.arbiter),
            self.max_frame_bytes,
        )
        .await
        {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(host = %self.bind_host, port, error = %e, "Server failed to start");
                return Err(e.into());
            }
        };
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        let mut running = self.running.lock().expect("server state mutex poisoned");
        if running.is_some() {
            return Err(ServerError::AlreadyRunning);
        }
        self.arbiter.resume();
        let shutdown = Shutdown::new();
        let accept_task = tokio::spawn(listener.run(shutdown.subscribe()));
        *running = Some(Running {
            shutdown,
            local_addr,
            accept_task,
        });

        tracing::info!(address = %local_addr, "Resource server started");
        Ok(local_addr)
    }

    /// Stop accepting, free every resource, close every connection and
    /// clear the ban list.
    pub async fn stop(&self) {
        let running = self.running.lock().expect("server state mutex poisoned").take();
        if let Some(running) = running {
            let notified = running.shutdown.trigger();
            tracing::debug!(notified, "Shutdown signalled to accept loop");
            if let Err(e) = running.accept_task.await {
                tracing::warn!(error = %e, "Accept loop ended abnormally");
            }
        }

        // No message may claim a slot between free-all and the close.
        self.arbiter.halt();
        self.arbiter.free_all();
        self.arbiter.close_all_sessions();
        self.arbiter.clear_bans();
        tracing::info!("Resource server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .expect("server state mutex poisoned")
            .is_some()
    }

    /// Address the listener is bound to while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.running
            .lock()
            .expect("server state mutex poisoned")
            .as_ref()
            .map(|r| r.local_addr)
    }

    /// Set the listening port; invalid ports become 0. Takes effect on the
    /// next start.
    pub fn set_port(&self, port: i64) {
        self.port.store(normalize_port(port), Ordering::SeqCst);
    }

    pub fn port(&self) -> u16 {
        self.port.load(Ordering::SeqCst)
    }

    pub fn set_client_limit(&self, limit: i64) {
        self.arbiter.set_client_limit(limit);
    }

    pub fn client_limit(&self) -> usize {
        self.arbiter.client_limit()
    }

    pub fn set_permitted_users(&self, users: Vec<String>) {
        self.arbiter.set_permitted_users(users);
    }

    pub fn permitted_users(&self) -> Vec<String> {
        self.arbiter.permitted_users()
    }

    pub fn set_z_time(&self, ms: i64) {
        self.arbiter.set_z_time(ms);
    }

    pub fn z_time(&self) -> Duration {
        self.arbiter.z_time()
    }

    /// Apply the runtime-adjustable parts of a (re)loaded configuration.
    pub fn apply_config(&self, config: &ArbiterConfig) {
        self.set_port(config.listener.port);
        self.set_client_limit(config.listener.client_limit);
        self.set_permitted_users(config.auth.permitted_users.clone());
        self.set_z_time(config.leases.z_time_ms);
    }

    pub fn free_resources(&self) {
        self.arbiter.free_all();
    }

    pub fn reject_auth_requests(&self, reject: bool) {
        self.arbiter.set_reject_auth(reject);
    }

    pub fn rejects_auth_requests(&self) -> bool {
        self.arbiter.rejects_auth()
    }

    pub fn reject_resource_requests(&self, reject: bool) {
        self.arbiter.set_reject_requests(reject);
    }

    pub fn rejects_resource_requests(&self) -> bool {
        self.arbiter.rejects_requests()
    }

    pub fn resources(&self) -> [Option<String>; RESOURCE_COUNT] {
        self.arbiter.resource_owners()
    }

    pub fn resource_snapshot(&self) -> Vec<SlotInfo> {
        self.arbiter.resource_snapshot()
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.arbiter.sessions()
    }

    pub fn resource_times(&self) -> HashMap<String, SystemTime> {
        self.arbiter.resource_times()
    }

    pub fn banned_addresses(&self) -> Vec<IpAddr> {
        self.arbiter.banned_addresses()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.arbiter.subscribe()
    }

    pub fn arbiter(&self) -> &Arc<Arbiter> {
        &self.arbiter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_config() -> ArbiterConfig {
        let mut config = ArbiterConfig::default();
        config.listener.bind_host = "127.0.0.1".into();
        config.auth.permitted_users = vec!["alice".into()];
        config
    }

    #[tokio::test]
    async fn start_and_stop() {
        let server = ResourceServer::new(&local_config());
        assert!(!server.is_running());

        let addr = server.start().await.unwrap();
        assert!(server.is_running());
        assert_eq!(server.local_addr(), Some(addr));
        assert_ne!(addr.port(), 0);

        assert!(matches!(server.start().await, Err(ServerError::AlreadyRunning)));

        server.stop().await;
        assert!(!server.is_running());
        assert_eq!(server.local_addr(), None);
    }

    #[tokio::test]
    async fn bind_failure_leaves_server_stopped() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = local_config();
        config.listener.port = taken.local_addr().unwrap().port() as i64;

        let server = ResourceServer::new(&config);
        assert!(matches!(server.start().await, Err(ServerError::Listener(_))));
        assert!(!server.is_running());
    }

    #[test]
    fn port_setter_normalizes() {
        let server = ResourceServer::new(&local_config());
        server.set_port(8080);
        assert_eq!(server.port(), 8080);
        server.set_port(100_000);
        assert_eq!(server.port(), 0);
    }

    #[test]
    fn apply_config_updates_runtime_settings() {
        let server = ResourceServer::new(&local_config());
        let mut config = local_config();
        config.listener.port = 7000;
        config.listener.client_limit = 2;
        config.leases.z_time_ms = 42;
        config.auth.permitted_users = vec!["bob".into()];

        server.apply_config(&config);
        assert_eq!(server.port(), 7000);
        assert_eq!(server.client_limit(), 2);
        assert_eq!(server.z_time(), Duration::from_millis(42));
        assert_eq!(server.permitted_users(), vec!["bob"]);
    }

    #[tokio::test]
    async fn stop_clears_bans() {
        let server = ResourceServer::new(&local_config());
        let conn = server
            .arbiter()
            .admit(SocketAddr::from(([10, 1, 1, 1], 1234)))
            .unwrap();
        server.arbiter().handle_auth(conn.id, "mallory");
        assert_eq!(server.banned_addresses().len(), 1);

        server.stop().await;
        assert!(server.banned_addresses().is_empty());
        assert!(server.sessions().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn stop_leaves_no_slot_held_under_live_traffic() {
        let frame = serde_json::json!({"username": "alice", "time": 1000, "request": 1});

        for last in 0..50u8 {
            let server = ResourceServer::new(&local_config());
            let arbiter = Arc::clone(server.arbiter());
            let conn = arbiter
                .admit(SocketAddr::from(([10, 2, 0, last], 4000)))
                .unwrap();
            arbiter.handle_auth(conn.id, "alice");

            let client = {
                let arbiter = Arc::clone(&arbiter);
                let frame = frame.clone();
                tokio::task::spawn_blocking(move || {
                    while arbiter.handle_frame(conn.id, &frame) == crate::arbiter::Disposition::Continue {}
                })
            };

            server.stop().await;
            client.await.unwrap();
            assert_eq!(server.resources(), [None, None, None, None]);
            assert!(arbiter.is_halted());
        }
    }

    #[tokio::test]
    async fn restart_resumes_message_handling() {
        let server = ResourceServer::new(&local_config());
        server.stop().await;
        assert!(server.arbiter().is_halted());

        server.start().await.unwrap();
        assert!(!server.arbiter().is_halted());
        server.stop().await;
    }
}
