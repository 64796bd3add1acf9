use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::time::UNIX_EPOCH;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};

use super::AdminState;
use crate::arbiter::{SessionInfo, SlotInfo};

#[derive(Serialize)]
pub struct ServerStatus {
    pub version: &'static str,
    pub running: bool,
    pub local_addr: Option<SocketAddr>,
    pub port: u16,
    pub client_limit: usize,
    pub z_time_ms: u64,
    pub sessions: usize,
    pub banned: usize,
    pub reject_auth: bool,
    pub reject_requests: bool,
}

#[derive(Debug, Deserialize)]
pub struct RejectToggle {
    pub reject: bool,
}

pub async fn get_status(State(state): State<AdminState>) -> Json<ServerStatus> {
    let server = &state.server;
    Json(ServerStatus {
        version: env!("CARGO_PKG_VERSION"),
        running: server.is_running(),
        local_addr: server.local_addr(),
        port: server.port(),
        client_limit: server.client_limit(),
        z_time_ms: server.z_time().as_millis() as u64,
        sessions: server.sessions().len(),
        banned: server.banned_addresses().len(),
        reject_auth: server.rejects_auth_requests(),
        reject_requests: server.rejects_resource_requests(),
    })
}

pub async fn get_resources(State(state): State<AdminState>) -> Json<Vec<SlotInfo>> {
    Json(state.server.resource_snapshot())
}

pub async fn get_sessions(State(state): State<AdminState>) -> Json<Vec<SessionInfo>> {
    Json(state.server.sessions())
}

/// First acquisition per username since that user last held no slot, as
/// milliseconds since the Unix epoch.
pub async fn get_resource_times(
    State(state): State<AdminState>,
) -> Json<BTreeMap<String, u64>> {
    let times = state
        .server
        .resource_times()
        .into_iter()
        .map(|(user, at)| {
            let ms = at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or(0);
            (user, ms)
        })
        .collect();
    Json(times)
}

pub async fn get_bans(State(state): State<AdminState>) -> Json<Vec<IpAddr>> {
    Json(state.server.banned_addresses())
}

pub async fn free_resources(State(state): State<AdminState>) -> StatusCode {
    tracing::info!("Admin freed all resources");
    state.server.free_resources();
    StatusCode::NO_CONTENT
}

pub async fn set_reject_auth(
    State(state): State<AdminState>,
    Json(toggle): Json<RejectToggle>,
) -> StatusCode {
    tracing::info!(reject = toggle.reject, "Admin set auth reject mode");
    state.server.reject_auth_requests(toggle.reject);
    StatusCode::NO_CONTENT
}

pub async fn set_reject_requests(
    State(state): State<AdminState>,
    Json(toggle): Json<RejectToggle>,
) -> StatusCode {
    tracing::info!(reject = toggle.reject, "Admin set resource request reject mode");
    state.server.reject_resource_requests(toggle.reject);
    StatusCode::NO_CONTENT
}
