//! Operator HTTP API.
//!
//! # Data Flow
//! ```text
//! Operator (arbiter-cli, curl)
//!     → auth.rs (bearer key check)
//!     → handlers.rs
//!     → ResourceServer control surface
//! ```
//!
//! # Design Decisions
//! - Bound to its own address, never the client port
//! - Every route requires the configured API key

pub mod auth;
pub mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::net::ResourceServer;

/// Shared state for admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub server: Arc<ResourceServer>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(server: Arc<ResourceServer>, api_key: &str) -> Self {
        Self {
            server,
            api_key: Arc::from(api_key),
        }
    }
}

pub fn setup_admin_router(state: AdminState) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/resources", get(get_resources))
        .route("/admin/sessions", get(get_sessions))
        .route("/admin/resource-times", get(get_resource_times))
        .route("/admin/bans", get(get_bans))
        .route("/admin/free", post(free_resources))
        .route("/admin/reject-auth", post(set_reject_auth))
        .route("/admin/reject-requests", post(set_reject_requests))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the admin API until `shutdown` fires.
pub async fn serve_admin(
    addr: SocketAddr,
    state: AdminState,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");

    axum::serve(listener, setup_admin_router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;

    tracing::info!("Admin API stopped");
    Ok(())
}
