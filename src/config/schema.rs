//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the arbiter.
//! All types derive Serde traits for deserialization from config files.
//!
//! Numeric limits are kept as signed integers on the wire so out-of-range
//! values can be normalized at the boundary instead of failing to parse.

use serde::{Deserialize, Serialize};

/// Hard ceiling on concurrently connected clients.
pub const ABSOLUTE_CLIENT_LIMIT: usize = 20;

/// Lease duration used when none (or a negative one) is configured.
pub const DEFAULT_Z_TIME_MS: u64 = 30_000;

/// Root configuration for the resource arbiter.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ArbiterConfig {
    /// Listener configuration (bind host, port, client limit).
    pub listener: ListenerConfig,

    /// Lease timing.
    pub leases: LeaseConfig,

    /// Username allow-list.
    pub auth: AuthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Host or IP to bind (e.g., "0.0.0.0").
    pub bind_host: String,

    /// TCP port. Values outside 0..=65535 are treated as 0.
    pub port: i64,

    /// Maximum concurrent clients, clamped to [`ABSOLUTE_CLIENT_LIMIT`].
    pub client_limit: i64,

    /// Largest partial JSON document buffered per connection.
    pub max_frame_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: 0,
            client_limit: ABSOLUTE_CLIENT_LIMIT as i64,
            max_frame_bytes: 64 * 1024,
        }
    }
}

/// Lease ("Z-time") configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LeaseConfig {
    /// How long a granted resource is protected from reassignment, in ms.
    pub z_time_ms: i64,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            z_time_ms: DEFAULT_Z_TIME_MS as i64,
        }
    }
}

/// Authorization allow-list.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Usernames allowed to authorize.
    pub permitted_users: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}
