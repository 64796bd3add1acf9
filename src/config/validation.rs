//! Configuration validation and boundary normalization.
//!
//! # Responsibilities
//! - Normalize runtime-adjustable values (port, client limit, Z-time)
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses used by the admin and metrics endpoints
//!
//! # Design Decisions
//! - Normalizers never fail: out-of-range values fall back or clamp
//! - `validate_config` returns all validation errors, not just the first

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::config::schema::{ArbiterConfig, ABSOLUTE_CLIENT_LIMIT, DEFAULT_Z_TIME_MS};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    EmptyUsername { index: usize },
    DuplicateUsername(String),
    InvalidAddress { field: &'static str, value: String },
    ZeroFrameSize,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyUsername { index } => {
                write!(f, "auth.permitted_users[{}] is empty", index)
            }
            ValidationError::DuplicateUsername(name) => {
                write!(f, "auth.permitted_users lists '{}' more than once", name)
            }
            ValidationError::InvalidAddress { field, value } => {
                write!(f, "{} is not a socket address: '{}'", field, value)
            }
            ValidationError::ZeroFrameSize => write!(f, "listener.max_frame_bytes must be > 0"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Ports outside 0..=65535 disable the listener port (0).
pub fn normalize_port(port: i64) -> u16 {
    u16::try_from(port).unwrap_or(0)
}

/// Clamp a client limit into `0..=ABSOLUTE_CLIENT_LIMIT`.
pub fn clamp_client_limit(limit: i64) -> usize {
    limit.clamp(0, ABSOLUTE_CLIENT_LIMIT as i64) as usize
}

/// Negative lease durations fall back to the default Z-time.
pub fn normalize_z_time(ms: i64) -> Duration {
    match u64::try_from(ms) {
        Ok(ms) => Duration::from_millis(ms),
        Err(_) => Duration::from_millis(DEFAULT_Z_TIME_MS),
    }
}

/// Check a configuration for semantic errors.
pub fn validate_config(config: &ArbiterConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let mut seen = std::collections::HashSet::new();
    for (index, name) in config.auth.permitted_users.iter().enumerate() {
        if name.trim().is_empty() {
            errors.push(ValidationError::EmptyUsername { index });
        } else if !seen.insert(name.as_str()) {
            errors.push(ValidationError::DuplicateUsername(name.clone()));
        }
    }

    if config.listener.max_frame_bytes == 0 {
        errors.push(ValidationError::ZeroFrameSize);
    }

    if config.admin.enabled && config.admin.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "admin.bind_address",
            value: config.admin.bind_address.clone(),
        });
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidAddress {
            field: "observability.metrics_address",
            value: config.observability.metrics_address.clone(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
