//! Metrics collection and exposition.
//!
//! # Metrics
//! - `arbiter_admissions_total` (counter): by outcome (accepted, capacity, banned)
//! - `arbiter_auth_total` (counter): by outcome
//! - `arbiter_resource_responses_total` (counter): by status
//! - `arbiter_malformed_messages_total` (counter): by reason
//! - `arbiter_active_sessions` (gauge)
//! - `arbiter_banned_addresses` (gauge)
//!
//! Recording is a no-op until `init_metrics` installs the exporter.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::protocol::Status;

/// Install the Prometheus exporter on `addr`. Must run inside a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_admission(outcome: &'static str) {
    counter!("arbiter_admissions_total", "outcome" => outcome).increment(1);
}

pub fn record_auth(outcome: &'static str) {
    counter!("arbiter_auth_total", "outcome" => outcome).increment(1);
}

pub fn record_resource_response(status: Status) {
    counter!("arbiter_resource_responses_total", "status" => status.as_str()).increment(1);
}

pub fn record_malformed(reason: &'static str) {
    counter!("arbiter_malformed_messages_total", "reason" => reason).increment(1);
}

pub fn record_active_sessions(count: usize) {
    gauge!("arbiter_active_sessions").set(count as f64);
}

pub fn record_banned_addresses(count: usize) {
    gauge!("arbiter_banned_addresses").set(count as f64);
}
