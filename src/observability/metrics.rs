//! Metrics collection and exposition.
//!
//! # Metrics
//! - `xhttp_sessions_total` (counter): tunnels opened, by transport
//! - `xhttp_connect_failures_total` (counter): connect/dial failures, by transport
//! - `xhttp_upload_failures_total` (counter): split-mode uploads that ended the connection
//! - `xhttp_bridge_failures_total` (counter): single-request exchanges that ended the connection
//! - `xhttp_active_sessions` (gauge): sessions currently forwarded

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_session_opened(transport: &'static str) {
    counter!("xhttp_sessions_total", "transport" => transport).increment(1);
}

pub fn record_connect_failure(transport: &'static str) {
    counter!("xhttp_connect_failures_total", "transport" => transport).increment(1);
}

pub fn record_upload_failure() {
    counter!("xhttp_upload_failures_total").increment(1);
}

pub fn record_bridge_failure() {
    counter!("xhttp_bridge_failures_total").increment(1);
}

pub fn session_started() {
    gauge!("xhttp_active_sessions").increment(1.0);
}

pub fn session_finished() {
    gauge!("xhttp_active_sessions").decrement(1.0);
}
