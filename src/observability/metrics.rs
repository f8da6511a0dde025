//! Metrics collection and exposition.
//!
//! # Metrics
//! - `echo_messages_total` (counter): echoed payloads by transport
//! - `echo_bytes_total` (counter): echoed bytes by transport
//! - `echo_sessions_active` (gauge): currently open TCP sessions
//! - `echo_session_errors_total` (counter): sessions that ended in error, by kind
//! - `echo_tls_handshake_failures_total` (counter)
//!
//! Without an installed recorder every call is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

use crate::observability::recorder::Transport;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_echo(transport: Transport, bytes: usize) {
    counter!("echo_messages_total", "transport" => transport.as_str()).increment(1);
    counter!("echo_bytes_total", "transport" => transport.as_str()).increment(bytes as u64);
}

pub fn session_opened() {
    gauge!("echo_sessions_active").increment(1.0);
}

pub fn session_closed() {
    gauge!("echo_sessions_active").decrement(1.0);
}

pub fn record_session_error(kind: &'static str) {
    counter!("echo_session_errors_total", "kind" => kind).increment(1);
}

pub fn record_tls_failure() {
    counter!("echo_tls_handshake_failures_total").increment(1);
}
