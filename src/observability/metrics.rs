//! Metrics collection and exposition.
//!
//! # Metrics
//! - `admission_admitted_total` (counter): admitted calls by gate
//! - `admission_rejected_total` (counter): refusals by gate, reason (unavailable, busy)
//! - `admission_faults_total` (counter): panics caught in admitted work
//! - `admission_in_flight` (gauge): admitted, unfinished units of work
//!
//! Without an installed recorder every call here is a no-op.

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};
use std::net::SocketAddr;

/// Install the Prometheus exporter listening on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics exporter listening");
    Ok(())
}

pub fn record_admitted(gate: &str, in_flight: usize) {
    counter!("admission_admitted_total", "gate" => gate.to_string()).increment(1);
    set_in_flight(gate, in_flight);
}

pub fn record_rejected(gate: &str, reason: &'static str) {
    counter!("admission_rejected_total", "gate" => gate.to_string(), "reason" => reason).increment(1);
}

pub fn record_fault(gate: &str) {
    counter!("admission_faults_total", "gate" => gate.to_string()).increment(1);
}

pub fn set_in_flight(gate: &str, in_flight: usize) {
    gauge!("admission_in_flight", "gate" => gate.to_string()).set(in_flight as f64);
}
