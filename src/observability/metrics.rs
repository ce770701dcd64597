//! Metrics collection and exposition.
//!
//! # Metrics
//! - `waf_transactions_total` (counter): finished inspections by outcome
//! - `waf_interruptions_total` (counter): blocks by phase and status
//! - `waf_engine_errors_total` (counter): engine or body failures by phase
//! - `waf_bypass_total` (counter): requests passed through uninspected, by reason
//! - `waf_registered_paths` (gauge): size of the path policy store

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// `outcome` is one of `allowed`, `blocked`, `failed`.
pub fn record_transaction(outcome: &'static str) {
    ::metrics::counter!("waf_transactions_total", "outcome" => outcome).increment(1);
}

pub fn record_interruption(phase: &'static str, status: u16) {
    ::metrics::counter!(
        "waf_interruptions_total",
        "phase" => phase,
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_engine_error(phase: &'static str) {
    ::metrics::counter!("waf_engine_errors_total", "phase" => phase).increment(1);
}

pub fn record_bypass(reason: &'static str) {
    ::metrics::counter!("waf_bypass_total", "reason" => reason).increment(1);
}

pub fn record_registered_paths(count: usize) {
    ::metrics::gauge!("waf_registered_paths").set(count as f64);
}
