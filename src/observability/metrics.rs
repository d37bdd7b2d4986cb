//! Metrics collection and exposition.
//!
//! # Metrics
//! - `settlement_tx_submitted_total` (counter): submissions by operation
//! - `settlement_tx_failed_total` (counter): failures by operation and stage
//! - `settlement_confirmation_seconds` (histogram): time spent waiting
//! - `settlement_redeem_partial_failures_total` (counter): debited but unrewarded
//! - `settlement_open_intents` (gauge): redeem intents not yet terminal
//! - `settlement_reconcile_actions_total` (counter): reconciler actions by kind
//! - `settlement_chain_health` (gauge): 1=reachable, 0=unreachable
//!
//! Recording without an installed exporter is a no-op, so tests and the CLI
//! can call these freely.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus exporter with its own HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_submitted(operation: &'static str) {
    metrics::counter!("settlement_tx_submitted_total", "operation" => operation).increment(1);
}

pub fn record_failure(operation: &'static str, stage: &'static str) {
    metrics::counter!(
        "settlement_tx_failed_total",
        "operation" => operation,
        "stage" => stage
    )
    .increment(1);
}

pub fn record_confirmation(operation: &'static str, started: Instant) {
    metrics::histogram!("settlement_confirmation_seconds", "operation" => operation)
        .record(started.elapsed().as_secs_f64());
}

pub fn record_partial_redeem() {
    metrics::counter!("settlement_redeem_partial_failures_total").increment(1);
}

pub fn record_open_intents(count: usize) {
    metrics::gauge!("settlement_open_intents").set(count as f64);
}

pub fn record_reconcile_action(action: &'static str) {
    metrics::counter!("settlement_reconcile_actions_total", "action" => action).increment(1);
}

pub fn record_chain_health(healthy: bool) {
    metrics::gauge!("settlement_chain_health").set(if healthy { 1.0 } else { 0.0 });
}
