//! Prometheus metrics for the ledger engine.
//!
//! Counter helpers are cheap no-ops until an exporter is installed, so
//! library code records unconditionally.

use std::net::SocketAddr;

use metrics::counter;
use metrics_exporter_prometheus::PrometheusBuilder;
use thiserror::Error;

/// Metrics initialization errors.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// Exporter failed to install (e.g. port already in use).
    #[error("metrics exporter installation failed: {0}")]
    Installation(String),
}

/// Start the Prometheus exporter, serving `/metrics` on `listen_addr`.
///
/// # Errors
///
/// Returns an error when the exporter fails to start.
pub fn init_metrics(listen_addr: SocketAddr) -> Result<(), MetricsError> {
    PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
        .map_err(|e| MetricsError::Installation(e.to_string()))?;
    tracing::info!(addr = %listen_addr, "Prometheus metrics exporter started");
    Ok(())
}

/// An order was acknowledged by the gateway.
pub fn record_order_submitted() {
    counter!("ledger_orders_submitted_total").increment(1);
}

/// An order was rejected, by validator check name or `gateway`.
pub fn record_order_rejected(reason: &'static str) {
    counter!("ledger_orders_rejected_total", "reason" => reason).increment(1);
}

/// An order reached the `Filled` state.
pub fn record_order_filled() {
    counter!("ledger_orders_filled_total").increment(1);
}

/// A fill delta was applied to the position book.
pub fn record_fill_applied() {
    counter!("ledger_fills_applied_total").increment(1);
}

/// A reconciliation discrepancy was detected, by kind.
pub fn record_discrepancy(kind: &'static str) {
    counter!("ledger_reconciliation_discrepancies_total", "kind" => kind).increment(1);
}

/// The kill switch was activated.
pub fn record_kill_switch_activation() {
    counter!("ledger_kill_switch_activations_total").increment(1);
}

/// Risk alerts raised in one evaluation pass.
pub fn record_risk_alerts(count: usize) {
    counter!("ledger_risk_alerts_total").increment(count as u64);
}
