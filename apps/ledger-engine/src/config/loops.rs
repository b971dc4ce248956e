//! Background loop cadences and gateway concurrency.

use serde::{Deserialize, Serialize};

/// Cadence and concurrency settings for the background loops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopsConfig {
    /// Order monitoring loop tick, milliseconds.
    #[serde(default = "default_order_monitor_interval_ms")]
    pub order_monitor_interval_ms: u64,
    /// Risk monitor tick, milliseconds.
    #[serde(default = "default_risk_interval_ms")]
    pub risk_interval_ms: u64,
    /// Reconciliation tick, seconds.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Maximum concurrent gateway submissions.
    #[serde(default = "default_submit_concurrency")]
    pub submit_concurrency: usize,
}

impl Default for LoopsConfig {
    fn default() -> Self {
        Self {
            order_monitor_interval_ms: default_order_monitor_interval_ms(),
            risk_interval_ms: default_risk_interval_ms(),
            reconcile_interval_secs: default_reconcile_interval_secs(),
            submit_concurrency: default_submit_concurrency(),
        }
    }
}

const fn default_order_monitor_interval_ms() -> u64 {
    1000
}

const fn default_risk_interval_ms() -> u64 {
    2000
}

const fn default_reconcile_interval_secs() -> u64 {
    30
}

const fn default_submit_concurrency() -> usize {
    4
}
