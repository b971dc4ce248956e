//! Risk summary and alert types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Severity of a risk alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskSeverity {
    /// Approaching a configured threshold.
    Info,
    /// Threshold partially breached.
    Warning,
    /// Threshold exceeded; triggers the kill switch.
    Critical,
}

/// A single threshold evaluation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAlert {
    /// Which metric fired ("daily_loss", "drawdown", "position_count").
    pub metric: String,
    /// Alert severity.
    pub severity: RiskSeverity,
    /// Observed value.
    pub observed: Decimal,
    /// Configured limit.
    pub limit: Decimal,
    /// Human-readable message.
    pub message: String,
}

/// Kill-switch status embedded in the risk summary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KillSwitchStatus {
    /// Whether the switch is engaged.
    pub active: bool,
    /// Reason recorded at activation.
    pub reason: Option<String>,
    /// Activation timestamp.
    pub activated_at: Option<DateTime<Utc>>,
}

/// Account-level risk metrics, recomputed on demand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskSummary {
    /// Current account value (equity + realized + unrealized P&L).
    pub account_value: Decimal,
    /// Peak account value observed.
    pub peak_value: Decimal,
    /// P&L accumulated today.
    pub daily_pnl: Decimal,
    /// Daily P&L as a percentage of the day's starting value.
    pub daily_pnl_pct: Decimal,
    /// Drawdown from the peak.
    pub drawdown: Decimal,
    /// Drawdown as a percentage of the peak.
    pub drawdown_pct: Decimal,
    /// Number of open positions.
    pub open_positions: usize,
    /// Kill-switch state.
    pub kill_switch: KillSwitchStatus,
    /// When this summary was computed.
    pub computed_at: DateTime<Utc>,
}
