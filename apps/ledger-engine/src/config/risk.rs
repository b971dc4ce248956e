//! Risk monitor thresholds and kill-switch policy.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Thresholds evaluated by the real-time risk monitor.
///
/// Each metric walks the same severity ladder: Info at `info_fraction` of
/// the limit, Warning at `warning_fraction`, Critical (kill switch) once the
/// limit is exceeded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Maximum daily loss as % of the day's starting value.
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,
    /// Maximum drawdown from the peak account value, in percent.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: Decimal,
    /// Maximum number of open positions.
    #[serde(default = "default_max_position_count")]
    pub max_position_count: usize,
    /// Fraction of a limit at which an Info alert fires.
    #[serde(default = "default_info_fraction")]
    pub info_fraction: Decimal,
    /// Fraction of a limit at which a Warning alert fires.
    #[serde(default = "default_warning_fraction")]
    pub warning_fraction: Decimal,
    /// Operator phrase required to deactivate the kill switch.
    #[serde(default = "default_kill_switch_confirmation")]
    pub kill_switch_confirmation: String,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            max_daily_loss_pct: default_max_daily_loss_pct(),
            max_drawdown_pct: default_max_drawdown_pct(),
            max_position_count: default_max_position_count(),
            info_fraction: default_info_fraction(),
            warning_fraction: default_warning_fraction(),
            kill_switch_confirmation: default_kill_switch_confirmation(),
        }
    }
}

fn default_max_daily_loss_pct() -> Decimal {
    Decimal::new(3, 0)
}

fn default_max_drawdown_pct() -> Decimal {
    Decimal::new(10, 0)
}

const fn default_max_position_count() -> usize {
    10
}

fn default_info_fraction() -> Decimal {
    Decimal::new(7, 1) // 0.7
}

fn default_warning_fraction() -> Decimal {
    Decimal::new(9, 1) // 0.9
}

fn default_kill_switch_confirmation() -> String {
    "RESUME TRADING".to_string()
}
