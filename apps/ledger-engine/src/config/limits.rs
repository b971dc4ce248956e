//! Pre-trade validation limits.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Limits consulted by the pre-trade validator, in check order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationLimits {
    /// Estimated fees in basis points of notional.
    #[serde(default = "default_fee_bps")]
    pub fee_bps: Decimal,
    /// Maximum number of simultaneously open positions.
    #[serde(default = "default_max_open_positions")]
    pub max_open_positions: usize,
    /// Per-trade risk (entry-to-stop × quantity) as % of equity.
    #[serde(default = "default_max_per_trade_risk_pct")]
    pub max_per_trade_risk_pct: Decimal,
    /// Daily loss limit as % of equity; orders are refused once breached.
    #[serde(default = "default_max_daily_loss_pct")]
    pub max_daily_loss_pct: Decimal,
    /// Whether every order must carry a stop-loss.
    #[serde(default = "default_require_stop_loss")]
    pub require_stop_loss: bool,
    /// Minimum reward-to-risk ratio.
    #[serde(default = "default_min_risk_reward_ratio")]
    pub min_risk_reward_ratio: Decimal,
    /// Allowed deviation of a limit price from last traded, in percent.
    #[serde(default = "default_price_band_pct")]
    pub price_band_pct: Decimal,
    /// Minimum order quantity.
    #[serde(default = "default_min_quantity")]
    pub min_quantity: Decimal,
    /// Maximum order quantity.
    #[serde(default = "default_max_quantity")]
    pub max_quantity: Decimal,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            fee_bps: default_fee_bps(),
            max_open_positions: default_max_open_positions(),
            max_per_trade_risk_pct: default_max_per_trade_risk_pct(),
            max_daily_loss_pct: default_max_daily_loss_pct(),
            require_stop_loss: default_require_stop_loss(),
            min_risk_reward_ratio: default_min_risk_reward_ratio(),
            price_band_pct: default_price_band_pct(),
            min_quantity: default_min_quantity(),
            max_quantity: default_max_quantity(),
        }
    }
}

fn default_fee_bps() -> Decimal {
    Decimal::new(10, 0) // 10 bps
}

const fn default_max_open_positions() -> usize {
    10
}

fn default_max_per_trade_risk_pct() -> Decimal {
    Decimal::new(2, 0)
}

fn default_max_daily_loss_pct() -> Decimal {
    Decimal::new(3, 0)
}

const fn default_require_stop_loss() -> bool {
    true
}

fn default_min_risk_reward_ratio() -> Decimal {
    Decimal::new(15, 1) // 1.5
}

fn default_price_band_pct() -> Decimal {
    Decimal::new(5, 0)
}

fn default_min_quantity() -> Decimal {
    Decimal::ONE
}

fn default_max_quantity() -> Decimal {
    Decimal::new(10_000, 0)
}
