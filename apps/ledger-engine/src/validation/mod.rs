//! Pre-trade validation: an ordered, fail-fast check chain.
//!
//! Evaluation stops at the first failing check and reports its name and
//! reason. The validator reads account/position/risk state through a
//! read-only context and never mutates anything.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::ValidationLimits;
use crate::models::{OrderRequest, OrderType};

/// The first failing check, by name, with a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedCheck {
    /// Stable check name (e.g. `per_trade_risk`).
    pub check: &'static str,
    /// Why the check failed.
    pub reason: String,
}

/// Read-only account and market state consulted by the checks.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Total account equity.
    pub account_equity: Decimal,
    /// Cash available for new positions.
    pub available_cash: Decimal,
    /// Current number of open positions.
    pub open_position_count: usize,
    /// P&L accumulated today (negative when losing).
    pub daily_pnl: Decimal,
    /// Last traded price for the requested symbol, when known.
    pub last_traded_price: Option<Decimal>,
}

/// Ordered fail-fast validator over an order request.
#[derive(Debug, Clone)]
pub struct PreTradeValidator {
    limits: ValidationLimits,
}

impl PreTradeValidator {
    /// Create a validator with the given limits.
    #[must_use]
    pub const fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    /// Run the check chain. Deterministic and order-sensitive: identical
    /// inputs always fail on the same first check.
    ///
    /// # Errors
    ///
    /// Returns the first failing check with its reason.
    pub fn validate(
        &self,
        request: &OrderRequest,
        context: &ValidationContext,
    ) -> Result<(), RejectedCheck> {
        self.check_account_balance(request, context)?;
        self.check_position_count(context)?;
        self.check_per_trade_risk(request, context)?;
        self.check_daily_loss_limit(context)?;
        self.check_stop_loss_required(request)?;
        self.check_risk_reward_ratio(request, context)?;
        self.check_price_band(request, context)?;
        self.check_quantity_bounds(request)?;
        Ok(())
    }

    /// (1) Notional plus estimated fees must fit in available cash.
    fn check_account_balance(
        &self,
        request: &OrderRequest,
        context: &ValidationContext,
    ) -> Result<(), RejectedCheck> {
        let Some(price) = request.effective_price(context.last_traded_price) else {
            // Market order with no reference price: nothing to size against;
            // the broker will price it.
            return Ok(());
        };
        let notional = request.notional(price);
        let fees = notional * self.limits.fee_bps / Decimal::from(10_000);
        let required = notional + fees;
        if required > context.available_cash {
            return Err(RejectedCheck {
                check: "account_balance",
                reason: format!(
                    "required {required} (notional {notional} + fees {fees}) exceeds available cash {}",
                    context.available_cash
                ),
            });
        }
        Ok(())
    }

    /// (2) Open-position-count limit.
    fn check_position_count(&self, context: &ValidationContext) -> Result<(), RejectedCheck> {
        if context.open_position_count >= self.limits.max_open_positions {
            return Err(RejectedCheck {
                check: "position_count",
                reason: format!(
                    "open positions {} at limit {}",
                    context.open_position_count, self.limits.max_open_positions
                ),
            });
        }
        Ok(())
    }

    /// (3) Entry-to-stop distance × quantity vs % of equity.
    fn check_per_trade_risk(
        &self,
        request: &OrderRequest,
        context: &ValidationContext,
    ) -> Result<(), RejectedCheck> {
        let (Some(entry), Some(stop)) = (
            request.effective_price(context.last_traded_price),
            request.stop_loss,
        ) else {
            return Ok(());
        };
        let risk = (entry - stop).abs() * request.quantity;
        let max_risk = context.account_equity * self.limits.max_per_trade_risk_pct
            / Decimal::from(100);
        if risk > max_risk {
            return Err(RejectedCheck {
                check: "per_trade_risk",
                reason: format!(
                    "trade risk {risk} exceeds {}% of equity ({max_risk})",
                    self.limits.max_per_trade_risk_pct
                ),
            });
        }
        Ok(())
    }

    /// (4) Daily loss limit must not already be breached.
    fn check_daily_loss_limit(&self, context: &ValidationContext) -> Result<(), RejectedCheck> {
        let max_loss =
            context.account_equity * self.limits.max_daily_loss_pct / Decimal::from(100);
        if context.daily_pnl <= -max_loss {
            return Err(RejectedCheck {
                check: "daily_loss_limit",
                reason: format!(
                    "daily P&L {} already at or below the -{max_loss} limit",
                    context.daily_pnl
                ),
            });
        }
        Ok(())
    }

    /// (5) Stop-loss presence when policy requires it.
    fn check_stop_loss_required(&self, request: &OrderRequest) -> Result<(), RejectedCheck> {
        if self.limits.require_stop_loss && request.stop_loss.is_none() {
            return Err(RejectedCheck {
                check: "stop_loss_required",
                reason: "policy requires a stop-loss on every order".to_string(),
            });
        }
        Ok(())
    }

    /// (6) Reward-to-risk ratio at or above the configured minimum.
    fn check_risk_reward_ratio(
        &self,
        request: &OrderRequest,
        context: &ValidationContext,
    ) -> Result<(), RejectedCheck> {
        let (Some(entry), Some(stop), Some(target)) = (
            request.effective_price(context.last_traded_price),
            request.stop_loss,
            request.take_profit,
        ) else {
            return Ok(());
        };
        let risk = (entry - stop).abs();
        if risk.is_zero() {
            return Err(RejectedCheck {
                check: "risk_reward_ratio",
                reason: "stop-loss equals entry price; risk distance is zero".to_string(),
            });
        }
        let reward = (target - entry).abs();
        let ratio = reward / risk;
        if ratio < self.limits.min_risk_reward_ratio {
            return Err(RejectedCheck {
                check: "risk_reward_ratio",
                reason: format!(
                    "reward:risk {ratio:.2} below minimum {}",
                    self.limits.min_risk_reward_ratio
                ),
            });
        }
        Ok(())
    }

    /// (7) Limit price within a band around the last traded price.
    fn check_price_band(
        &self,
        request: &OrderRequest,
        context: &ValidationContext,
    ) -> Result<(), RejectedCheck> {
        if request.order_type != OrderType::Limit {
            return Ok(());
        }
        let (Some(price), Some(ltp)) = (request.limit_price, context.last_traded_price) else {
            return Ok(());
        };
        if ltp.is_zero() {
            return Ok(());
        }
        let deviation_pct = ((price - ltp).abs() / ltp) * Decimal::from(100);
        if deviation_pct > self.limits.price_band_pct {
            return Err(RejectedCheck {
                check: "price_band",
                reason: format!(
                    "limit price {price} deviates {deviation_pct:.2}% from last traded {ltp}, band is {}%",
                    self.limits.price_band_pct
                ),
            });
        }
        Ok(())
    }

    /// (8) Quantity within min/max bounds and a whole number.
    fn check_quantity_bounds(&self, request: &OrderRequest) -> Result<(), RejectedCheck> {
        let qty = request.quantity;
        if qty < self.limits.min_quantity || qty > self.limits.max_quantity {
            return Err(RejectedCheck {
                check: "quantity_bounds",
                reason: format!(
                    "quantity {qty} outside [{}, {}]",
                    self.limits.min_quantity, self.limits.max_quantity
                ),
            });
        }
        if qty != qty.trunc() {
            return Err(RejectedCheck {
                check: "quantity_bounds",
                reason: format!("quantity {qty} is not a whole number"),
            });
        }
        Ok(())
    }
}
