//! Position manager: the authoritative local position and P&L book.
//!
//! Owns one [`Position`] per symbol. All mutation goes through the write
//! lock, so a fill application and a reconciliation overwrite can never
//! interleave into an inconsistent average price.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::RwLock;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::models::{FillApplication, OrderSide, Position};

/// Point-in-time risk view of one open position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionRisk {
    /// Instrument symbol.
    pub symbol: String,
    /// Signed quantity.
    pub quantity: Decimal,
    /// Distance from the current price to the stop, when a stop is given.
    pub distance_to_stop: Option<Decimal>,
    /// Amount at risk to the stop (distance × |quantity|).
    pub risk_amount: Option<Decimal>,
    /// Position notional as a fraction of account equity.
    pub weight: Decimal,
}

/// Aggregate P&L totals across the book.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PnlTotals {
    /// Realized P&L across all positions, including closed ones.
    pub realized: Decimal,
    /// Unrealized P&L across open positions.
    pub unrealized: Decimal,
}

/// Owns position accounting per instrument.
#[derive(Debug, Default)]
pub struct PositionManager {
    positions: RwLock<HashMap<String, Position>>,
}

impl PositionManager {
    /// Create an empty position book.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one fill delta. The single mutation entry point.
    ///
    /// Called exactly once per fill delta by the order monitoring loop;
    /// classification into the six accounting cases lives on [`Position`].
    pub fn apply_fill(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
    ) -> FillApplication {
        let mut positions = self
            .positions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let application = match positions.entry(symbol.to_string()) {
            Entry::Occupied(mut entry) => entry.get_mut().apply_fill(side, quantity, price),
            Entry::Vacant(entry) => {
                let position = Position::open(symbol, side, quantity, price);
                let application = FillApplication {
                    outcome: crate::models::FillOutcome::Opened,
                    realized_pnl: Decimal::ZERO,
                    quantity_after: position.quantity,
                };
                entry.insert(position);
                application
            }
        };

        debug!(
            symbol,
            outcome = ?application.outcome,
            realized = %application.realized_pnl,
            quantity_after = %application.quantity_after,
            "fill applied"
        );
        application
    }

    /// Recompute unrealized P&L and drawdown markers for one symbol.
    ///
    /// Safe to call at any frequency; a no-op when no position exists.
    pub fn update_unrealized_pnl(&self, symbol: &str, market_price: Decimal) {
        let mut positions = self
            .positions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(position) = positions.get_mut(symbol) {
            position.mark_price(market_price);
        }
    }

    /// Fetch a copy of one position, open or closed.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<Position> {
        self.positions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(symbol)
            .cloned()
    }

    /// Copies of all open (non-flat) positions.
    #[must_use]
    pub fn open_positions(&self) -> Vec<Position> {
        self.positions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|p| !p.is_flat())
            .cloned()
            .collect()
    }

    /// Number of open positions.
    #[must_use]
    pub fn open_position_count(&self) -> usize {
        self.positions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|p| !p.is_flat())
            .count()
    }

    /// Last known market price for one symbol, from fills or price marks.
    #[must_use]
    pub fn last_price(&self, symbol: &str) -> Option<Decimal> {
        self.positions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(symbol)
            .and_then(|p| p.last_price)
    }

    /// Gross open exposure: sum of |quantity| × entry price across open
    /// positions.
    #[must_use]
    pub fn gross_exposure(&self) -> Decimal {
        self.positions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|p| !p.is_flat())
            .map(|p| p.quantity.abs() * p.avg_entry_price)
            .sum()
    }

    /// Aggregate realized/unrealized totals across the book.
    #[must_use]
    pub fn pnl_totals(&self) -> PnlTotals {
        let positions = self
            .positions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut totals = PnlTotals::default();
        for position in positions.values() {
            totals.realized += position.realized_pnl;
            totals.unrealized += position.unrealized_pnl;
        }
        totals
    }

    /// Derive risk numbers for one open position without mutating it.
    ///
    /// `stop_price` comes from the owning order's stop-loss; `account_equity`
    /// sizes the weight.
    #[must_use]
    pub fn position_risk(
        &self,
        symbol: &str,
        stop_price: Option<Decimal>,
        account_equity: Decimal,
    ) -> Option<PositionRisk> {
        let positions = self
            .positions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let position = positions.get(symbol).filter(|p| !p.is_flat())?;

        let reference = position.last_price.unwrap_or(position.avg_entry_price);
        let distance_to_stop = stop_price.map(|stop| (reference - stop).abs());
        let risk_amount = distance_to_stop.map(|d| d * position.quantity.abs());
        let weight = if account_equity.is_zero() {
            Decimal::ZERO
        } else {
            (reference * position.quantity.abs()) / account_equity
        };

        Some(PositionRisk {
            symbol: symbol.to_string(),
            quantity: position.quantity,
            distance_to_stop,
            risk_amount,
            weight,
        })
    }

    /// Force-overwrite a position to broker-reported values.
    ///
    /// Reconciliation's correction path: quantity and average price are
    /// taken from the broker verbatim; realized P&L history is retained.
    /// A zero quantity closes the position; an overwrite on an unknown
    /// symbol creates the record.
    pub fn force_overwrite(&self, symbol: &str, quantity: Decimal, avg_price: Decimal) {
        let mut positions = self
            .positions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        match positions.entry(symbol.to_string()) {
            Entry::Occupied(mut entry) => {
                let position = entry.get_mut();
                position.quantity = quantity;
                position.avg_entry_price = avg_price;
                if quantity.is_zero() {
                    position.unrealized_pnl = Decimal::ZERO;
                    position.closed_at = Some(Utc::now());
                } else {
                    position.closed_at = None;
                }
                position.updated_at = Utc::now();
            }
            Entry::Vacant(entry) => {
                let side = if quantity >= Decimal::ZERO {
                    OrderSide::Buy
                } else {
                    OrderSide::Sell
                };
                let mut position = Position::open(symbol, side, quantity.abs(), avg_price);
                position.quantity = quantity;
                entry.insert(position);
            }
        }
        info!(symbol, %quantity, %avg_price, "position overwritten from broker");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FillOutcome;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    #[test]
    fn first_fill_opens_position() {
        let manager = PositionManager::new();
        let fill = manager.apply_fill("RELIANCE", OrderSide::Buy, dec!(100), dec!(2450));
        assert_eq!(fill.outcome, FillOutcome::Opened);
        assert_eq!(manager.open_position_count(), 1);
    }

    #[test]
    fn spec_scenario_buy_100_sell_40() {
        let manager = PositionManager::new();
        manager.apply_fill("RELIANCE", OrderSide::Buy, dec!(100), dec!(2450));
        let fill = manager.apply_fill("RELIANCE", OrderSide::Sell, dec!(40), dec!(2460));

        assert_eq!(fill.realized_pnl, dec!(400));
        let position = manager.get("RELIANCE").unwrap();
        assert_eq!(position.quantity, dec!(60));
        assert_eq!(position.avg_entry_price, dec!(2450));
        assert_eq!(position.realized_pnl, dec!(400));
    }

    #[test]
    fn totals_aggregate_across_symbols() {
        let manager = PositionManager::new();
        manager.apply_fill("A", OrderSide::Buy, dec!(10), dec!(100));
        manager.apply_fill("A", OrderSide::Sell, dec!(10), dec!(110));
        manager.apply_fill("B", OrderSide::Buy, dec!(5), dec!(50));
        manager.update_unrealized_pnl("B", dec!(52));

        let totals = manager.pnl_totals();
        assert_eq!(totals.realized, dec!(100));
        assert_eq!(totals.unrealized, dec!(10));
        assert_eq!(manager.open_position_count(), 1);
    }

    #[test]
    fn update_unrealized_unknown_symbol_is_noop() {
        let manager = PositionManager::new();
        manager.update_unrealized_pnl("GHOST", dec!(100));
        assert!(manager.get("GHOST").is_none());
    }

    #[test]
    fn position_risk_derivation() {
        let manager = PositionManager::new();
        manager.apply_fill("RELIANCE", OrderSide::Buy, dec!(100), dec!(2450));

        let risk = manager
            .position_risk("RELIANCE", Some(dec!(2400)), dec!(1000000))
            .unwrap();
        assert_eq!(risk.distance_to_stop, Some(dec!(50)));
        assert_eq!(risk.risk_amount, Some(dec!(5000)));
        assert_eq!(risk.weight, dec!(0.245));

        assert!(manager.position_risk("GHOST", None, dec!(1000000)).is_none());
    }

    #[test]
    fn force_overwrite_creates_and_closes() {
        let manager = PositionManager::new();
        manager.force_overwrite("SYMBOL-X", dec!(50), dec!(10));
        let position = manager.get("SYMBOL-X").unwrap();
        assert_eq!(position.quantity, dec!(50));
        assert_eq!(position.avg_entry_price, dec!(10));

        manager.force_overwrite("SYMBOL-X", Decimal::ZERO, Decimal::ZERO);
        let position = manager.get("SYMBOL-X").unwrap();
        assert!(position.is_flat());
        assert!(position.closed_at.is_some());
    }

    #[test]
    fn force_overwrite_keeps_realized_history() {
        let manager = PositionManager::new();
        manager.apply_fill("A", OrderSide::Buy, dec!(10), dec!(100));
        manager.apply_fill("A", OrderSide::Sell, dec!(5), dec!(120));
        manager.force_overwrite("A", dec!(7), dec!(101));

        let position = manager.get("A").unwrap();
        assert_eq!(position.quantity, dec!(7));
        assert_eq!(position.realized_pnl, dec!(100));
    }

    proptest! {
        /// Final quantity equals the signed sum of all fills, regardless of
        /// the order they arrive in.
        #[test]
        fn quantity_is_signed_sum_of_fills(
            fills in proptest::collection::vec((any::<bool>(), 1i64..500, 1i64..10_000), 1..20)
        ) {
            let manager = PositionManager::new();
            let mut expected = Decimal::ZERO;
            for (is_buy, qty, price_paise) in fills {
                let side = if is_buy { OrderSide::Buy } else { OrderSide::Sell };
                let qty = Decimal::from(qty);
                let price = Decimal::new(price_paise, 2);
                manager.apply_fill("P", side, qty, price);
                expected += Decimal::from(side.sign()) * qty;
            }
            let actual = manager.get("P").map_or(Decimal::ZERO, |p| p.quantity);
            prop_assert_eq!(actual, expected);
        }
    }
}
