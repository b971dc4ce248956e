//! Position entity and average-price fill accounting.
//!
//! A position carries a signed quantity (positive long, negative short).
//! `apply_fill` is the single mutation entry point and classifies every fill
//! into exactly one accounting case; realized P&L only moves when quantity
//! magnitude decreases or the sign flips.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::Signed;
use serde::{Deserialize, Serialize};

use super::OrderSide;

/// Accounting classification of an applied fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillOutcome {
    /// Opened a new position.
    Opened,
    /// Added to an existing position in the same direction.
    Increased,
    /// Reduced an existing position, realizing P&L on the closed quantity.
    Reduced,
    /// Closed the position exactly.
    Closed,
    /// Closed the old position and opened a residual in the opposite sign.
    Reversed,
}

/// Result of applying one fill to a position.
#[derive(Debug, Clone, Copy)]
pub struct FillApplication {
    /// Which accounting case the fill hit.
    pub outcome: FillOutcome,
    /// Realized P&L contributed by this fill (zero for open/increase).
    pub realized_pnl: Decimal,
    /// Signed position quantity after the fill.
    pub quantity_after: Decimal,
}

/// An open or historical position for one (portfolio, symbol).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// Instrument symbol.
    pub symbol: String,
    /// Signed quantity: positive long, negative short, zero flat.
    pub quantity: Decimal,
    /// Average entry price; meaningful only while `quantity != 0`.
    pub avg_entry_price: Decimal,
    /// Realized P&L accumulated to date.
    pub realized_pnl: Decimal,
    /// Unrealized P&L against the last known market price.
    pub unrealized_pnl: Decimal,
    /// Last market price used for unrealized P&L.
    pub last_price: Option<Decimal>,
    /// Highest price observed while the position was open.
    pub highest_price: Decimal,
    /// Lowest price observed while the position was open.
    pub lowest_price: Decimal,
    /// When the position was opened.
    pub opened_at: DateTime<Utc>,
    /// When the position returned to flat, if it has.
    pub closed_at: Option<DateTime<Utc>>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Open a new position from the first fill on a flat symbol.
    #[must_use]
    pub fn open(symbol: impl Into<String>, side: OrderSide, quantity: Decimal, price: Decimal) -> Self {
        let now = Utc::now();
        Self {
            symbol: symbol.into(),
            quantity: Decimal::from(side.sign()) * quantity,
            avg_entry_price: price,
            realized_pnl: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            last_price: Some(price),
            highest_price: price,
            lowest_price: price,
            opened_at: now,
            closed_at: None,
            updated_at: now,
        }
    }

    /// True when the position is flat.
    #[must_use]
    pub fn is_flat(&self) -> bool {
        self.quantity.is_zero()
    }

    /// True for a long position.
    #[must_use]
    pub fn is_long(&self) -> bool {
        self.quantity > Decimal::ZERO
    }

    /// Apply one fill and classify it into an accounting case.
    ///
    /// `quantity` is the unsigned fill quantity; `side` gives it direction.
    /// The final position quantity always equals the signed sum of all fill
    /// quantities ever applied, regardless of application order.
    pub fn apply_fill(&mut self, side: OrderSide, quantity: Decimal, price: Decimal) -> FillApplication {
        let signed_fill = Decimal::from(side.sign()) * quantity;
        let now = Utc::now();

        let application = if self.quantity.is_zero() {
            // Re-opening a flat (historical) position record.
            self.quantity = signed_fill;
            self.avg_entry_price = price;
            self.opened_at = now;
            self.closed_at = None;
            self.highest_price = price;
            self.lowest_price = price;
            FillApplication {
                outcome: FillOutcome::Opened,
                realized_pnl: Decimal::ZERO,
                quantity_after: self.quantity,
            }
        } else if self.quantity.signum() == signed_fill.signum() {
            // Same direction: weighted-average the entry price.
            let old_abs = self.quantity.abs();
            let new_abs = old_abs + quantity;
            self.avg_entry_price =
                (old_abs * self.avg_entry_price + quantity * price) / new_abs;
            self.quantity += signed_fill;
            FillApplication {
                outcome: FillOutcome::Increased,
                realized_pnl: Decimal::ZERO,
                quantity_after: self.quantity,
            }
        } else if quantity < self.quantity.abs() {
            // Partial close: realize on the closed quantity, average unchanged.
            let realized = self.realized_on_close(quantity, price);
            self.realized_pnl += realized;
            self.quantity += signed_fill;
            FillApplication {
                outcome: FillOutcome::Reduced,
                realized_pnl: realized,
                quantity_after: self.quantity,
            }
        } else if quantity == self.quantity.abs() {
            // Exact close.
            let realized = self.realized_on_close(quantity, price);
            self.realized_pnl += realized;
            self.quantity = Decimal::ZERO;
            self.unrealized_pnl = Decimal::ZERO;
            self.closed_at = Some(now);
            FillApplication {
                outcome: FillOutcome::Closed,
                realized_pnl: realized,
                quantity_after: Decimal::ZERO,
            }
        } else {
            // Reversal: close the whole old quantity, open the residual at
            // the fill price in the opposite sign.
            let closed = self.quantity.abs();
            let realized = self.realized_on_close(closed, price);
            self.realized_pnl += realized;
            self.quantity += signed_fill;
            self.avg_entry_price = price;
            self.opened_at = now;
            self.closed_at = None;
            self.highest_price = price;
            self.lowest_price = price;
            FillApplication {
                outcome: FillOutcome::Reversed,
                realized_pnl: realized,
                quantity_after: self.quantity,
            }
        };

        self.last_price = Some(price);
        self.mark_price(price);
        self.updated_at = now;
        application
    }

    /// Recompute unrealized P&L and drawdown watermarks for a new market
    /// price. Never touches realized P&L. No-op when flat.
    pub fn mark_price(&mut self, market_price: Decimal) {
        if self.quantity.is_zero() {
            self.unrealized_pnl = Decimal::ZERO;
            return;
        }
        self.last_price = Some(market_price);
        self.unrealized_pnl = (market_price - self.avg_entry_price) * self.quantity;
        if market_price > self.highest_price {
            self.highest_price = market_price;
        }
        if market_price < self.lowest_price {
            self.lowest_price = market_price;
        }
        self.updated_at = Utc::now();
    }

    /// P&L realized by closing `quantity` units at `exit_price`, sign-adjusted
    /// for shorts: `(exit - avg) * qty` when long, `(avg - exit) * qty` when
    /// short.
    fn realized_on_close(&self, quantity: Decimal, exit_price: Decimal) -> Decimal {
        if self.is_long() {
            (exit_price - self.avg_entry_price) * quantity
        } else {
            (self.avg_entry_price - exit_price) * quantity
        }
    }
}
