//! Immutable trade records, one per fill delta.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OrderSide;

/// One executed fill, recorded by the monitoring loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Locally generated trade id.
    pub trade_id: String,
    /// The order this fill belongs to.
    pub order_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Trade side.
    pub side: OrderSide,
    /// Fill quantity (this delta only, not cumulative).
    pub quantity: Decimal,
    /// Execution price for this delta.
    pub price: Decimal,
    /// Owning strategy identifier.
    pub strategy_id: String,
    /// Execution timestamp.
    pub executed_at: DateTime<Utc>,
}

impl TradeRecord {
    /// Record a new fill delta.
    #[must_use]
    pub fn new(
        order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: OrderSide,
        quantity: Decimal,
        price: Decimal,
        strategy_id: impl Into<String>,
    ) -> Self {
        Self {
            trade_id: Uuid::new_v4().to_string(),
            order_id: order_id.into(),
            symbol: symbol.into(),
            side,
            quantity,
            price,
            strategy_id: strategy_id.into(),
            executed_at: Utc::now(),
        }
    }

    /// Notional value of the trade.
    #[must_use]
    pub fn notional(&self) -> Decimal {
        self.quantity * self.price
    }
}
