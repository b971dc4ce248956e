//! Core data model: orders, positions, trades, risk.

mod order;
mod position;
mod risk;
mod trade;

pub use order::{
    Order, OrderChanges, OrderRequest, OrderSide, OrderStatus, OrderType, ProductType, TimeInForce,
};
pub use position::{FillApplication, FillOutcome, Position};
pub use risk::{KillSwitchStatus, RiskAlert, RiskSeverity, RiskSummary};
pub use trade::TradeRecord;
