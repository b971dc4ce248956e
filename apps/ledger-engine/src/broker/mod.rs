//! Broker gateway contract and adapters.
//!
//! The ledger consumes the broker through this narrow interface; concrete
//! wire protocols live behind it. The gateway is assumed at-least-once on
//! status delivery (polling) and must tolerate repeated queries.

mod retry;
mod sim;

pub use retry::{BrokerRetryPolicy, ExponentialBackoffCalculator};
pub use sim::SimulatedBroker;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{OrderChanges, OrderRequest, OrderStatus};

/// Errors from broker gateway calls.
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    /// Order rejected by the broker.
    #[error("order rejected by broker: {0}")]
    Rejected(String),

    /// Unknown broker order id.
    #[error("unknown broker order id: {0}")]
    UnknownOrder(String),

    /// Transient transport/connectivity failure; safe to retry.
    #[error("broker connection error: {0}")]
    Connection(String),

    /// Broker-side rate limiting; safe to retry after backoff.
    #[error("broker rate limited: {0}")]
    RateLimited(String),
}

impl BrokerError {
    /// True when the caller may retry the same call.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::RateLimited(_))
    }
}

/// Broker-reported status of one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderStatusSnapshot {
    /// Broker order id.
    pub broker_order_id: String,
    /// Broker-side lifecycle state, mapped to the local status vocabulary.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Average fill price over the filled quantity.
    pub avg_fill_price: Decimal,
    /// Broker status message, if any.
    pub message: String,
}

/// Broker-reported position for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerPosition {
    /// Instrument symbol.
    pub symbol: String,
    /// Signed quantity.
    pub quantity: Decimal,
    /// Average entry price.
    pub avg_price: Decimal,
}

/// Broker gateway consumed by the ledger.
///
/// Implementations must be safe to call concurrently; every method is a
/// plain request/response with no ordering guarantees beyond the broker's
/// own eventual consistency.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    /// Submit an order; returns the broker-assigned order id.
    async fn submit_order(&self, request: &OrderRequest) -> Result<String, BrokerError>;

    /// Request cancellation of a working order.
    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError>;

    /// Request modification of a working order.
    async fn modify_order(
        &self,
        broker_order_id: &str,
        changes: &OrderChanges,
    ) -> Result<(), BrokerError>;

    /// Fetch the current status snapshot of one order.
    async fn get_order_status(
        &self,
        broker_order_id: &str,
    ) -> Result<OrderStatusSnapshot, BrokerError>;

    /// Fetch the broker's authoritative position snapshot.
    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError>;

    /// Name for logging.
    fn broker_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(BrokerError::Connection("timeout".into()).is_retryable());
        assert!(BrokerError::RateLimited("429".into()).is_retryable());
        assert!(!BrokerError::Rejected("margin".into()).is_retryable());
        assert!(!BrokerError::UnknownOrder("b-1".into()).is_retryable());
    }
}
