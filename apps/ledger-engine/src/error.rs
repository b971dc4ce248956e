//! Engine error taxonomy.
//!
//! Every user-facing failure of the ledger maps to exactly one of these
//! variants. Gateway I/O failures inside background loops are recovered
//! locally (logged, retried next tick) and never surface through this type.

use thiserror::Error;

use crate::broker::BrokerError;
use crate::models::OrderStatus;

/// Errors surfaced by the order ledger.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The pre-trade validator rejected the request. Not retryable without
    /// changing the order.
    #[error("validation rejected by check '{check}': {reason}")]
    ValidationRejected {
        /// Name of the first failing check.
        check: String,
        /// Human-readable reason.
        reason: String,
    },

    /// The broker gateway refused or failed the submission. The caller may
    /// retry as a new request.
    #[error("order submission failed: {0}")]
    SubmissionFailed(String),

    /// No order with the given id is known to the ledger.
    #[error("order not found: {0}")]
    OrderNotFound(String),

    /// The order is already terminal and cannot be cancelled.
    #[error("order {order_id} not cancellable in status {status}")]
    OrderNotCancellable {
        /// Local order id.
        order_id: String,
        /// Status at the time of the attempt.
        status: OrderStatus,
    },

    /// The order is not open for modification.
    #[error("order {order_id} not modifiable in status {status}")]
    OrderNotModifiable {
        /// Local order id.
        order_id: String,
        /// Status at the time of the attempt.
        status: OrderStatus,
    },

    /// The kill switch is active; no new orders are accepted.
    #[error("trading halted: {reason}")]
    TradingHalted {
        /// Reason recorded at kill-switch activation.
        reason: String,
    },

    /// An order was driven into a transition its current status forbids.
    #[error("invalid order state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Status before the attempted transition.
        from: OrderStatus,
        /// Attempted target status.
        to: OrderStatus,
    },

    /// Gateway error on a foreground call (cancel/modify).
    #[error("broker gateway error: {0}")]
    Gateway(#[from] BrokerError),
}
