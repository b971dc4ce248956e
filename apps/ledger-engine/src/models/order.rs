//! Order types and the order lifecycle state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Order side (buy or sell).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl OrderSide {
    /// Signed direction multiplier: +1 for buy, -1 for sell.
    #[must_use]
    pub const fn sign(self) -> i64 {
        match self {
            Self::Buy => 1,
            Self::Sell => -1,
        }
    }

    /// The opposite side.
    #[must_use]
    pub const fn opposite(self) -> Self {
        match self {
            Self::Buy => Self::Sell,
            Self::Sell => Self::Buy,
        }
    }
}

/// Order type (market or limit).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    /// Market order - execute at best available price.
    Market,
    /// Limit order - execute at specified price or better.
    Limit,
}

/// Product type determining settlement/margin treatment at the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    /// Delivery / cash-and-carry.
    #[default]
    Delivery,
    /// Intraday, auto-squared-off by the broker.
    Intraday,
}

/// Time in force for orders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeInForce {
    /// Valid for current trading day only.
    #[default]
    Day,
    /// Immediate-or-cancel (fill immediately, cancel remainder).
    Ioc,
    /// Good-til-canceled.
    Gtc,
}

/// Order status in the lifecycle.
///
/// `Created → Pending → Submitted → {Open | Rejected}`, then
/// `Open → PartiallyFilled* → {Filled | Cancelled | Expired}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Order accepted by the validator, not yet persisted as submittable.
    Created,
    /// Order persisted locally, submission to the broker in progress.
    Pending,
    /// Order handed to the broker gateway, acknowledgment outstanding.
    Submitted,
    /// Order live at the broker.
    Open,
    /// Order partially filled; remainder still working.
    PartiallyFilled,
    /// Order completely filled.
    Filled,
    /// Order cancelled.
    Cancelled,
    /// Order rejected (validator, gateway, or broker).
    Rejected,
    /// Order expired at the broker.
    Expired,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order is working at the broker (can fill, can be
    /// cancelled).
    #[must_use]
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Submitted | Self::Open | Self::PartiallyFilled)
    }

    /// Check if a lifecycle transition is valid.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Created, Self::Pending | Self::Rejected)
                | (Self::Pending, Self::Submitted | Self::Rejected)
                | (Self::Submitted, Self::Open | Self::Rejected | Self::Cancelled)
                | (
                    Self::Open,
                    Self::PartiallyFilled
                        | Self::Filled
                        | Self::Cancelled
                        | Self::Rejected
                        | Self::Expired
                )
                | (
                    Self::PartiallyFilled,
                    Self::PartiallyFilled | Self::Filled | Self::Cancelled | Self::Expired
                )
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Created => "CREATED",
            Self::Pending => "PENDING",
            Self::Submitted => "SUBMITTED",
            Self::Open => "OPEN",
            Self::PartiallyFilled => "PARTIALLY_FILLED",
            Self::Filled => "FILLED",
            Self::Cancelled => "CANCELLED",
            Self::Rejected => "REJECTED",
            Self::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// Immutable order request from the strategy layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Caller-supplied idempotency key. Retrying with the same key returns
    /// the already-created order instead of submitting a duplicate.
    pub client_request_id: String,
    /// Instrument symbol.
    pub symbol: String,
    /// Exchange identifier (e.g. "NSE", "NYSE").
    pub exchange: String,
    /// Order side.
    pub side: OrderSide,
    /// Requested quantity.
    pub quantity: Decimal,
    /// Order type.
    pub order_type: OrderType,
    /// Limit price (required for limit orders).
    pub limit_price: Option<Decimal>,
    /// Product type.
    pub product_type: ProductType,
    /// Time in force.
    pub time_in_force: TimeInForce,
    /// Optional stop-loss price.
    pub stop_loss: Option<Decimal>,
    /// Optional take-profit price.
    pub take_profit: Option<Decimal>,
    /// Owning strategy identifier.
    pub strategy_id: String,
}

impl OrderRequest {
    /// Structural validation: a limit order must carry a positive price.
    ///
    /// Quantity bounds are deliberately left to the pre-trade validator so
    /// the rejection names the `quantity_bounds` check.
    ///
    /// # Errors
    ///
    /// Returns `ValidationRejected` for a limit order without a positive
    /// limit price.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.order_type == OrderType::Limit {
            match self.limit_price {
                Some(price) if price > Decimal::ZERO => {}
                _ => {
                    return Err(EngineError::ValidationRejected {
                        check: "order_request".to_string(),
                        reason: "limit order requires a positive limit price".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Notional value of the request at the given reference price.
    #[must_use]
    pub fn notional(&self, reference_price: Decimal) -> Decimal {
        self.quantity * reference_price
    }

    /// Price used for notional and risk estimates: the limit price when
    /// present, otherwise the supplied last traded price.
    #[must_use]
    pub fn effective_price(&self, last_traded: Option<Decimal>) -> Option<Decimal> {
        self.limit_price.or(last_traded)
    }
}

/// Permitted changes for an open order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderChanges {
    /// New limit price.
    pub limit_price: Option<Decimal>,
    /// New quantity.
    pub quantity: Option<Decimal>,
    /// New trigger (stop) price.
    pub trigger_price: Option<Decimal>,
}

impl OrderChanges {
    /// True when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.limit_price.is_none() && self.quantity.is_none() && self.trigger_price.is_none()
    }
}

/// An order owned by the ledger.
///
/// Created when the validator accepts a request, mutated only by the order
/// manager and its monitoring loop, frozen once terminal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Locally generated order id.
    pub order_id: String,
    /// Broker-assigned order id, present after successful submission.
    pub broker_order_id: Option<String>,
    /// The originating request.
    pub request: OrderRequest,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Cumulative filled quantity.
    pub filled_quantity: Decimal,
    /// Average fill price over the filled quantity.
    pub avg_fill_price: Decimal,
    /// Last status message (broker rejection reason, cancel reason, ...).
    pub status_message: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a new order from an accepted request.
    #[must_use]
    pub fn new(request: OrderRequest) -> Self {
        let now = Utc::now();
        Self {
            order_id: Uuid::new_v4().to_string(),
            broker_order_id: None,
            request,
            status: OrderStatus::Created,
            filled_quantity: Decimal::ZERO,
            avg_fill_price: Decimal::ZERO,
            status_message: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Remaining (unfilled) quantity.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.request.quantity - self.filled_quantity
    }

    /// Transition to a new status, enforcing the lifecycle state machine.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when the current status forbids the
    /// target.
    pub fn transition_to(&mut self, to: OrderStatus) -> Result<(), EngineError> {
        if !self.status.can_transition_to(to) {
            return Err(EngineError::InvalidStateTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Mark the order acknowledged by the broker with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` unless the order is `Submitted`.
    pub fn accept(&mut self, broker_order_id: impl Into<String>) -> Result<(), EngineError> {
        self.transition_to(OrderStatus::Open)?;
        self.broker_order_id = Some(broker_order_id.into());
        Ok(())
    }

    /// Record cumulative fill progress as reported by the broker.
    ///
    /// `filled_quantity` is the broker's cumulative figure, not a delta.
    /// Transitions to `PartiallyFilled` or `Filled` accordingly.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when the order cannot fill, or
    /// `SubmissionFailed` when the cumulative quantity exceeds the request.
    pub fn record_fill(
        &mut self,
        filled_quantity: Decimal,
        avg_fill_price: Decimal,
    ) -> Result<(), EngineError> {
        if filled_quantity > self.request.quantity {
            return Err(EngineError::SubmissionFailed(format!(
                "broker reported filled quantity {filled_quantity} above requested {}",
                self.request.quantity
            )));
        }
        let target = if filled_quantity == self.request.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.transition_to(target)?;
        self.filled_quantity = filled_quantity;
        self.avg_fill_price = avg_fill_price;
        Ok(())
    }

    /// Mark the order rejected with a reason.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when the order is already terminal.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), EngineError> {
        self.transition_to(OrderStatus::Rejected)?;
        self.status_message = reason.into();
        Ok(())
    }

    /// Mark the order cancelled.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when the order is already terminal.
    pub fn cancel(&mut self, reason: impl Into<String>) -> Result<(), EngineError> {
        self.transition_to(OrderStatus::Cancelled)?;
        self.status_message = reason.into();
        Ok(())
    }

    /// Mark the order expired.
    ///
    /// # Errors
    ///
    /// Returns `InvalidStateTransition` when the order is already terminal.
    pub fn expire(&mut self) -> Result<(), EngineError> {
        self.transition_to(OrderStatus::Expired)?;
        self.status_message = "expired at broker".to_string();
        Ok(())
    }

    /// Apply permitted modifications locally after broker acknowledgment.
    pub fn apply_changes(&mut self, changes: &OrderChanges) {
        if let Some(price) = changes.limit_price {
            self.request.limit_price = Some(price);
        }
        if let Some(quantity) = changes.quantity {
            self.request.quantity = quantity;
        }
        if let Some(trigger) = changes.trigger_price {
            self.request.stop_loss = Some(trigger);
        }
        self.updated_at = Utc::now();
    }
}
