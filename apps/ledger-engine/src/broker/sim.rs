//! Simulated broker gateway.
//!
//! Deterministic in-process broker used by the binary's paper mode and by
//! tests. Supports scriptable fills, failure injection, and position
//! snapshots so reconciliation and retry paths can be exercised without a
//! real broker connection.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::{OrderChanges, OrderRequest, OrderStatus, OrderType};

use super::{BrokerError, BrokerGateway, BrokerPosition, OrderStatusSnapshot};

#[derive(Debug, Clone)]
struct SimOrder {
    symbol: String,
    side: crate::models::OrderSide,
    requested_quantity: Decimal,
    status: OrderStatus,
    filled_quantity: Decimal,
    avg_fill_price: Decimal,
    message: String,
}

/// In-process broker simulator.
///
/// With `auto_fill` enabled, submitted orders fill completely at the limit
/// price (or the configured last price for market orders) on submission.
/// With it disabled, tests drive fills explicitly through [`Self::fill`].
#[derive(Debug, Default)]
pub struct SimulatedBroker {
    orders: RwLock<HashMap<String, SimOrder>>,
    positions: RwLock<HashMap<String, BrokerPosition>>,
    last_prices: RwLock<HashMap<String, Decimal>>,
    order_counter: AtomicU64,
    /// Number of upcoming submissions to fail with a transient error.
    transient_failures: AtomicU32,
    /// Number of upcoming position queries to fail with a transient error.
    position_query_failures: AtomicU32,
    auto_fill: bool,
}

impl SimulatedBroker {
    /// Create a simulator that leaves fills to the test driver.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a simulator that fills every order on submission.
    #[must_use]
    pub fn auto_filling() -> Self {
        Self {
            auto_fill: true,
            ..Self::default()
        }
    }

    /// Set the last traded price used to fill market orders.
    pub fn set_last_price(&self, symbol: &str, price: Decimal) {
        self.last_prices
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(symbol.to_string(), price);
    }

    /// Replace the broker-side position snapshot (test hook).
    pub fn set_positions(&self, positions: Vec<BrokerPosition>) {
        let mut map = self
            .positions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        map.clear();
        for p in positions {
            map.insert(p.symbol.clone(), p);
        }
    }

    /// Fail the next `count` submissions with a transient connection error.
    pub fn fail_next_submissions(&self, count: u32) {
        self.transient_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` position queries with a transient error.
    pub fn fail_next_position_queries(&self, count: u32) {
        self.position_query_failures.store(count, Ordering::SeqCst);
    }

    /// Apply a cumulative fill to a working order (test hook).
    ///
    /// `filled_quantity` is cumulative; the order moves to `PartiallyFilled`
    /// or `Filled` and the broker-side position book is updated by the delta.
    ///
    /// # Panics
    ///
    /// Panics when the broker order id is unknown (test misuse).
    pub fn fill(&self, broker_order_id: &str, filled_quantity: Decimal, avg_fill_price: Decimal) {
        let (symbol, side, delta) = {
            let mut orders = self
                .orders
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let order = orders
                .get_mut(broker_order_id)
                .unwrap_or_else(|| panic!("unknown sim order {broker_order_id}"));
            let delta = filled_quantity - order.filled_quantity;
            order.filled_quantity = filled_quantity;
            order.avg_fill_price = avg_fill_price;
            order.status = if filled_quantity >= order.requested_quantity {
                OrderStatus::Filled
            } else {
                OrderStatus::PartiallyFilled
            };
            (order.symbol.clone(), order.side, delta)
        };
        self.apply_position_delta(&symbol, Decimal::from(side.sign()) * delta, avg_fill_price);
    }

    /// Mark a working order cancelled at the broker (test hook).
    pub fn mark_cancelled(&self, broker_order_id: &str) {
        if let Some(order) = self
            .orders
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(broker_order_id)
        {
            order.status = OrderStatus::Cancelled;
            order.message = "cancelled".to_string();
        }
    }

    /// Mark a working order expired at the broker (test hook).
    pub fn mark_expired(&self, broker_order_id: &str) {
        if let Some(order) = self
            .orders
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get_mut(broker_order_id)
        {
            order.status = OrderStatus::Expired;
            order.message = "expired".to_string();
        }
    }

    fn apply_position_delta(&self, symbol: &str, signed_delta: Decimal, price: Decimal) {
        let mut positions = self
            .positions
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let entry = positions
            .entry(symbol.to_string())
            .or_insert_with(|| BrokerPosition {
                symbol: symbol.to_string(),
                quantity: Decimal::ZERO,
                avg_price: price,
            });
        entry.quantity += signed_delta;
        entry.avg_price = price;
        if entry.quantity.is_zero() {
            positions.remove(symbol);
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl BrokerGateway for SimulatedBroker {
    async fn submit_order(&self, request: &OrderRequest) -> Result<String, BrokerError> {
        if Self::take_failure(&self.transient_failures) {
            return Err(BrokerError::Connection(
                "simulated connection failure".to_string(),
            ));
        }

        let fill_price = match request.order_type {
            OrderType::Limit => request.limit_price,
            OrderType::Market => self
                .last_prices
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .get(&request.symbol)
                .copied(),
        };
        let fill_price = fill_price.ok_or_else(|| {
            BrokerError::Rejected(format!("no reference price for {}", request.symbol))
        })?;

        let id = self.order_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let broker_order_id = format!("sim-{id}");

        let (status, filled, avg) = if self.auto_fill {
            (OrderStatus::Filled, request.quantity, fill_price)
        } else {
            (OrderStatus::Open, Decimal::ZERO, Decimal::ZERO)
        };

        self.orders
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(
                broker_order_id.clone(),
                SimOrder {
                    symbol: request.symbol.clone(),
                    side: request.side,
                    requested_quantity: request.quantity,
                    status,
                    filled_quantity: filled,
                    avg_fill_price: avg,
                    message: String::new(),
                },
            );

        if self.auto_fill {
            self.apply_position_delta(
                &request.symbol,
                Decimal::from(request.side.sign()) * request.quantity,
                fill_price,
            );
        }

        Ok(broker_order_id)
    }

    async fn cancel_order(&self, broker_order_id: &str) -> Result<(), BrokerError> {
        let mut orders = self
            .orders
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let order = orders
            .get_mut(broker_order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(broker_order_id.to_string()))?;
        if order.status.is_terminal() {
            return Err(BrokerError::Rejected(format!(
                "order {broker_order_id} already terminal"
            )));
        }
        order.status = OrderStatus::Cancelled;
        order.message = "cancelled by request".to_string();
        Ok(())
    }

    async fn modify_order(
        &self,
        broker_order_id: &str,
        changes: &OrderChanges,
    ) -> Result<(), BrokerError> {
        let mut orders = self
            .orders
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let order = orders
            .get_mut(broker_order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(broker_order_id.to_string()))?;
        if order.status.is_terminal() {
            return Err(BrokerError::Rejected(format!(
                "order {broker_order_id} already terminal"
            )));
        }
        if let Some(price) = changes.limit_price
            && price <= Decimal::ZERO
        {
            return Err(BrokerError::Rejected(format!(
                "invalid replacement price {price}"
            )));
        }
        if let Some(quantity) = changes.quantity {
            order.requested_quantity = quantity;
        }
        Ok(())
    }

    async fn get_order_status(
        &self,
        broker_order_id: &str,
    ) -> Result<OrderStatusSnapshot, BrokerError> {
        let orders = self
            .orders
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let order = orders
            .get(broker_order_id)
            .ok_or_else(|| BrokerError::UnknownOrder(broker_order_id.to_string()))?;
        Ok(OrderStatusSnapshot {
            broker_order_id: broker_order_id.to_string(),
            status: order.status,
            filled_quantity: order.filled_quantity,
            avg_fill_price: order.avg_fill_price,
            message: order.message.clone(),
        })
    }

    async fn get_positions(&self) -> Result<Vec<BrokerPosition>, BrokerError> {
        if Self::take_failure(&self.position_query_failures) {
            return Err(BrokerError::Connection(
                "simulated position query failure".to_string(),
            ));
        }
        Ok(self
            .positions
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .cloned()
            .collect())
    }

    fn broker_name(&self) -> &'static str {
        "simulated"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderSide, ProductType, TimeInForce};
    use rust_decimal_macros::dec;

    fn make_request(symbol: &str) -> OrderRequest {
        OrderRequest {
            client_request_id: "req-1".to_string(),
            symbol: symbol.to_string(),
            exchange: "NSE".to_string(),
            side: OrderSide::Buy,
            quantity: dec!(10),
            order_type: OrderType::Limit,
            limit_price: Some(dec!(100)),
            product_type: ProductType::Delivery,
            time_in_force: TimeInForce::Day,
            stop_loss: None,
            take_profit: None,
            strategy_id: "s1".to_string(),
        }
    }

    #[tokio::test]
    async fn submit_then_poll() {
        let broker = SimulatedBroker::new();
        let id = broker.submit_order(&make_request("TCS")).await.unwrap();

        let snap = broker.get_order_status(&id).await.unwrap();
        assert_eq!(snap.status, OrderStatus::Open);
        assert_eq!(snap.filled_quantity, Decimal::ZERO);

        broker.fill(&id, dec!(4), dec!(100));
        let snap = broker.get_order_status(&id).await.unwrap();
        assert_eq!(snap.status, OrderStatus::PartiallyFilled);
        assert_eq!(snap.filled_quantity, dec!(4));

        broker.fill(&id, dec!(10), dec!(100));
        let snap = broker.get_order_status(&id).await.unwrap();
        assert_eq!(snap.status, OrderStatus::Filled);
    }

    #[tokio::test]
    async fn auto_fill_updates_positions() {
        let broker = SimulatedBroker::auto_filling();
        broker.submit_order(&make_request("TCS")).await.unwrap();

        let positions = broker.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, dec!(10));
        assert_eq!(positions[0].avg_price, dec!(100));
    }

    #[tokio::test]
    async fn transient_failure_then_success() {
        let broker = SimulatedBroker::new();
        broker.fail_next_submissions(1);

        let err = broker.submit_order(&make_request("TCS")).await.unwrap_err();
        assert!(err.is_retryable());

        assert!(broker.submit_order(&make_request("TCS")).await.is_ok());
    }

    #[tokio::test]
    async fn cancel_terminal_order_is_rejected() {
        let broker = SimulatedBroker::auto_filling();
        let id = broker.submit_order(&make_request("TCS")).await.unwrap();
        assert!(broker.cancel_order(&id).await.is_err());
    }

    #[tokio::test]
    async fn market_order_needs_last_price() {
        let broker = SimulatedBroker::new();
        let mut request = make_request("TCS");
        request.order_type = OrderType::Market;
        request.limit_price = None;

        assert!(broker.submit_order(&request).await.is_err());

        broker.set_last_price("TCS", dec!(101));
        assert!(broker.submit_order(&request).await.is_ok());
    }
}
