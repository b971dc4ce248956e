//! Order monitoring loop.
//!
//! Polls the gateway for every non-terminal order on a fixed short interval,
//! turns cumulative fill figures into deltas, and fans each delta out to the
//! position manager and trade log before the order's own bookkeeping moves.
//! Gateway failures are logged and retried next tick; they never mark an
//! order terminal.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::broker::{BrokerGateway, OrderStatusSnapshot};
use crate::models::{Order, OrderStatus, TradeRecord};
use crate::observability::metrics;
use crate::persistence::{OrderArchive, TradeLog};
use crate::positions::PositionManager;

use super::store::OrderStore;

/// Background poller that drives order lifecycle from broker status.
pub struct OrderMonitor {
    store: Arc<OrderStore>,
    archive: Arc<OrderArchive>,
    gateway: Arc<dyn BrokerGateway>,
    positions: Arc<PositionManager>,
    trades: Arc<TradeLog>,
}

impl OrderMonitor {
    /// Wire a monitor over the shared components.
    #[must_use]
    pub fn new(
        store: Arc<OrderStore>,
        archive: Arc<OrderArchive>,
        gateway: Arc<dyn BrokerGateway>,
        positions: Arc<PositionManager>,
        trades: Arc<TradeLog>,
    ) -> Self {
        Self {
            store,
            archive,
            gateway,
            positions,
            trades,
        }
    }

    /// Run the polling loop until shutdown. The in-flight iteration always
    /// completes before the loop exits.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_ms = interval.as_millis() as u64,
            "order monitor started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once().await;
                }
                _ = shutdown.recv() => {
                    info!("order monitor shutting down");
                    break;
                }
            }
        }
    }

    /// One polling pass over all active orders. Returns the number of orders
    /// whose state changed.
    pub async fn poll_once(&self) -> usize {
        let active = self.store.active_orders();
        let mut changed = 0;

        for order in active {
            let Some(broker_order_id) = order.broker_order_id.clone() else {
                continue;
            };
            match self.gateway.get_order_status(&broker_order_id).await {
                Ok(snapshot) => {
                    if self.apply_snapshot(&order, &snapshot) {
                        changed += 1;
                    }
                }
                Err(error) => {
                    warn!(
                        order_id = %order.order_id,
                        broker_order_id = %broker_order_id,
                        error = %error,
                        "status poll failed, retrying next tick"
                    );
                }
            }
        }

        changed
    }

    /// Apply one broker snapshot to the local order. Returns true when the
    /// order changed.
    fn apply_snapshot(&self, order: &Order, snapshot: &OrderStatusSnapshot) -> bool {
        let mut changed = false;

        let fill_delta = snapshot.filled_quantity - order.filled_quantity;
        if fill_delta > Decimal::ZERO {
            self.apply_fill_delta(order, snapshot, fill_delta);
            changed = true;
        }

        if let Some(terminal) = Self::terminal_target(order.status, snapshot.status) {
            let applied = self.store.with_order_mut(&order.order_id, |local| {
                let result = match terminal {
                    OrderStatus::Cancelled => local.cancel(snapshot.message.clone()),
                    OrderStatus::Rejected => local.reject(snapshot.message.clone()),
                    OrderStatus::Expired => local.expire(),
                    _ => Ok(()),
                };
                (result, local.clone())
            });
            match applied {
                Some((Ok(()), local)) => {
                    info!(
                        order_id = %order.order_id,
                        status = %local.status,
                        "order reached terminal state at broker"
                    );
                    self.archive.archive(local);
                    changed = true;
                }
                Some((Err(error), _)) => {
                    // Lost a race with another terminal transition this tick.
                    debug!(order_id = %order.order_id, %error, "terminal transition skipped");
                }
                None => {}
            }
        }

        changed
    }

    /// Fan one fill delta out: position book first, then the trade log, then
    /// the order's own fill bookkeeping; an order never appears filled
    /// without the corresponding position mutation.
    fn apply_fill_delta(
        &self,
        order: &Order,
        snapshot: &OrderStatusSnapshot,
        fill_delta: Decimal,
    ) {
        let delta_price = Self::delta_price(order, snapshot, fill_delta);

        let application = self.positions.apply_fill(
            &order.request.symbol,
            order.request.side,
            fill_delta,
            delta_price,
        );

        self.trades.append(TradeRecord::new(
            order.order_id.clone(),
            order.request.symbol.clone(),
            order.request.side,
            fill_delta,
            delta_price,
            order.request.strategy_id.clone(),
        ));
        metrics::record_fill_applied();

        let recorded = self.store.with_order_mut(&order.order_id, |local| {
            let result = local.record_fill(snapshot.filled_quantity, snapshot.avg_fill_price);
            (result, local.clone())
        });
        match recorded {
            Some((Ok(()), local)) => {
                info!(
                    order_id = %order.order_id,
                    symbol = %order.request.symbol,
                    fill_delta = %fill_delta,
                    price = %delta_price,
                    cumulative = %snapshot.filled_quantity,
                    outcome = ?application.outcome,
                    "fill applied"
                );
                if local.status == OrderStatus::Filled {
                    metrics::record_order_filled();
                    self.archive.archive(local);
                }
            }
            Some((Err(error), _)) => {
                warn!(order_id = %order.order_id, %error, "fill bookkeeping refused");
            }
            None => {}
        }
    }

    /// Price of this delta, recovered from the cumulative averages:
    /// `(new_avg * new_qty - old_avg * old_qty) / delta`.
    fn delta_price(order: &Order, snapshot: &OrderStatusSnapshot, fill_delta: Decimal) -> Decimal {
        if order.filled_quantity.is_zero() {
            return snapshot.avg_fill_price;
        }
        let new_notional = snapshot.avg_fill_price * snapshot.filled_quantity;
        let old_notional = order.avg_fill_price * order.filled_quantity;
        (new_notional - old_notional) / fill_delta
    }

    /// Map a broker-reported terminal status onto the local order, ignoring
    /// snapshots that carry no terminal news.
    fn terminal_target(local: OrderStatus, broker: OrderStatus) -> Option<OrderStatus> {
        if local.is_terminal() {
            return None;
        }
        match broker {
            OrderStatus::Cancelled | OrderStatus::Rejected | OrderStatus::Expired => Some(broker),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::SimulatedBroker;
    use crate::models::{OrderRequest, OrderSide, OrderType, ProductType, TimeInForce};
    use rust_decimal_macros::dec;

    struct Fixture {
        monitor: OrderMonitor,
        store: Arc<OrderStore>,
        broker: Arc<SimulatedBroker>,
        positions: Arc<PositionManager>,
        trades: Arc<TradeLog>,
        archive: Arc<OrderArchive>,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(OrderStore::new());
        let archive = Arc::new(OrderArchive::new());
        let broker = Arc::new(SimulatedBroker::new());
        let positions = Arc::new(PositionManager::new());
        let trades = Arc::new(TradeLog::new());
        let monitor = OrderMonitor::new(
            Arc::clone(&store),
            Arc::clone(&archive),
            Arc::clone(&broker) as Arc<dyn BrokerGateway>,
            Arc::clone(&positions),
            Arc::clone(&trades),
        );
        Fixture {
            monitor,
            store,
            broker,
            positions,
            trades,
            archive,
        }
    }

    fn make_request(symbol: &str, side: OrderSide, qty: Decimal, price: Decimal) -> OrderRequest {
        OrderRequest {
            client_request_id: format!("req-{symbol}-{side:?}-{qty}"),
            symbol: symbol.to_string(),
            exchange: "NSE".to_string(),
            side,
            quantity: qty,
            order_type: OrderType::Limit,
            limit_price: Some(price),
            product_type: ProductType::Delivery,
            time_in_force: TimeInForce::Day,
            stop_loss: None,
            take_profit: None,
            strategy_id: "s1".to_string(),
        }
    }

    /// Submit an order straight through the store + simulator, bypassing the
    /// manager, and return (order_id, broker_order_id).
    async fn submit(f: &Fixture, request: OrderRequest) -> (String, String) {
        let broker_id = f.broker.submit_order(&request).await.unwrap();
        let mut order = Order::new(request);
        order.transition_to(OrderStatus::Pending).unwrap();
        order.transition_to(OrderStatus::Submitted).unwrap();
        order.accept(broker_id.clone()).unwrap();
        let order_id = order.order_id.clone();
        f.store.insert(order);
        (order_id, broker_id)
    }

    #[tokio::test]
    async fn partial_then_complete_fill() {
        let f = fixture();
        let request = make_request("RELIANCE", OrderSide::Buy, dec!(100), dec!(2450));
        let (order_id, broker_id) = submit(&f, request).await;

        f.broker.fill(&broker_id, dec!(40), dec!(2450));
        assert_eq!(f.monitor.poll_once().await, 1);

        let order = f.store.get(&order_id).unwrap();
        assert_eq!(order.status, OrderStatus::PartiallyFilled);
        assert_eq!(order.filled_quantity, dec!(40));
        assert_eq!(f.trades.len(), 1);
        assert_eq!(f.positions.get("RELIANCE").unwrap().quantity, dec!(40));

        f.broker.fill(&broker_id, dec!(100), dec!(2450));
        assert_eq!(f.monitor.poll_once().await, 1);

        let order = f.store.get(&order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Filled);
        assert_eq!(f.trades.len(), 2);
        assert_eq!(f.positions.get("RELIANCE").unwrap().quantity, dec!(100));
        assert!(f.archive.get(&order_id).is_some());
    }

    #[tokio::test]
    async fn fill_delta_applied_exactly_once() {
        let f = fixture();
        let request = make_request("TCS", OrderSide::Buy, dec!(50), dec!(3500));
        let (_, broker_id) = submit(&f, request).await;

        f.broker.fill(&broker_id, dec!(50), dec!(3500));
        f.monitor.poll_once().await;
        // Re-polling the same terminal snapshot must not double-apply.
        f.monitor.poll_once().await;

        assert_eq!(f.trades.len(), 1);
        assert_eq!(f.positions.get("TCS").unwrap().quantity, dec!(50));
    }

    #[tokio::test]
    async fn delta_price_recovers_second_fill_price() {
        let f = fixture();
        let request = make_request("INFY", OrderSide::Buy, dec!(20), dec!(1500));
        let (_, broker_id) = submit(&f, request).await;

        // First 10 at 1500.
        f.broker.fill(&broker_id, dec!(10), dec!(1500));
        f.monitor.poll_once().await;
        // Next 10 at 1510: cumulative avg 1505.
        f.broker.fill(&broker_id, dec!(20), dec!(1505));
        f.monitor.poll_once().await;

        let trades = f.trades.all();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].price, dec!(1500));
        assert_eq!(trades[1].price, dec!(1510));
        // Position average matches the broker's cumulative average.
        assert_eq!(f.positions.get("INFY").unwrap().avg_entry_price, dec!(1505));
    }

    #[tokio::test]
    async fn broker_cancellation_confirmed() {
        let f = fixture();
        let request = make_request("TCS", OrderSide::Buy, dec!(50), dec!(3500));
        let (order_id, broker_id) = submit(&f, request).await;

        f.broker.mark_cancelled(&broker_id);
        assert_eq!(f.monitor.poll_once().await, 1);

        let order = f.store.get(&order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(f.archive.get(&order_id).is_some());
        // No fills, no position.
        assert!(f.positions.get("TCS").is_none());
    }

    #[tokio::test]
    async fn broker_expiry_confirmed() {
        let f = fixture();
        let request = make_request("TCS", OrderSide::Buy, dec!(50), dec!(3500));
        let (order_id, broker_id) = submit(&f, request).await;

        f.broker.mark_expired(&broker_id);
        f.monitor.poll_once().await;

        assert_eq!(f.store.get(&order_id).unwrap().status, OrderStatus::Expired);
    }

    #[tokio::test]
    async fn gateway_error_leaves_order_untouched() {
        let f = fixture();
        let request = make_request("TCS", OrderSide::Buy, dec!(50), dec!(3500));
        let (order_id, broker_id) = submit(&f, request).await;

        // Unknown-order error from a fresh simulator standing in for an
        // outage: drop the simulator's record.
        drop(broker_id);
        let poisoned = Arc::new(SimulatedBroker::new());
        let monitor = OrderMonitor::new(
            Arc::clone(&f.store),
            Arc::clone(&f.archive),
            poisoned as Arc<dyn BrokerGateway>,
            Arc::clone(&f.positions),
            Arc::clone(&f.trades),
        );

        assert_eq!(monitor.poll_once().await, 0);
        let order = f.store.get(&order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Open);
        assert!(f.trades.is_empty());
    }

    #[tokio::test]
    async fn fill_before_cancel_in_same_snapshot() {
        let f = fixture();
        let request = make_request("TCS", OrderSide::Buy, dec!(50), dec!(3500));
        let (order_id, broker_id) = submit(&f, request).await;

        // Partial fill, then cancelled with the fill still reflected.
        f.broker.fill(&broker_id, dec!(20), dec!(3500));
        f.broker.mark_cancelled(&broker_id);
        f.monitor.poll_once().await;

        let order = f.store.get(&order_id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert_eq!(order.filled_quantity, dec!(20));
        assert_eq!(f.positions.get("TCS").unwrap().quantity, dec!(20));
    }
}
