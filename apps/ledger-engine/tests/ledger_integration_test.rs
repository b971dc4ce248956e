//! End-to-end tests over the full ledger stack with the simulated broker:
//! order manager, monitoring loop, position accounting, risk monitor, and
//! reconciliation working against one shared set of stores.

use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use ledger_engine::broker::{BrokerGateway, BrokerPosition, SimulatedBroker};
use ledger_engine::config::Config;
use ledger_engine::error::EngineError;
use ledger_engine::models::{
    OrderRequest, OrderSide, OrderStatus, OrderType, ProductType, TimeInForce,
};
use ledger_engine::orders::{OrderManager, OrderMonitor, OrderStore};
use ledger_engine::persistence::{OrderArchive, TradeLog};
use ledger_engine::positions::PositionManager;
use ledger_engine::reconciliation::{DiscrepancyKind, DiscrepancyLog, Reconciler};
use ledger_engine::risk::{KillSwitch, RiskMonitor};

struct Engine {
    manager: OrderManager,
    monitor: OrderMonitor,
    reconciler: Reconciler,
    broker: Arc<SimulatedBroker>,
    store: Arc<OrderStore>,
    positions: Arc<PositionManager>,
    trades: Arc<TradeLog>,
    archive: Arc<OrderArchive>,
    risk: Arc<RiskMonitor>,
    kill_switch: Arc<KillSwitch>,
}

fn engine() -> Engine {
    let config = Config::default();
    let broker = Arc::new(SimulatedBroker::new());
    let gateway: Arc<dyn BrokerGateway> = Arc::clone(&broker) as Arc<dyn BrokerGateway>;
    let store = Arc::new(OrderStore::new());
    let archive = Arc::new(OrderArchive::new());
    let positions = Arc::new(PositionManager::new());
    let trades = Arc::new(TradeLog::new());
    let kill_switch = Arc::new(KillSwitch::new(config.risk.kill_switch_confirmation.clone()));
    let risk = Arc::new(RiskMonitor::new(
        config.risk.clone(),
        config.account.starting_equity,
        Arc::clone(&positions),
        Arc::clone(&kill_switch),
    ));
    let manager = OrderManager::new(
        &config,
        Arc::clone(&store),
        Arc::clone(&archive),
        Arc::clone(&gateway),
        Arc::clone(&positions),
        Arc::clone(&risk),
    );
    let monitor = OrderMonitor::new(
        Arc::clone(&store),
        Arc::clone(&archive),
        Arc::clone(&gateway),
        Arc::clone(&positions),
        Arc::clone(&trades),
    );
    let reconciler = Reconciler::new(
        Arc::clone(&gateway),
        Arc::clone(&positions),
        Arc::new(DiscrepancyLog::new()),
    );
    Engine {
        manager,
        monitor,
        reconciler,
        broker,
        store,
        positions,
        trades,
        archive,
        risk,
        kill_switch,
    }
}

fn buy_request(request_id: &str, qty: Decimal) -> OrderRequest {
    OrderRequest {
        client_request_id: request_id.to_string(),
        symbol: "RELIANCE".to_string(),
        exchange: "NSE".to_string(),
        side: OrderSide::Buy,
        quantity: qty,
        order_type: OrderType::Limit,
        limit_price: Some(dec!(2450)),
        product_type: ProductType::Delivery,
        time_in_force: TimeInForce::Day,
        stop_loss: Some(dec!(2430)),
        take_profit: Some(dec!(2490)),
        strategy_id: "momentum-1".to_string(),
    }
}

fn sell_request(request_id: &str, qty: Decimal, price: Decimal) -> OrderRequest {
    OrderRequest {
        client_request_id: request_id.to_string(),
        symbol: "RELIANCE".to_string(),
        exchange: "NSE".to_string(),
        side: OrderSide::Sell,
        quantity: qty,
        order_type: OrderType::Limit,
        limit_price: Some(price),
        product_type: ProductType::Delivery,
        time_in_force: TimeInForce::Day,
        stop_loss: Some(price + dec!(20)),
        take_profit: Some(price - dec!(40)),
        strategy_id: "momentum-1".to_string(),
    }
}

#[tokio::test]
async fn place_fill_and_partial_close_arithmetic() {
    let e = engine();

    // BUY 100 @ 2450, filled completely.
    let buy = e.manager.place_order(buy_request("req-buy", dec!(100))).await.unwrap();
    let buy_broker_id = buy.broker_order_id.clone().unwrap();
    e.broker.fill(&buy_broker_id, dec!(100), dec!(2450));
    e.monitor.poll_once().await;

    let order = e.store.get(&buy.order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Filled);
    assert_eq!(e.positions.get("RELIANCE").unwrap().quantity, dec!(100));

    // SELL 40 @ 2460: realized 400, 60 left @ 2450.
    let sell = e
        .manager
        .place_order(sell_request("req-sell", dec!(40), dec!(2460)))
        .await
        .unwrap();
    let sell_broker_id = sell.broker_order_id.clone().unwrap();
    e.broker.fill(&sell_broker_id, dec!(40), dec!(2460));
    e.monitor.poll_once().await;

    let position = e.positions.get("RELIANCE").unwrap();
    assert_eq!(position.quantity, dec!(60));
    assert_eq!(position.avg_entry_price, dec!(2450));
    assert_eq!(position.realized_pnl, dec!(400));

    // One trade row per fill delta.
    assert_eq!(e.trades.len(), 2);
    assert_eq!(e.archive.len(), 2);
}

#[tokio::test]
async fn fill_sum_never_exceeds_request_and_filled_iff_complete() {
    let e = engine();
    let order = e.manager.place_order(buy_request("req-1", dec!(100))).await.unwrap();
    let broker_id = order.broker_order_id.clone().unwrap();

    for (cumulative, expect_filled) in [
        (dec!(30), false),
        (dec!(55), false),
        (dec!(99), false),
        (dec!(100), true),
    ] {
        e.broker.fill(&broker_id, cumulative, dec!(2450));
        e.monitor.poll_once().await;
        let order = e.store.get(&order.order_id).unwrap();
        assert!(order.filled_quantity <= order.request.quantity);
        assert_eq!(order.status == OrderStatus::Filled, expect_filled);
    }

    let total: Decimal = e.trades.all().iter().map(|t| t.quantity).sum();
    assert_eq!(total, dec!(100));
}

#[tokio::test]
async fn reduce_then_reverse_decomposes_correctly() {
    let e = engine();

    // Long 10 @ 2450.
    let buy = e.manager.place_order(buy_request("req-buy", dec!(10))).await.unwrap();
    e.broker
        .fill(&buy.broker_order_id.clone().unwrap(), dec!(10), dec!(2450));
    e.monitor.poll_once().await;

    // Sell 15 @ 2460: close 10 (realize 100), open short 5 @ 2460.
    let sell = e
        .manager
        .place_order(sell_request("req-sell", dec!(15), dec!(2460)))
        .await
        .unwrap();
    e.broker
        .fill(&sell.broker_order_id.clone().unwrap(), dec!(15), dec!(2460));
    e.monitor.poll_once().await;

    let position = e.positions.get("RELIANCE").unwrap();
    assert_eq!(position.quantity, dec!(-5));
    assert_eq!(position.avg_entry_price, dec!(2460));
    assert_eq!(position.realized_pnl, dec!(100));
}

#[tokio::test]
async fn zero_quantity_rejected_before_any_gateway_call() {
    let e = engine();
    let err = e
        .manager
        .place_order(buy_request("req-1", Decimal::ZERO))
        .await
        .unwrap_err();

    match err {
        EngineError::ValidationRejected { check, .. } => assert_eq!(check, "quantity_bounds"),
        other => panic!("expected ValidationRejected, got {other}"),
    }
    // The broker saw nothing.
    assert!(e.broker.get_positions().await.unwrap().is_empty());
    assert!(e.store.is_empty());
}

#[tokio::test]
async fn kill_switch_latches_until_operator_deactivation() {
    let e = engine();

    e.kill_switch.activate("manual halt");
    for i in 0..3 {
        let err = e
            .manager
            .place_order(buy_request(&format!("req-{i}"), dec!(10)))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TradingHalted { .. }));
    }

    // Wrong phrase keeps it latched.
    assert!(e.kill_switch.deactivate("please").is_err());
    assert!(matches!(
        e.manager.place_order(buy_request("req-x", dec!(10))).await,
        Err(EngineError::TradingHalted { .. })
    ));

    e.kill_switch.deactivate("RESUME TRADING").unwrap();
    assert!(e.manager.place_order(buy_request("req-y", dec!(10))).await.is_ok());
}

#[tokio::test]
async fn risk_breach_halts_new_orders() {
    let e = engine();

    // Realize a 5% loss directly in the book: 1000 @ 100 sold at 50.
    e.positions.apply_fill("LOSER", OrderSide::Buy, dec!(1000), dec!(100));
    e.positions.apply_fill("LOSER", OrderSide::Sell, dec!(1000), dec!(50));

    e.risk.evaluate();
    assert!(e.kill_switch.is_active());

    let err = e
        .manager
        .place_order(buy_request("req-1", dec!(10)))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::TradingHalted { .. }));
}

#[tokio::test]
async fn reconciliation_converges_to_broker() {
    let e = engine();

    // Local book: long 10 TCS and long 5 GHOST; broker: 12 TCS, 50 SYMBOL-X.
    e.positions.apply_fill("TCS", OrderSide::Buy, dec!(10), dec!(3500));
    e.positions.apply_fill("GHOST", OrderSide::Buy, dec!(5), dec!(100));
    e.broker.set_positions(vec![
        BrokerPosition {
            symbol: "TCS".to_string(),
            quantity: dec!(12),
            avg_price: dec!(3495),
        },
        BrokerPosition {
            symbol: "SYMBOL-X".to_string(),
            quantity: dec!(50),
            avg_price: dec!(10),
        },
    ]);

    let report = e.reconciler.reconcile_once().await.unwrap();
    assert_eq!(report.discrepancies, 3);

    // Converged: every local quantity equals the broker's.
    assert_eq!(e.positions.get("TCS").unwrap().quantity, dec!(12));
    assert_eq!(e.positions.get("SYMBOL-X").unwrap().quantity, dec!(50));
    assert!(e.positions.get("GHOST").unwrap().is_flat());

    let kinds: Vec<DiscrepancyKind> = e
        .reconciler
        .log()
        .all()
        .iter()
        .map(|d| d.kind)
        .collect();
    assert!(kinds.contains(&DiscrepancyKind::QuantityMismatch));
    assert!(kinds.contains(&DiscrepancyKind::BrokerOnly));
    assert!(kinds.contains(&DiscrepancyKind::PhantomLocal));

    // Second pass finds nothing.
    let report = e.reconciler.reconcile_once().await.unwrap();
    assert_eq!(report.discrepancies, 0);
}

#[tokio::test]
async fn cancellation_round_trip_via_monitoring_loop() {
    let e = engine();
    let order = e.manager.place_order(buy_request("req-1", dec!(100))).await.unwrap();

    e.manager.cancel_order(&order.order_id).await.unwrap();
    // Local state is still open until the loop confirms.
    assert_eq!(e.store.get(&order.order_id).unwrap().status, OrderStatus::Open);

    e.monitor.poll_once().await;
    assert_eq!(
        e.store.get(&order.order_id).unwrap().status,
        OrderStatus::Cancelled
    );
    assert!(e.archive.get(&order.order_id).is_some());

    // Cancelling again is a typed race error, not a broker call.
    let err = e.manager.cancel_order(&order.order_id).await.unwrap_err();
    assert!(matches!(err, EngineError::OrderNotCancellable { .. }));
}

#[tokio::test]
async fn risk_summary_reflects_marked_prices() {
    let e = engine();
    let order = e.manager.place_order(buy_request("req-1", dec!(100))).await.unwrap();
    e.broker
        .fill(&order.broker_order_id.clone().unwrap(), dec!(100), dec!(2450));
    e.monitor.poll_once().await;

    e.positions.update_unrealized_pnl("RELIANCE", dec!(2470));
    let summary = e.risk.risk_summary();
    assert_eq!(summary.account_value, dec!(1002000));
    assert_eq!(summary.open_positions, 1);
    assert!(!summary.kill_switch.active);
}
