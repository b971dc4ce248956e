//! Ledger Engine Binary
//!
//! Starts the ledger engine against the in-process simulated broker (paper
//! mode) and runs the three background loops until Ctrl-C.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ledger-engine
//! ```
//!
//! # Environment Variables
//!
//! - `LEDGER_CONFIG`: path to a YAML config file (optional; defaults apply)
//! - `METRICS_ADDR`: Prometheus listener address (optional, e.g. `0.0.0.0:9090`)
//! - `RUST_LOG`: log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::broadcast;

use ledger_engine::broker::{BrokerGateway, SimulatedBroker};
use ledger_engine::config::load_config;
use ledger_engine::observability;
use ledger_engine::orders::{OrderManager, OrderMonitor, OrderStore};
use ledger_engine::persistence::{OrderArchive, TradeLog};
use ledger_engine::positions::PositionManager;
use ledger_engine::reconciliation::{DiscrepancyLog, Reconciler};
use ledger_engine::risk::{KillSwitch, RiskMonitor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_tracing();

    let config_path = std::env::var("LEDGER_CONFIG").ok();
    let config = load_config(config_path.as_deref()).context("loading configuration")?;

    if let Ok(addr) = std::env::var("METRICS_ADDR") {
        let addr = addr.parse().context("parsing METRICS_ADDR")?;
        observability::metrics::init_metrics(addr).context("starting metrics exporter")?;
    }

    tracing::info!(
        starting_equity = %config.account.starting_equity,
        "starting ledger engine (paper mode, simulated broker)"
    );

    let gateway: Arc<dyn BrokerGateway> = Arc::new(SimulatedBroker::new());
    let store = Arc::new(OrderStore::new());
    let archive = Arc::new(OrderArchive::new());
    let positions = Arc::new(PositionManager::new());
    let trades = Arc::new(TradeLog::new());
    let discrepancies = Arc::new(DiscrepancyLog::new());

    let kill_switch = Arc::new(KillSwitch::new(config.risk.kill_switch_confirmation.clone()));
    let risk = Arc::new(RiskMonitor::new(
        config.risk.clone(),
        config.account.starting_equity,
        Arc::clone(&positions),
        kill_switch,
    ));

    let _manager = OrderManager::new(
        &config,
        Arc::clone(&store),
        Arc::clone(&archive),
        Arc::clone(&gateway),
        Arc::clone(&positions),
        Arc::clone(&risk),
    );

    let monitor = Arc::new(OrderMonitor::new(
        Arc::clone(&store),
        Arc::clone(&archive),
        Arc::clone(&gateway),
        Arc::clone(&positions),
        Arc::clone(&trades),
    ));
    let reconciler = Arc::new(Reconciler::new(
        Arc::clone(&gateway),
        Arc::clone(&positions),
        Arc::clone(&discrepancies),
    ));

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let monitor_handle = tokio::spawn(monitor.run(
        Duration::from_millis(config.loops.order_monitor_interval_ms),
        shutdown_tx.subscribe(),
    ));
    let risk_handle = tokio::spawn(Arc::clone(&risk).run(
        Duration::from_millis(config.loops.risk_interval_ms),
        shutdown_tx.subscribe(),
    ));
    let reconcile_handle = tokio::spawn(reconciler.run(
        Duration::from_secs(config.loops.reconcile_interval_secs),
        shutdown_tx.subscribe(),
    ));

    tracing::info!("ledger engine running; press Ctrl-C to stop");
    signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("shutdown signal received");

    let _ = shutdown_tx.send(());
    let _ = tokio::join!(monitor_handle, risk_handle, reconcile_handle);

    tracing::info!(
        orders = store.len(),
        trades = trades.len(),
        discrepancies = discrepancies.len(),
        "ledger engine stopped"
    );
    Ok(())
}
