// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Ledger Engine - Rust Core Library
//!
//! The order and position ledger of the automated trading client. It accepts
//! order requests from a strategy layer, submits them to the broker, tracks
//! their lifecycle to completion, maintains the authoritative local view of
//! open positions and realized/unrealized P&L, and continuously reconciles
//! that view against the broker's own record.
//!
//! # Components
//!
//! - [`validation`]: pre-trade validator, an ordered fail-fast check chain
//! - [`orders`]: order store, order manager, and the monitoring loop
//! - [`positions`]: position manager with average-price fill accounting
//! - [`risk`]: real-time risk monitor and the kill switch
//! - [`reconciliation`]: periodic broker diff with an append-only
//!   discrepancy log
//! - [`broker`]: the gateway trait, retry policy, and an in-process
//!   simulator
//!
//! # Concurrency
//!
//! Three background loops (order monitoring, risk, reconciliation) run as
//! independent tokio tasks against shared stores whose mutation is
//! serialized per record under write locks. All loops stop cleanly on a
//! broadcast shutdown signal, finishing the in-flight iteration first.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// Broker gateway contract, retry policy, and simulator.
pub mod broker;

/// Configuration loading and validation.
pub mod config;

/// Engine error taxonomy.
pub mod error;

/// Core data model: orders, positions, trades, risk.
pub mod models;

/// Order lifecycle ownership.
pub mod orders;

/// In-memory persistence for trades and archived orders.
pub mod persistence;

/// Position accounting.
pub mod positions;

/// Periodic reconciliation against the broker.
pub mod reconciliation;

/// Risk monitoring and the kill switch.
pub mod risk;

/// Pre-trade validation.
pub mod validation;

/// Tracing and metrics initialization.
pub mod observability;

pub use broker::{BrokerError, BrokerGateway, BrokerPosition, OrderStatusSnapshot, SimulatedBroker};
pub use config::{Config, load_config};
pub use error::EngineError;
pub use models::{
    Order, OrderChanges, OrderRequest, OrderSide, OrderStatus, OrderType, Position, RiskSummary,
    TradeRecord,
};
pub use orders::{OrderManager, OrderMonitor, OrderStore};
pub use persistence::{OrderArchive, TradeLog};
pub use positions::PositionManager;
pub use reconciliation::{DiscrepancyLog, Reconciler};
pub use risk::{KillSwitch, RiskMonitor};
pub use validation::{PreTradeValidator, ValidationContext};
