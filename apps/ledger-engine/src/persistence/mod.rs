//! In-memory persistence for trades and archived orders.
//!
//! The trade log is append-only (one immutable row per fill); the order
//! archive receives orders once they reach a terminal state and never
//! mutates them again.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::{Order, TradeRecord};

/// Append-only log of executed fills.
#[derive(Debug, Default)]
pub struct TradeLog {
    trades: RwLock<Vec<TradeRecord>>,
}

impl TradeLog {
    /// Create an empty trade log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one trade.
    pub fn append(&self, trade: TradeRecord) {
        self.trades
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(trade);
    }

    /// All trades recorded so far, in append order.
    #[must_use]
    pub fn all(&self) -> Vec<TradeRecord> {
        self.trades
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Trades for one order, in append order.
    #[must_use]
    pub fn for_order(&self, order_id: &str) -> Vec<TradeRecord> {
        self.trades
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|t| t.order_id == order_id)
            .cloned()
            .collect()
    }

    /// Number of trades recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.trades
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// True when no trades have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Frozen storage for terminal orders.
#[derive(Debug, Default)]
pub struct OrderArchive {
    orders: RwLock<HashMap<String, Order>>,
}

impl OrderArchive {
    /// Create an empty archive.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Archive a terminal order. Later archivals of the same id are ignored;
    /// the first frozen copy wins.
    pub fn archive(&self, order: Order) {
        debug_assert!(order.status.is_terminal());
        self.orders
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .entry(order.order_id.clone())
            .or_insert(order);
    }

    /// Fetch an archived order.
    #[must_use]
    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.orders
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(order_id)
            .cloned()
    }

    /// Number of archived orders.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// True when the archive is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
