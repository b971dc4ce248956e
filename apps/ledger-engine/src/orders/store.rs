//! Live order storage.
//!
//! All mutation happens under the write lock through [`OrderStore::with_order_mut`],
//! giving single-writer discipline per record: a monitoring-loop update and a
//! foreground cancel can never interleave on the same order.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::models::Order;

/// Orders indexed by local id, with secondary indexes for the broker id and
/// the caller's idempotency key.
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: RwLock<HashMap<String, Order>>,
    broker_id_index: RwLock<HashMap<String, String>>,
    request_id_index: RwLock<HashMap<String, String>>,
}

impl OrderStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new order, registering its idempotency key.
    pub fn insert(&self, order: Order) {
        let order_id = order.order_id.clone();
        self.request_id_index
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(order.request.client_request_id.clone(), order_id.clone());
        if let Some(broker_id) = &order.broker_order_id {
            self.broker_id_index
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(broker_id.clone(), order_id.clone());
        }
        self.orders
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(order_id, order);
    }

    /// Fetch a copy of an order by local id.
    #[must_use]
    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.orders
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(order_id)
            .cloned()
    }

    /// Fetch a copy of an order by broker id.
    #[must_use]
    pub fn get_by_broker_id(&self, broker_order_id: &str) -> Option<Order> {
        let order_id = self
            .broker_id_index
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(broker_order_id)
            .cloned()?;
        self.get(&order_id)
    }

    /// Fetch a copy of an order by the caller's idempotency key.
    #[must_use]
    pub fn get_by_request_id(&self, client_request_id: &str) -> Option<Order> {
        let order_id = self
            .request_id_index
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(client_request_id)
            .cloned()?;
        self.get(&order_id)
    }

    /// Mutate one order atomically under the write lock.
    ///
    /// The broker-id index is refreshed afterwards so an id assigned inside
    /// the closure becomes queryable. Returns `None` for an unknown order.
    pub fn with_order_mut<R>(
        &self,
        order_id: &str,
        mutate: impl FnOnce(&mut Order) -> R,
    ) -> Option<R> {
        let mut orders = self
            .orders
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let order = orders.get_mut(order_id)?;
        let result = mutate(order);
        if let Some(broker_id) = order.broker_order_id.clone() {
            self.broker_id_index
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .insert(broker_id, order_id.to_string());
        }
        Some(result)
    }

    /// Copies of all non-terminal orders that carry a broker id (i.e. the
    /// monitoring loop's work list).
    #[must_use]
    pub fn active_orders(&self) -> Vec<Order> {
        self.orders
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .values()
            .filter(|o| o.status.is_active() && o.broker_order_id.is_some())
            .cloned()
            .collect()
    }

    /// Total number of orders held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.orders
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// True when the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
