//! Order manager: lifecycle owner for every order the ledger places.
//!
//! `place_order` is the only way an order enters the system; cancel/modify
//! re-check the store immediately before the gateway call so a race with the
//! monitoring loop surfaces as a typed error instead of a broker rejection.

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::broker::{BrokerGateway, BrokerRetryPolicy, ExponentialBackoffCalculator};
use crate::config::Config;
use crate::error::EngineError;
use crate::models::{Order, OrderChanges, OrderRequest, OrderStatus};
use crate::observability::metrics;
use crate::persistence::OrderArchive;
use crate::positions::PositionManager;
use crate::risk::{KillSwitch, RiskMonitor};
use crate::validation::{PreTradeValidator, ValidationContext};

use super::store::OrderStore;

/// Owns order creation, submission, cancellation, and modification.
pub struct OrderManager {
    store: Arc<OrderStore>,
    archive: Arc<OrderArchive>,
    gateway: Arc<dyn BrokerGateway>,
    validator: PreTradeValidator,
    positions: Arc<PositionManager>,
    risk: Arc<RiskMonitor>,
    kill_switch: Arc<KillSwitch>,
    retry_policy: BrokerRetryPolicy,
    submit_permits: Arc<Semaphore>,
}

impl OrderManager {
    /// Wire an order manager from configuration and shared components.
    #[must_use]
    pub fn new(
        config: &Config,
        store: Arc<OrderStore>,
        archive: Arc<OrderArchive>,
        gateway: Arc<dyn BrokerGateway>,
        positions: Arc<PositionManager>,
        risk: Arc<RiskMonitor>,
    ) -> Self {
        let kill_switch = risk.kill_switch();
        Self {
            store,
            archive,
            gateway,
            validator: PreTradeValidator::new(config.validation.clone()),
            positions,
            risk,
            kill_switch,
            retry_policy: BrokerRetryPolicy::default(),
            submit_permits: Arc::new(Semaphore::new(config.loops.submit_concurrency)),
        }
    }

    /// The live order store.
    #[must_use]
    pub fn store(&self) -> Arc<OrderStore> {
        Arc::clone(&self.store)
    }

    /// Validate and submit an order request.
    ///
    /// Idempotent against caller retries on transient gateway errors: a
    /// repeated `client_request_id` returns the already-created order without
    /// touching the broker again.
    ///
    /// # Errors
    ///
    /// `TradingHalted` while the kill switch is active; `ValidationRejected`
    /// with the first failing check; `SubmissionFailed` when the gateway
    /// refuses the order (the order is left `Rejected` with the gateway error
    /// recorded).
    pub async fn place_order(&self, request: OrderRequest) -> Result<Order, EngineError> {
        if self.kill_switch.is_active() {
            return Err(EngineError::TradingHalted {
                reason: self
                    .kill_switch
                    .reason()
                    .unwrap_or_else(|| "kill switch active".to_string()),
            });
        }

        request.validate()?;

        if let Some(existing) = self.store.get_by_request_id(&request.client_request_id) {
            info!(
                order_id = %existing.order_id,
                client_request_id = %request.client_request_id,
                "duplicate request id, returning existing order"
            );
            return Ok(existing);
        }

        let context = self.build_validation_context(&request);
        if let Err(rejected) = self.validator.validate(&request, &context) {
            metrics::record_order_rejected(rejected.check);
            return Err(EngineError::ValidationRejected {
                check: rejected.check.to_string(),
                reason: rejected.reason,
            });
        }

        let mut order = Order::new(request);
        order.transition_to(OrderStatus::Pending)?;
        let order_id = order.order_id.clone();
        self.store.insert(order);

        match self.submit_with_retry(&order_id).await {
            Ok(broker_order_id) => {
                self.store
                    .with_order_mut(&order_id, |order| {
                        order.transition_to(OrderStatus::Submitted)?;
                        order.accept(broker_order_id.clone())
                    })
                    .transpose()?;
                metrics::record_order_submitted();
                info!(order_id = %order_id, broker_order_id = %broker_order_id, "order submitted");
                self.store
                    .get(&order_id)
                    .ok_or_else(|| EngineError::OrderNotFound(order_id))
            }
            Err(gateway_error) => {
                let reason = gateway_error.to_string();
                self.store
                    .with_order_mut(&order_id, |order| order.reject(reason.clone()))
                    .transpose()?;
                if let Some(order) = self.store.get(&order_id) {
                    self.archive.archive(order);
                }
                metrics::record_order_rejected("gateway");
                warn!(order_id = %order_id, error = %reason, "order submission failed");
                Err(EngineError::SubmissionFailed(reason))
            }
        }
    }

    /// Request cancellation of a working order.
    ///
    /// The terminal transition itself is confirmed by the monitoring loop.
    ///
    /// # Errors
    ///
    /// `OrderNotFound` for an unknown id; `OrderNotCancellable` when the
    /// order is terminal, not yet at the broker, or loses the race with the
    /// monitoring loop; gateway errors pass through.
    pub async fn cancel_order(&self, order_id: &str) -> Result<(), EngineError> {
        let order = self
            .store
            .get(order_id)
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        let Some(broker_order_id) = order.broker_order_id.clone() else {
            return Err(EngineError::OrderNotCancellable {
                order_id: order_id.to_string(),
                status: order.status,
            });
        };
        if !order.status.is_active() {
            return Err(EngineError::OrderNotCancellable {
                order_id: order_id.to_string(),
                status: order.status,
            });
        }

        self.gateway.cancel_order(&broker_order_id).await?;
        info!(order_id, broker_order_id = %broker_order_id, "cancellation requested");
        Ok(())
    }

    /// Modify price, quantity, or trigger price of an open order.
    ///
    /// # Errors
    ///
    /// `OrderNotFound` for an unknown id; `OrderNotModifiable` unless the
    /// order is `Open`; gateway errors pass through.
    pub async fn modify_order(
        &self,
        order_id: &str,
        changes: OrderChanges,
    ) -> Result<Order, EngineError> {
        let order = self
            .store
            .get(order_id)
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))?;

        // Modification is only permitted while the order is open and unfilled.
        if order.status != OrderStatus::Open {
            return Err(EngineError::OrderNotModifiable {
                order_id: order_id.to_string(),
                status: order.status,
            });
        }
        let Some(broker_order_id) = order.broker_order_id.clone() else {
            return Err(EngineError::OrderNotModifiable {
                order_id: order_id.to_string(),
                status: order.status,
            });
        };

        if !changes.is_empty() {
            self.gateway.modify_order(&broker_order_id, &changes).await?;
            self.store
                .with_order_mut(order_id, |order| order.apply_changes(&changes));
            info!(order_id, "order modified");
        }

        self.store
            .get(order_id)
            .ok_or_else(|| EngineError::OrderNotFound(order_id.to_string()))
    }

    /// Submit to the gateway, retrying transient errors with backoff under
    /// the bounded concurrency semaphore.
    async fn submit_with_retry(
        &self,
        order_id: &str,
    ) -> Result<String, crate::broker::BrokerError> {
        let order = self.store.get(order_id).ok_or_else(|| {
            crate::broker::BrokerError::Rejected(format!("order {order_id} disappeared"))
        })?;

        // Permit scope covers every attempt so retries cannot amplify the
        // gateway call rate.
        let _permit = self
            .submit_permits
            .acquire()
            .await
            .map_err(|_| crate::broker::BrokerError::Connection("submission pool closed".to_string()))?;

        let mut backoff = ExponentialBackoffCalculator::new(&self.retry_policy);
        let mut attempt = 1;
        loop {
            match self.gateway.submit_order(&order.request).await {
                Ok(broker_order_id) => return Ok(broker_order_id),
                Err(error) if error.is_retryable() && attempt < self.retry_policy.max_attempts => {
                    let delay = backoff.next_backoff();
                    warn!(
                        order_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient submission failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn build_validation_context(&self, request: &OrderRequest) -> ValidationContext {
        let summary = self.risk.risk_summary();
        let gross_exposure = self.positions.gross_exposure();
        ValidationContext {
            account_equity: summary.account_value,
            available_cash: (summary.account_value - gross_exposure).max(Decimal::ZERO),
            open_position_count: summary.open_positions,
            daily_pnl: summary.daily_pnl,
            last_traded_price: self.positions.last_price(&request.symbol),
        }
    }
}
