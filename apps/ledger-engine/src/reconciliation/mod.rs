//! Periodic reconciliation of the local position book against the broker.
//!
//! The broker is the authoritative source of truth: on any divergence the
//! local quantity and average price are force-overwritten to the broker's
//! values and the finding is appended to the discrepancy log with both
//! values. Realized P&L history is never rewritten retroactively.

mod discrepancy;

pub use discrepancy::{Discrepancy, DiscrepancyKind, DiscrepancyLog};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::broker::{BrokerGateway, BrokerPosition};
use crate::observability::metrics;
use crate::positions::PositionManager;

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    /// Symbols compared across both books.
    pub symbols_compared: usize,
    /// Discrepancies found and corrected this pass.
    pub discrepancies: usize,
    /// Completion timestamp.
    pub completed_at: chrono::DateTime<Utc>,
}

/// Diffs local open positions against the broker snapshot and corrects the
/// local book.
pub struct Reconciler {
    gateway: Arc<dyn BrokerGateway>,
    positions: Arc<PositionManager>,
    log: Arc<DiscrepancyLog>,
}

impl Reconciler {
    /// Wire a reconciler over the shared components.
    #[must_use]
    pub fn new(
        gateway: Arc<dyn BrokerGateway>,
        positions: Arc<PositionManager>,
        log: Arc<DiscrepancyLog>,
    ) -> Self {
        Self {
            gateway,
            positions,
            log,
        }
    }

    /// The append-only discrepancy log.
    #[must_use]
    pub fn log(&self) -> Arc<DiscrepancyLog> {
        Arc::clone(&self.log)
    }

    /// Run the periodic loop until shutdown. A failed gateway fetch abandons
    /// the tick without touching local state.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(
            interval_secs = interval.as_secs(),
            "reconciliation loop started"
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.reconcile_once().await {
                        Ok(report) => {
                            if report.discrepancies > 0 {
                                warn!(
                                    discrepancies = report.discrepancies,
                                    symbols = report.symbols_compared,
                                    "reconciliation corrected local state"
                                );
                            }
                        }
                        Err(error) => {
                            warn!(error = %error, "reconciliation tick failed, retrying next tick");
                        }
                    }
                }
                _ = shutdown.recv() => {
                    info!("reconciliation loop shutting down");
                    break;
                }
            }
        }
    }

    /// One reconciliation pass.
    ///
    /// # Errors
    ///
    /// Returns the gateway error when the broker position snapshot cannot be
    /// fetched; local state is left untouched in that case.
    pub async fn reconcile_once(&self) -> Result<ReconciliationReport, crate::broker::BrokerError> {
        let broker_positions = self.gateway.get_positions().await?;
        let broker_map: HashMap<&str, &BrokerPosition> = broker_positions
            .iter()
            .map(|p| (p.symbol.as_str(), p))
            .collect();

        let local_open = self.positions.open_positions();
        let mut discrepancies = 0;

        // Broker side: adopt unknowns, correct mismatches.
        for broker_pos in &broker_positions {
            match local_open.iter().find(|p| p.symbol == broker_pos.symbol) {
                None => {
                    self.record(PendingDiscrepancy {
                        kind: DiscrepancyKind::BrokerOnly,
                        symbol: broker_pos.symbol.clone(),
                        local_quantity: None,
                        broker_quantity: Some(broker_pos.quantity),
                        local_avg_price: None,
                        broker_avg_price: Some(broker_pos.avg_price),
                        resolution: "created local position from broker values".to_string(),
                    });
                    self.positions.force_overwrite(
                        &broker_pos.symbol,
                        broker_pos.quantity,
                        broker_pos.avg_price,
                    );
                    discrepancies += 1;
                }
                Some(local) if local.quantity != broker_pos.quantity => {
                    self.record(PendingDiscrepancy {
                        kind: DiscrepancyKind::QuantityMismatch,
                        symbol: broker_pos.symbol.clone(),
                        local_quantity: Some(local.quantity),
                        broker_quantity: Some(broker_pos.quantity),
                        local_avg_price: Some(local.avg_entry_price),
                        broker_avg_price: Some(broker_pos.avg_price),
                        resolution: "overwrote local quantity and average price from broker"
                            .to_string(),
                    });
                    self.positions.force_overwrite(
                        &broker_pos.symbol,
                        broker_pos.quantity,
                        broker_pos.avg_price,
                    );
                    discrepancies += 1;
                }
                Some(local) if local.avg_entry_price != broker_pos.avg_price => {
                    self.record(PendingDiscrepancy {
                        kind: DiscrepancyKind::AvgPriceMismatch,
                        symbol: broker_pos.symbol.clone(),
                        local_quantity: Some(local.quantity),
                        broker_quantity: Some(broker_pos.quantity),
                        local_avg_price: Some(local.avg_entry_price),
                        broker_avg_price: Some(broker_pos.avg_price),
                        resolution: "overwrote local average price from broker".to_string(),
                    });
                    self.positions.force_overwrite(
                        &broker_pos.symbol,
                        broker_pos.quantity,
                        broker_pos.avg_price,
                    );
                    discrepancies += 1;
                }
                Some(_) => {}
            }
        }

        // Local side: clear phantoms the broker does not know.
        for local in &local_open {
            if !broker_map.contains_key(local.symbol.as_str()) {
                self.record(PendingDiscrepancy {
                    kind: DiscrepancyKind::PhantomLocal,
                    symbol: local.symbol.clone(),
                    local_quantity: Some(local.quantity),
                    broker_quantity: None,
                    local_avg_price: Some(local.avg_entry_price),
                    broker_avg_price: None,
                    resolution: "cleared phantom local position".to_string(),
                });
                self.positions
                    .force_overwrite(&local.symbol, Decimal::ZERO, Decimal::ZERO);
                discrepancies += 1;
            }
        }

        let symbols_compared = broker_map.len()
            + local_open
                .iter()
                .filter(|p| !broker_map.contains_key(p.symbol.as_str()))
                .count();

        Ok(ReconciliationReport {
            symbols_compared,
            discrepancies,
            completed_at: Utc::now(),
        })
    }

    fn record(&self, finding: PendingDiscrepancy) {
        metrics::record_discrepancy(kind_label(finding.kind));
        warn!(
            symbol = %finding.symbol,
            kind = ?finding.kind,
            local_qty = ?finding.local_quantity,
            broker_qty = ?finding.broker_quantity,
            resolution = %finding.resolution,
            "reconciliation discrepancy"
        );
        self.log.append(Discrepancy {
            kind: finding.kind,
            symbol: finding.symbol,
            local_quantity: finding.local_quantity,
            broker_quantity: finding.broker_quantity,
            local_avg_price: finding.local_avg_price,
            broker_avg_price: finding.broker_avg_price,
            resolution: finding.resolution,
            detected_at: Utc::now(),
        });
    }
}

/// A discrepancy before the detection timestamp is stamped.
struct PendingDiscrepancy {
    kind: DiscrepancyKind,
    symbol: String,
    local_quantity: Option<Decimal>,
    broker_quantity: Option<Decimal>,
    local_avg_price: Option<Decimal>,
    broker_avg_price: Option<Decimal>,
    resolution: String,
}

const fn kind_label(kind: DiscrepancyKind) -> &'static str {
    match kind {
        DiscrepancyKind::BrokerOnly => "broker_only",
        DiscrepancyKind::PhantomLocal => "phantom_local",
        DiscrepancyKind::QuantityMismatch => "quantity_mismatch",
        DiscrepancyKind::AvgPriceMismatch => "avg_price_mismatch",
    }
}
