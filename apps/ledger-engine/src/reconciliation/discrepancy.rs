//! Discrepancy records for reconciliation.
//!
//! Every detected divergence between the local book and the broker is
//! appended here with both values and the action taken, so what happened can
//! always be reconstructed.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Classification of a local-vs-broker divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscrepancyKind {
    /// Broker reports a position the ledger does not have.
    BrokerOnly,
    /// Ledger has an open position the broker does not report.
    PhantomLocal,
    /// Both sides report the symbol but quantities differ.
    QuantityMismatch,
    /// Quantities agree but average entry prices differ.
    AvgPriceMismatch,
}

/// One reconciliation finding, with both values for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discrepancy {
    /// Divergence classification.
    pub kind: DiscrepancyKind,
    /// Instrument symbol.
    pub symbol: String,
    /// Local quantity at detection (None when the ledger had no record).
    pub local_quantity: Option<Decimal>,
    /// Broker quantity at detection (None when the broker had no record).
    pub broker_quantity: Option<Decimal>,
    /// Local average entry price at detection.
    pub local_avg_price: Option<Decimal>,
    /// Broker average entry price at detection.
    pub broker_avg_price: Option<Decimal>,
    /// Resolution action taken.
    pub resolution: String,
    /// Detection timestamp.
    pub detected_at: DateTime<Utc>,
}

/// Append-only log of reconciliation findings.
#[derive(Debug, Default)]
pub struct DiscrepancyLog {
    entries: RwLock<Vec<Discrepancy>>,
}

impl DiscrepancyLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one finding.
    pub fn append(&self, discrepancy: Discrepancy) {
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(discrepancy);
    }

    /// All findings in detection order.
    #[must_use]
    pub fn all(&self) -> Vec<Discrepancy> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Number of findings recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// True when no findings have been recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn log_is_append_only_ordered() {
        let log = DiscrepancyLog::new();
        log.append(Discrepancy {
            kind: DiscrepancyKind::BrokerOnly,
            symbol: "SYMBOL-X".to_string(),
            local_quantity: None,
            broker_quantity: Some(dec!(50)),
            local_avg_price: None,
            broker_avg_price: Some(dec!(10)),
            resolution: "adopted broker position".to_string(),
            detected_at: Utc::now(),
        });
        log.append(Discrepancy {
            kind: DiscrepancyKind::QuantityMismatch,
            symbol: "SYMBOL-Y".to_string(),
            local_quantity: Some(dec!(10)),
            broker_quantity: Some(dec!(12)),
            local_avg_price: Some(dec!(5)),
            broker_avg_price: Some(dec!(5)),
            resolution: "overwrote local quantity".to_string(),
            detected_at: Utc::now(),
        });

        let all = log.all();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].kind, DiscrepancyKind::BrokerOnly);
        assert_eq!(all[1].kind, DiscrepancyKind::QuantityMismatch);
    }
}
