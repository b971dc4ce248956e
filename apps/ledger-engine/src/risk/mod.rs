//! Real-time risk monitoring and the kill switch.
//!
//! The monitor periodically recomputes the account-level [`RiskSummary`] and
//! walks each metric up a severity ladder; a Critical breach engages the
//! kill switch, which blocks all new order submission until an operator
//! deactivates it with the configured confirmation phrase.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::RiskThresholds;
use crate::models::{KillSwitchStatus, RiskAlert, RiskSeverity, RiskSummary};
use crate::observability::metrics;
use crate::positions::PositionManager;

/// Kill-switch operation errors.
#[derive(Debug, Error)]
pub enum KillSwitchError {
    /// The confirmation phrase did not match.
    #[error("kill-switch deactivation refused: confirmation phrase mismatch")]
    BadConfirmation,
    /// Deactivation requested while the switch is not active.
    #[error("kill switch is not active")]
    NotActive,
}

/// Global trading halt flag.
///
/// Activation is idempotent; the first reason and timestamp are kept.
#[derive(Debug)]
pub struct KillSwitch {
    active: AtomicBool,
    state: RwLock<Option<(String, DateTime<Utc>)>>,
    confirmation_phrase: String,
}

impl KillSwitch {
    /// Create a disengaged kill switch.
    #[must_use]
    pub fn new(confirmation_phrase: impl Into<String>) -> Self {
        Self {
            active: AtomicBool::new(false),
            state: RwLock::new(None),
            confirmation_phrase: confirmation_phrase.into(),
        }
    }

    /// True while trading is halted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// The recorded activation reason, when active.
    #[must_use]
    pub fn reason(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .as_ref()
            .map(|(reason, _)| reason.clone())
    }

    /// Current status snapshot for the risk summary.
    #[must_use]
    pub fn status(&self) -> KillSwitchStatus {
        let state = self
            .state
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        KillSwitchStatus {
            active: self.is_active(),
            reason: state.as_ref().map(|(reason, _)| reason.clone()),
            activated_at: state.as_ref().map(|(_, at)| *at),
        }
    }

    /// Engage the switch. Later activations while engaged are ignored.
    pub fn activate(&self, reason: impl Into<String>) {
        if self.active.swap(true, Ordering::SeqCst) {
            return;
        }
        let reason = reason.into();
        error!(%reason, "kill switch ACTIVATED - new order submission halted");
        metrics::record_kill_switch_activation();
        *self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some((reason, Utc::now()));
    }

    /// Disengage the switch with the operator confirmation phrase.
    ///
    /// # Errors
    ///
    /// Returns `BadConfirmation` on a phrase mismatch (logged), or
    /// `NotActive` when the switch is not engaged.
    pub fn deactivate(&self, confirmation: &str) -> Result<(), KillSwitchError> {
        if !self.is_active() {
            return Err(KillSwitchError::NotActive);
        }
        if confirmation != self.confirmation_phrase {
            warn!("kill-switch deactivation refused: bad confirmation phrase");
            return Err(KillSwitchError::BadConfirmation);
        }
        *self
            .state
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = None;
        self.active.store(false, Ordering::SeqCst);
        info!("kill switch deactivated by operator");
        Ok(())
    }
}

/// Periodic account-level risk evaluation.
pub struct RiskMonitor {
    thresholds: RiskThresholds,
    starting_equity: Decimal,
    positions: Arc<PositionManager>,
    kill_switch: Arc<KillSwitch>,
    peak_value: RwLock<Decimal>,
    day_start_value: RwLock<Decimal>,
}

impl RiskMonitor {
    /// Create a monitor anchored at the starting equity.
    #[must_use]
    pub fn new(
        thresholds: RiskThresholds,
        starting_equity: Decimal,
        positions: Arc<PositionManager>,
        kill_switch: Arc<KillSwitch>,
    ) -> Self {
        Self {
            thresholds,
            starting_equity,
            positions,
            kill_switch,
            peak_value: RwLock::new(starting_equity),
            day_start_value: RwLock::new(starting_equity),
        }
    }

    /// The kill switch this monitor drives.
    #[must_use]
    pub fn kill_switch(&self) -> Arc<KillSwitch> {
        Arc::clone(&self.kill_switch)
    }

    /// Reset the daily P&L anchor (start-of-day rollover).
    pub fn reset_day(&self) {
        let value = self.account_value();
        *self
            .day_start_value
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = value;
        info!(%value, "daily P&L anchor reset");
    }

    /// Current account value: starting equity plus realized and unrealized
    /// P&L.
    #[must_use]
    pub fn account_value(&self) -> Decimal {
        let totals = self.positions.pnl_totals();
        self.starting_equity + totals.realized + totals.unrealized
    }

    /// Recompute the risk summary, advancing the peak-value watermark.
    #[must_use]
    pub fn risk_summary(&self) -> RiskSummary {
        let account_value = self.account_value();

        let peak = {
            let mut peak = self
                .peak_value
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if account_value > *peak {
                *peak = account_value;
            }
            *peak
        };

        let day_start = *self
            .day_start_value
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let daily_pnl = account_value - day_start;
        let daily_pnl_pct = pct_of(daily_pnl, day_start);
        let drawdown = peak - account_value;
        let drawdown_pct = pct_of(drawdown, peak);

        RiskSummary {
            account_value,
            peak_value: peak,
            daily_pnl,
            daily_pnl_pct,
            drawdown,
            drawdown_pct,
            open_positions: self.positions.open_position_count(),
            kill_switch: self.kill_switch.status(),
            computed_at: Utc::now(),
        }
    }

    /// Evaluate every threshold, engaging the kill switch on any Critical
    /// breach. Returns the alerts raised this pass.
    pub fn evaluate(&self) -> Vec<RiskAlert> {
        let summary = self.risk_summary();
        let mut alerts = Vec::new();

        let daily_loss = (-summary.daily_pnl).max(Decimal::ZERO);
        let daily_loss_pct = pct_of(daily_loss, summary.account_value + daily_loss);
        self.push_alert(
            &mut alerts,
            "daily_loss",
            daily_loss_pct,
            self.thresholds.max_daily_loss_pct,
        );

        self.push_alert(
            &mut alerts,
            "drawdown",
            summary.drawdown_pct,
            self.thresholds.max_drawdown_pct,
        );

        self.push_alert(
            &mut alerts,
            "position_count",
            Decimal::from(summary.open_positions as u64),
            Decimal::from(self.thresholds.max_position_count as u64),
        );

        for alert in &alerts {
            match alert.severity {
                RiskSeverity::Info => {
                    info!(metric = %alert.metric, observed = %alert.observed, limit = %alert.limit, "risk level approaching limit");
                }
                RiskSeverity::Warning => {
                    warn!(metric = %alert.metric, observed = %alert.observed, limit = %alert.limit, "risk threshold partially breached");
                }
                RiskSeverity::Critical => {
                    error!(metric = %alert.metric, observed = %alert.observed, limit = %alert.limit, "risk limit exceeded");
                    self.kill_switch.activate(alert.message.clone());
                }
            }
        }

        alerts
    }

    fn push_alert(
        &self,
        alerts: &mut Vec<RiskAlert>,
        metric: &str,
        observed: Decimal,
        limit: Decimal,
    ) {
        let Some(severity) = self.severity_for(observed, limit) else {
            return;
        };
        alerts.push(RiskAlert {
            metric: metric.to_string(),
            severity,
            observed,
            limit,
            message: format!("{metric} at {observed} against limit {limit}"),
        });
    }

    /// Severity ladder: Info at `info_fraction` of the limit, Warning at
    /// `warning_fraction`, Critical once the limit is exceeded.
    fn severity_for(&self, observed: Decimal, limit: Decimal) -> Option<RiskSeverity> {
        if limit <= Decimal::ZERO {
            return None;
        }
        if observed > limit {
            Some(RiskSeverity::Critical)
        } else if observed >= limit * self.thresholds.warning_fraction {
            Some(RiskSeverity::Warning)
        } else if observed >= limit * self.thresholds.info_fraction {
            Some(RiskSeverity::Info)
        } else {
            None
        }
    }

    /// Run the periodic evaluation loop until shutdown.
    pub async fn run(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        info!(interval_ms = interval.as_millis() as u64, "risk monitor started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let alerts = self.evaluate();
                    if !alerts.is_empty() {
                        metrics::record_risk_alerts(alerts.len());
                    }
                }
                _ = shutdown.recv() => {
                    info!("risk monitor shutting down");
                    break;
                }
            }
        }
    }
}

fn pct_of(value: Decimal, base: Decimal) -> Decimal {
    if base.is_zero() {
        Decimal::ZERO
    } else {
        value / base * Decimal::from(100)
    }
}
