//! Periodic alert evaluation.
//!
//! [`AlertScheduler`] wakes on a fixed interval, evaluates every enabled
//! alert across all tenants and notifies on the ones that trigger. A failure
//! on one alert is logged and never stops the others.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use herald_core::alert::AlertRule;
use herald_core::alert_engine::{
    evaluate_at, should_trigger, Evaluation, MetricError, MetricsSource,
};
use herald_core::error::CoreError;
use herald_core::types::Timestamp;
use herald_db::models::alert::{Alert, NewAlertHistory};
use herald_db::repositories::AlertRepo;
use herald_db::DbPool;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::notifier::{NotifyError, Notifier, TriggerRecord};

/// Default interval between scheduler ticks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Why processing one alert stopped early.
#[derive(Debug, thiserror::Error)]
pub enum AlertRunError {
    #[error("invalid alert definition: {0}")]
    Definition(#[from] CoreError),

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error("notification failed: {0}")]
    Notify(#[from] NotifyError),
}

/// What happened to one alert on one tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertOutcome {
    CoolingDown,
    NotTriggered,
    Triggered,
}

/// Counts for one scheduler tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub evaluated: usize,
    pub triggered: usize,
    pub errors: usize,
}

/// Evaluate `rule` at `now` unless it is still cooling down.
///
/// Returns `None` without touching the metrics source during cooldown.
pub async fn evaluate_if_due(
    rule: &AlertRule,
    source: &dyn MetricsSource,
    now: Timestamp,
) -> Result<Option<Evaluation>, MetricError> {
    if !should_trigger(rule, now) {
        return Ok(None);
    }
    evaluate_at(rule, source, now).await.map(Some)
}

// ---------------------------------------------------------------------------
// AlertScheduler
// ---------------------------------------------------------------------------

/// Background service that evaluates alerts on a fixed interval.
pub struct AlertScheduler {
    pool: DbPool,
    metrics: Arc<dyn MetricsSource>,
    notifier: Notifier,
    tick_interval: Duration,
}

impl AlertScheduler {
    pub fn new(
        pool: DbPool,
        metrics: Arc<dyn MetricsSource>,
        notifier: Notifier,
        tick_interval: Duration,
    ) -> Self {
        Self {
            pool,
            metrics,
            notifier,
            tick_interval,
        }
    }

    /// Run the scheduler loop until `cancel` fires.
    ///
    /// The tick in progress is finished before the loop exits.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.tick_interval.as_secs(),
            "Alert scheduler started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Alert scheduler cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Failed to list enabled alerts");
                    }
                }
            }
        }
    }

    /// Evaluate every enabled alert once.
    pub async fn tick(&self) -> Result<TickSummary, sqlx::Error> {
        let alerts = AlertRepo::list_enabled(&self.pool).await?;
        let mut summary = TickSummary::default();

        for alert in &alerts {
            match self.process_alert(alert, Utc::now()).await {
                Ok(AlertOutcome::CoolingDown) => {}
                Ok(AlertOutcome::NotTriggered) => summary.evaluated += 1,
                Ok(AlertOutcome::Triggered) => {
                    summary.evaluated += 1;
                    summary.triggered += 1;
                }
                Err(e) => {
                    summary.errors += 1;
                    tracing::error!(
                        alert_id = alert.id,
                        tenant_id = alert.tenant_id,
                        error = %e,
                        "Alert processing failed"
                    );
                }
            }
        }

        tracing::debug!(
            alerts = alerts.len(),
            evaluated = summary.evaluated,
            triggered = summary.triggered,
            errors = summary.errors,
            "Alert tick complete"
        );
        Ok(summary)
    }

    /// Gate, evaluate and, if triggered, record and notify one alert.
    ///
    /// History and `last_triggered_at` write failures are logged; the
    /// notification is still sent.
    pub async fn process_alert(
        &self,
        alert: &Alert,
        now: Timestamp,
    ) -> Result<AlertOutcome, AlertRunError> {
        let rule = alert.rule()?;
        let Some(evaluation) = evaluate_if_due(&rule, self.metrics.as_ref(), now).await? else {
            return Ok(AlertOutcome::CoolingDown);
        };

        if evaluation.has_unknown_operator() {
            tracing::warn!(alert_id = alert.id, "Alert has an unknown operator");
        }
        if !evaluation.triggered {
            return Ok(AlertOutcome::NotTriggered);
        }

        let metadata = evaluation.metadata().unwrap_or_else(|e| {
            tracing::error!(
                alert_id = alert.id,
                error = %e,
                "Failed to encode evaluation metadata"
            );
            serde_json::Value::Null
        });
        let history_id = match AlertRepo::create_history(
            &self.pool,
            &NewAlertHistory {
                alert_id: alert.id,
                tenant_id: alert.tenant_id,
                triggered_at: now,
                metadata: metadata.clone(),
            },
        )
        .await
        {
            Ok(history) => Some(history.id),
            Err(e) => {
                tracing::error!(
                    alert_id = alert.id,
                    error = %e,
                    "Failed to save alert history"
                );
                None
            }
        };

        if let Err(e) = AlertRepo::update_last_triggered(&self.pool, alert.id, now).await {
            tracing::error!(
                alert_id = alert.id,
                error = %e,
                "Failed to update alert last_triggered_at"
            );
        }

        tracing::info!(
            alert_id = alert.id,
            tenant_id = alert.tenant_id,
            severity = %alert.severity,
            history_id,
            "Alert triggered"
        );

        let trigger = TriggerRecord {
            history_id,
            triggered_at: now,
            metadata: &metadata,
        };
        self.notifier.send(alert, &trigger).await?;

        Ok(AlertOutcome::Triggered)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
