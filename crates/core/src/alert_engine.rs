//! Threshold evaluation engine for tenant alerts.
//!
//! Pure logic: the only outside dependency is the injected [`MetricsSource`].
//! The caller decides what to do with the resulting [`Evaluation`]
//! (persist history, notify, and so on).

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use crate::alert::{Aggregation, AlertRule, ConditionLogic};
use crate::types::{TenantId, Timestamp};

// ---------------------------------------------------------------------------
// MetricsSource
// ---------------------------------------------------------------------------

/// A metric lookup failed. Aborts evaluation of the whole alert.
#[derive(Debug, thiserror::Error)]
#[error("metric lookup failed for '{metric_name}': {message}")]
pub struct MetricError {
    pub metric_name: String,
    pub message: String,
}

impl MetricError {
    pub fn new(metric_name: impl Into<String>, message: impl ToString) -> Self {
        Self {
            metric_name: metric_name.into(),
            message: message.to_string(),
        }
    }
}

/// Capability to reduce a tenant's metric samples over a time window to a
/// single number.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn get_metric_value(
        &self,
        tenant_id: TenantId,
        metric_name: &str,
        aggregation: Aggregation,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> Result<f64, MetricError>;
}

// ---------------------------------------------------------------------------
// Evaluation result
// ---------------------------------------------------------------------------

/// The observed outcome of a single condition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionOutcome {
    pub metric_name: String,
    pub aggregation: Aggregation,
    pub operator: String,
    pub threshold: f64,
    pub value: f64,
    pub met: bool,
    /// Set when the operator was not recognised and therefore never matches.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub unknown_operator: bool,
}

/// Result of evaluating one alert at one instant.
///
/// Serialized as-is into `alert_history.metadata` so an operator can see
/// why an alert fired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub triggered: bool,
    pub condition_logic: ConditionLogic,
    pub window_seconds: i32,
    pub window_start: Timestamp,
    pub window_end: Timestamp,
    pub conditions: Vec<ConditionOutcome>,
}

impl Evaluation {
    /// JSON form persisted with the history record.
    pub fn metadata(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn has_unknown_operator(&self) -> bool {
        self.conditions.iter().any(|c| c.unknown_operator)
    }
}

// ---------------------------------------------------------------------------
// Cooldown gate
// ---------------------------------------------------------------------------

/// Whether an alert is out of its cooldown window at `now`.
///
/// An alert that never fired is always eligible. Otherwise it becomes
/// eligible strictly after `last_triggered_at + cooldown_seconds`.
pub fn should_trigger(rule: &AlertRule, now: Timestamp) -> bool {
    match rule.last_triggered_at {
        None => true,
        Some(last) => now > last + chrono::Duration::seconds(i64::from(rule.cooldown_seconds)),
    }
}

// ---------------------------------------------------------------------------
// Evaluate
// ---------------------------------------------------------------------------

/// Evaluate an alert against the current time.
pub async fn evaluate(
    rule: &AlertRule,
    source: &dyn MetricsSource,
) -> Result<Evaluation, MetricError> {
    evaluate_at(rule, source, Utc::now()).await
}

/// Evaluate an alert with the window ending at `now`.
///
/// Every condition looks back `window_seconds` from `now`. The first
/// failing metric lookup aborts the evaluation.
pub async fn evaluate_at(
    rule: &AlertRule,
    source: &dyn MetricsSource,
    now: Timestamp,
) -> Result<Evaluation, MetricError> {
    let window_start = now - chrono::Duration::seconds(i64::from(rule.window_seconds));

    let mut outcomes = Vec::with_capacity(rule.conditions.len());
    for condition in &rule.conditions {
        let value = source
            .get_metric_value(
                rule.tenant_id,
                &condition.metric_name,
                condition.aggregation,
                window_start,
                now,
            )
            .await?;

        outcomes.push(ConditionOutcome {
            metric_name: condition.metric_name.clone(),
            aggregation: condition.aggregation,
            operator: condition.operator.as_str().to_string(),
            threshold: condition.threshold,
            value,
            met: condition.is_met(value),
            unknown_operator: !condition.has_known_operator(),
        });
    }

    let met: Vec<bool> = outcomes.iter().map(|o| o.met).collect();

    Ok(Evaluation {
        triggered: rule.logic.combine(&met),
        condition_logic: rule.logic,
        window_seconds: rule.window_seconds,
        window_start,
        window_end: now,
        conditions: outcomes,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use assert_matches::assert_matches;
    use chrono::TimeZone;

    use super::*;
    use crate::alert::Condition;

    /// In-memory metrics keyed by metric name; records every lookup.
    #[derive(Default)]
    struct StaticMetrics {
        values: HashMap<String, f64>,
        calls: Mutex<Vec<(String, Timestamp, Timestamp)>>,
    }

    impl StaticMetrics {
        fn with(values: &[(&str, f64)]) -> Self {
            Self {
                values: values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                calls: Mutex::default(),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MetricsSource for StaticMetrics {
        async fn get_metric_value(
            &self,
            _tenant_id: TenantId,
            metric_name: &str,
            _aggregation: Aggregation,
            window_start: Timestamp,
            window_end: Timestamp,
        ) -> Result<f64, MetricError> {
            self.calls
                .lock()
                .unwrap()
                .push((metric_name.to_string(), window_start, window_end));
            self.values
                .get(metric_name)
                .copied()
                .ok_or_else(|| MetricError::new(metric_name, "no such metric"))
        }
    }

    fn t0() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn rule(logic: ConditionLogic) -> AlertRule {
        AlertRule {
            tenant_id: 1,
            conditions: vec![
                Condition::new("cpu_usage", Aggregation::Avg, "gt", 80.0),
                Condition::new("memory_usage", Aggregation::Avg, "gt", 70.0),
            ],
            logic,
            window_seconds: 300,
            cooldown_seconds: 600,
            last_triggered_at: None,
        }
    }

    // -- Evaluate --------------------------------------------------------------

    #[tokio::test]
    async fn or_logic_triggers_when_one_condition_is_met() {
        let metrics = StaticMetrics::with(&[("cpu_usage", 85.0), ("memory_usage", 65.0)]);
        let eval = evaluate_at(&rule(ConditionLogic::Or), &metrics, t0()).await.unwrap();

        assert!(eval.triggered);
        assert!(eval.conditions[0].met);
        assert!(!eval.conditions[1].met);
    }

    #[tokio::test]
    async fn and_logic_needs_every_condition() {
        let metrics = StaticMetrics::with(&[("cpu_usage", 85.0), ("memory_usage", 65.0)]);
        let eval = evaluate_at(&rule(ConditionLogic::And), &metrics, t0()).await.unwrap();
        assert!(!eval.triggered);

        let metrics = StaticMetrics::with(&[("cpu_usage", 85.0), ("memory_usage", 75.0)]);
        let eval = evaluate_at(&rule(ConditionLogic::And), &metrics, t0()).await.unwrap();
        assert!(eval.triggered);
    }

    #[tokio::test]
    async fn window_covers_window_seconds_before_now() {
        let metrics = StaticMetrics::with(&[("cpu_usage", 1.0), ("memory_usage", 1.0)]);
        let eval = evaluate_at(&rule(ConditionLogic::Or), &metrics, t0()).await.unwrap();

        let expected_start = t0() - chrono::Duration::seconds(300);
        assert_eq!(eval.window_start, expected_start);
        assert_eq!(eval.window_end, t0());

        let calls = metrics.calls.lock().unwrap();
        assert!(calls.iter().all(|(_, s, e)| *s == expected_start && *e == t0()));
    }

    #[tokio::test]
    async fn failed_lookup_aborts_without_partial_result() {
        // memory_usage is missing, so the second lookup fails.
        let metrics = StaticMetrics::with(&[("cpu_usage", 99.0)]);
        let result = evaluate_at(&rule(ConditionLogic::Or), &metrics, t0()).await;

        assert_matches!(result, Err(MetricError { ref metric_name, .. }) if metric_name == "memory_usage");
        assert_eq!(metrics.call_count(), 2);
    }

    #[tokio::test]
    async fn first_failed_lookup_stops_further_queries() {
        let metrics = StaticMetrics::with(&[("memory_usage", 99.0)]);
        let result = evaluate_at(&rule(ConditionLogic::Or), &metrics, t0()).await;

        assert!(result.is_err());
        assert_eq!(metrics.call_count(), 1);
    }

    #[tokio::test]
    async fn unknown_operator_is_not_met_and_flagged_in_metadata() {
        let mut r = rule(ConditionLogic::Or);
        r.conditions = vec![Condition::new("cpu_usage", Aggregation::Max, "above", 10.0)];
        let metrics = StaticMetrics::with(&[("cpu_usage", 99.0)]);

        let eval = evaluate_at(&r, &metrics, t0()).await.unwrap();
        assert!(!eval.triggered);
        assert!(eval.has_unknown_operator());

        let meta = eval.metadata().unwrap();
        assert_eq!(meta["conditions"][0]["unknown_operator"], true);
        assert_eq!(meta["conditions"][0]["operator"], "above");
    }

    #[tokio::test]
    async fn metadata_records_values_thresholds_and_window() {
        let metrics = StaticMetrics::with(&[("cpu_usage", 85.0), ("memory_usage", 65.0)]);
        let eval = evaluate_at(&rule(ConditionLogic::Or), &metrics, t0()).await.unwrap();
        let meta = eval.metadata().unwrap();

        assert_eq!(meta["triggered"], true);
        assert_eq!(meta["condition_logic"], "OR");
        assert_eq!(meta["window_seconds"], 300);
        assert!(meta["window_start"].is_string());
        assert!(meta["window_end"].is_string());

        let cpu = &meta["conditions"][0];
        assert_eq!(cpu["metric_name"], "cpu_usage");
        assert_eq!(cpu["value"], 85.0);
        assert_eq!(cpu["threshold"], 80.0);
        assert_eq!(cpu["operator"], "gt");
        assert_eq!(cpu["met"], true);
        assert!(cpu.get("unknown_operator").is_none());
    }

    #[tokio::test]
    async fn non_finite_value_still_encodes_metadata() {
        let metrics = StaticMetrics::with(&[("cpu_usage", f64::NAN), ("memory_usage", 65.0)]);
        let eval = evaluate_at(&rule(ConditionLogic::Or), &metrics, t0()).await.unwrap();
        assert!(!eval.conditions[0].met);

        let meta = eval.metadata().expect("metadata encodes");
        assert!(meta["conditions"][0]["value"].is_null());
        assert_eq!(meta["conditions"][1]["value"], 65.0);
    }

    // -- Cooldown gate -----------------------------------------------------------

    #[test]
    fn never_triggered_alert_is_always_eligible() {
        assert!(should_trigger(&rule(ConditionLogic::And), t0()));
    }

    #[test]
    fn cooldown_boundary_is_exclusive() {
        let mut r = rule(ConditionLogic::And);
        r.last_triggered_at = Some(t0());
        let cooldown = chrono::Duration::seconds(600);

        assert!(!should_trigger(&r, t0()));
        assert!(!should_trigger(&r, t0() + chrono::Duration::seconds(1)));
        assert!(!should_trigger(&r, t0() + cooldown));
        assert!(should_trigger(&r, t0() + cooldown + chrono::Duration::milliseconds(1)));
        assert!(should_trigger(&r, t0() + cooldown * 2));
    }
}
