//! Alert rule types: conditions, combination logic, notification channels,
//! and definition validation.
//!
//! These are the in-memory forms of the JSON columns stored on `alerts`.
//! Serialization to and from JSON happens only at the storage boundary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{TenantId, Timestamp};

/// Recognised severity tags.
pub const SEVERITIES: [&str; 3] = ["info", "warning", "critical"];

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// How raw metric samples inside the evaluation window are reduced to a
/// single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Avg,
    Sum,
    Min,
    Max,
    Count,
}

impl Aggregation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Count => "count",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// Comparison operator of a condition.
///
/// Operators that are not recognised are kept verbatim in [`Operator::Unknown`]
/// and never match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Operator {
    Gt,
    Gte,
    Lt,
    Lte,
    Eq,
    Ne,
    Unknown(String),
}

impl Operator {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }

    /// Compare an observed value against a threshold.
    ///
    /// Comparisons are exact; `eq` and `ne` apply no epsilon.
    #[allow(clippy::float_cmp)]
    pub fn compare(&self, value: f64, threshold: f64) -> bool {
        match self {
            Self::Gt => value > threshold,
            Self::Gte => value >= threshold,
            Self::Lt => value < threshold,
            Self::Lte => value <= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
            Self::Unknown(_) => false,
        }
    }
}

impl From<String> for Operator {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "gt" => Self::Gt,
            "gte" => Self::Gte,
            "lt" => Self::Lt,
            "lte" => Self::Lte,
            "eq" => Self::Eq,
            "ne" => Self::Ne,
            _ => Self::Unknown(raw),
        }
    }
}

impl From<&str> for Operator {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<Operator> for String {
    fn from(op: Operator) -> Self {
        match op {
            Operator::Unknown(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// One threshold check: `aggregation(metric_name) <operator> threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub metric_name: String,
    pub aggregation: Aggregation,
    pub operator: Operator,
    pub threshold: f64,
}

impl Condition {
    pub fn new(
        metric_name: impl Into<String>,
        aggregation: Aggregation,
        operator: impl Into<Operator>,
        threshold: f64,
    ) -> Self {
        Self {
            metric_name: metric_name.into(),
            aggregation,
            operator: operator.into(),
            threshold,
        }
    }

    /// Whether `value` satisfies this condition.
    pub fn is_met(&self, value: f64) -> bool {
        self.operator.compare(value, self.threshold)
    }

    pub fn has_known_operator(&self) -> bool {
        self.operator.is_known()
    }
}

// ---------------------------------------------------------------------------
// ConditionLogic
// ---------------------------------------------------------------------------

/// How the per-condition results of an alert are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionLogic {
    #[serde(rename = "AND")]
    And,
    #[serde(rename = "OR")]
    Or,
}

impl ConditionLogic {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }

    /// Combine per-condition results. An empty set never triggers.
    pub fn combine(self, results: &[bool]) -> bool {
        if results.is_empty() {
            return false;
        }
        match self {
            Self::And => results.iter().all(|met| *met),
            Self::Or => results.iter().any(|met| *met),
        }
    }
}

impl FromStr for ConditionLogic {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AND" => Ok(Self::And),
            "OR" => Ok(Self::Or),
            other => Err(CoreError::Validation(format!(
                "condition_logic must be AND or OR, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for ConditionLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Channel
// ---------------------------------------------------------------------------

/// A notification target attached to an alert.
///
/// Stored as `{"type": "webhook", "webhook_id": 42}`. Channel types this
/// build does not implement deserialize to [`Channel::Unsupported`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Channel {
    Webhook { webhook_id: i64 },
    #[serde(other)]
    Unsupported,
}

impl Channel {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Webhook { .. } => "webhook",
            Self::Unsupported => "unsupported",
        }
    }
}

// ---------------------------------------------------------------------------
// History status
// ---------------------------------------------------------------------------

/// Lifecycle of an `alert_history` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Triggered,
    Acknowledged,
    Resolved,
}

impl HistoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Triggered => "triggered",
            Self::Acknowledged => "acknowledged",
            Self::Resolved => "resolved",
        }
    }
}

impl FromStr for HistoryStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "triggered" => Ok(Self::Triggered),
            "acknowledged" => Ok(Self::Acknowledged),
            "resolved" => Ok(Self::Resolved),
            other => Err(CoreError::Validation(format!(
                "unknown alert history status '{other}'"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// AlertRule
// ---------------------------------------------------------------------------

/// The evaluation-relevant part of an alert definition.
///
/// The persistence layer builds this from an `alerts` row; the engine and
/// the cooldown gate only ever see this type.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub tenant_id: TenantId,
    pub conditions: Vec<Condition>,
    pub logic: ConditionLogic,
    pub window_seconds: i32,
    pub cooldown_seconds: i32,
    pub last_triggered_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// The fields of an alert definition that are checked before it is stored.
#[derive(Debug, Clone, Copy)]
pub struct AlertDefinition<'a> {
    pub name: &'a str,
    pub conditions: &'a [Condition],
    pub window_seconds: i32,
    pub cooldown_seconds: i32,
    pub severity: &'a str,
    pub channels: &'a [Channel],
    pub enabled: bool,
}

/// Enforce the structural invariants of an alert definition.
///
/// Unknown operators are accepted here (they evaluate to "not met"); use
/// [`Condition::has_known_operator`] to surface them to operators.
pub fn validate_definition(def: &AlertDefinition<'_>) -> Result<(), CoreError> {
    if def.name.trim().is_empty() {
        return Err(CoreError::Validation("alert name must not be empty".into()));
    }
    if def.conditions.is_empty() {
        return Err(CoreError::Validation(
            "alert must have at least one condition".into(),
        ));
    }
    if let Some(cond) = def.conditions.iter().find(|c| c.metric_name.trim().is_empty()) {
        return Err(CoreError::Validation(format!(
            "condition metric_name must not be empty (operator '{}')",
            cond.operator
        )));
    }
    if def.conditions.iter().any(|c| !c.threshold.is_finite()) {
        return Err(CoreError::Validation(
            "condition thresholds must be finite numbers".into(),
        ));
    }
    if def.window_seconds <= 0 {
        return Err(CoreError::Validation(format!(
            "window_seconds must be positive, got {}",
            def.window_seconds
        )));
    }
    if def.cooldown_seconds <= 0 {
        return Err(CoreError::Validation(format!(
            "cooldown_seconds must be positive, got {}",
            def.cooldown_seconds
        )));
    }
    if !SEVERITIES.contains(&def.severity) {
        return Err(CoreError::Validation(format!(
            "severity must be one of {SEVERITIES:?}, got '{}'",
            def.severity
        )));
    }
    if def.enabled && def.channels.is_empty() {
        return Err(CoreError::Validation(
            "an enabled alert must have at least one channel".into(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
