//! Alert definition and alert history models.

use herald_core::alert::{AlertRule, Channel, Condition, ConditionLogic, HistoryStatus};
use herald_core::error::CoreError;
use herald_core::types::{DbId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ---------------------------------------------------------------------------
// Alert
// ---------------------------------------------------------------------------

/// A row from the `alerts` table.
///
/// `conditions` and `channels` stay as raw JSON here so that one malformed
/// row cannot fail a query listing many alerts. Use [`Alert::rule`] and
/// [`Alert::channels`] to get the typed forms.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Alert {
    pub id: DbId,
    pub tenant_id: TenantId,
    pub name: String,
    pub conditions: serde_json::Value,
    pub condition_logic: String,
    pub window_seconds: i32,
    pub cooldown_seconds: i32,
    pub severity: String,
    pub channels: serde_json::Value,
    pub enabled: bool,
    pub last_triggered_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Alert {
    /// Build the evaluation view of this alert.
    pub fn rule(&self) -> Result<AlertRule, CoreError> {
        let conditions: Vec<Condition> = serde_json::from_value(self.conditions.clone())
            .map_err(|e| {
                CoreError::Validation(format!("alert {} has malformed conditions: {e}", self.id))
            })?;

        Ok(AlertRule {
            tenant_id: self.tenant_id,
            conditions,
            logic: self.condition_logic.parse::<ConditionLogic>()?,
            window_seconds: self.window_seconds,
            cooldown_seconds: self.cooldown_seconds,
            last_triggered_at: self.last_triggered_at,
        })
    }

    /// Decode the notification channels.
    pub fn channels(&self) -> Result<Vec<Channel>, CoreError> {
        serde_json::from_value(self.channels.clone()).map_err(|e| {
            CoreError::Validation(format!("alert {} has malformed channels: {e}", self.id))
        })
    }
}

/// DTO for creating a new alert.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAlert {
    pub name: String,
    pub conditions: Vec<Condition>,
    pub condition_logic: ConditionLogic,
    pub window_seconds: i32,
    pub cooldown_seconds: i32,
    pub severity: String,
    pub channels: Vec<Channel>,
    pub enabled: Option<bool>,
}

// ---------------------------------------------------------------------------
// Alert history
// ---------------------------------------------------------------------------

/// A row from the `alert_history` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AlertHistory {
    pub id: DbId,
    pub alert_id: DbId,
    pub tenant_id: TenantId,
    pub triggered_at: Timestamp,
    pub resolved_at: Option<Timestamp>,
    pub status: String,
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl AlertHistory {
    pub fn status(&self) -> Result<HistoryStatus, CoreError> {
        self.status.parse()
    }
}

/// Insert payload for a new trigger record.
#[derive(Debug, Clone)]
pub struct NewAlertHistory {
    pub alert_id: DbId,
    pub tenant_id: TenantId,
    pub triggered_at: Timestamp,
    pub metadata: serde_json::Value,
}
