//! Repository for the `alerts` and `alert_history` tables.

use herald_core::alert::{validate_definition, AlertDefinition, HistoryStatus};
use herald_core::types::{DbId, TenantId, Timestamp};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::StoreError;
use crate::models::alert::{Alert, AlertHistory, CreateAlert, NewAlertHistory};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const ALERT_COLUMNS: &str = "\
    id, tenant_id, name, conditions, condition_logic, window_seconds, \
    cooldown_seconds, severity, channels, enabled, last_triggered_at, \
    created_at, updated_at";

const HISTORY_COLUMNS: &str = "\
    id, alert_id, tenant_id, triggered_at, resolved_at, status, metadata, \
    created_at, updated_at";

/// Provides persistence for alert definitions and their trigger history.
pub struct AlertRepo;

impl AlertRepo {
    // -----------------------------------------------------------------------
    // Alert definitions
    // -----------------------------------------------------------------------

    /// Validate and insert a new alert for `tenant_id`.
    pub async fn create(
        pool: &PgPool,
        tenant_id: TenantId,
        input: &CreateAlert,
    ) -> Result<Alert, StoreError> {
        let enabled = input.enabled.unwrap_or(true);
        validate_definition(&AlertDefinition {
            name: &input.name,
            conditions: &input.conditions,
            window_seconds: input.window_seconds,
            cooldown_seconds: input.cooldown_seconds,
            severity: &input.severity,
            channels: &input.channels,
            enabled,
        })?;

        let query = format!(
            "INSERT INTO alerts \
                 (tenant_id, name, conditions, condition_logic, window_seconds, \
                  cooldown_seconds, severity, channels, enabled) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {ALERT_COLUMNS}"
        );
        let alert = sqlx::query_as::<_, Alert>(&query)
            .bind(tenant_id)
            .bind(&input.name)
            .bind(Json(&input.conditions))
            .bind(input.condition_logic.as_str())
            .bind(input.window_seconds)
            .bind(input.cooldown_seconds)
            .bind(&input.severity)
            .bind(Json(&input.channels))
            .bind(enabled)
            .fetch_one(pool)
            .await?;
        Ok(alert)
    }

    /// Find an alert owned by `tenant_id`.
    pub async fn find_for_tenant(
        pool: &PgPool,
        tenant_id: TenantId,
        id: DbId,
    ) -> Result<Option<Alert>, sqlx::Error> {
        let query = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, Alert>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// List a tenant's alerts, oldest first.
    pub async fn list_for_tenant(
        pool: &PgPool,
        tenant_id: TenantId,
    ) -> Result<Vec<Alert>, sqlx::Error> {
        let query =
            format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE tenant_id = $1 ORDER BY id ASC");
        sqlx::query_as::<_, Alert>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// List every enabled alert across all tenants.
    pub async fn list_enabled(pool: &PgPool) -> Result<Vec<Alert>, sqlx::Error> {
        let query = format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE enabled ORDER BY id ASC");
        sqlx::query_as::<_, Alert>(&query).fetch_all(pool).await
    }

    /// Enable or disable an alert.
    ///
    /// Returns `None` when the alert does not exist for this tenant, or when
    /// enabling an alert that has no channels.
    pub async fn set_enabled(
        pool: &PgPool,
        tenant_id: TenantId,
        id: DbId,
        enabled: bool,
    ) -> Result<Option<Alert>, sqlx::Error> {
        let query = format!(
            "UPDATE alerts SET enabled = $3 \
             WHERE id = $1 AND tenant_id = $2 \
               AND (NOT $3 OR jsonb_array_length(channels) > 0) \
             RETURNING {ALERT_COLUMNS}"
        );
        sqlx::query_as::<_, Alert>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(enabled)
            .fetch_optional(pool)
            .await
    }

    /// Record the time an alert last fired.
    pub async fn update_last_triggered(
        pool: &PgPool,
        id: DbId,
        triggered_at: Timestamp,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE alerts SET last_triggered_at = $2 WHERE id = $1")
            .bind(id)
            .bind(triggered_at)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete an alert. Cascade deletes its history.
    pub async fn delete(pool: &PgPool, tenant_id: TenantId, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM alerts WHERE id = $1 AND tenant_id = $2")
            .bind(id)
            .bind(tenant_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // History
    // -----------------------------------------------------------------------

    /// Insert a trigger record with status `triggered`.
    pub async fn create_history(
        pool: &PgPool,
        input: &NewAlertHistory,
    ) -> Result<AlertHistory, sqlx::Error> {
        let query = format!(
            "INSERT INTO alert_history (alert_id, tenant_id, triggered_at, status, metadata) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {HISTORY_COLUMNS}"
        );
        sqlx::query_as::<_, AlertHistory>(&query)
            .bind(input.alert_id)
            .bind(input.tenant_id)
            .bind(input.triggered_at)
            .bind(HistoryStatus::Triggered.as_str())
            .bind(&input.metadata)
            .fetch_one(pool)
            .await
    }

    /// List trigger history for one alert, newest first.
    pub async fn list_history(
        pool: &PgPool,
        tenant_id: TenantId,
        alert_id: DbId,
        limit: i64,
    ) -> Result<Vec<AlertHistory>, sqlx::Error> {
        let query = format!(
            "SELECT {HISTORY_COLUMNS} FROM alert_history \
             WHERE alert_id = $1 AND tenant_id = $2 \
             ORDER BY triggered_at DESC, id DESC LIMIT $3"
        );
        sqlx::query_as::<_, AlertHistory>(&query)
            .bind(alert_id)
            .bind(tenant_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Move a `triggered` record to `acknowledged`.
    ///
    /// Returns `None` if the record does not exist for this tenant or is no
    /// longer `triggered`.
    pub async fn acknowledge_history(
        pool: &PgPool,
        tenant_id: TenantId,
        history_id: DbId,
    ) -> Result<Option<AlertHistory>, sqlx::Error> {
        let query = format!(
            "UPDATE alert_history SET status = $3 \
             WHERE id = $1 AND tenant_id = $2 AND status = $4 \
             RETURNING {HISTORY_COLUMNS}"
        );
        sqlx::query_as::<_, AlertHistory>(&query)
            .bind(history_id)
            .bind(tenant_id)
            .bind(HistoryStatus::Acknowledged.as_str())
            .bind(HistoryStatus::Triggered.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Resolve a `triggered` or `acknowledged` record, stamping `resolved_at`.
    pub async fn resolve_history(
        pool: &PgPool,
        tenant_id: TenantId,
        history_id: DbId,
    ) -> Result<Option<AlertHistory>, sqlx::Error> {
        let query = format!(
            "UPDATE alert_history SET status = $3, resolved_at = NOW() \
             WHERE id = $1 AND tenant_id = $2 AND status <> $3 \
             RETURNING {HISTORY_COLUMNS}"
        );
        sqlx::query_as::<_, AlertHistory>(&query)
            .bind(history_id)
            .bind(tenant_id)
            .bind(HistoryStatus::Resolved.as_str())
            .fetch_optional(pool)
            .await
    }
}
