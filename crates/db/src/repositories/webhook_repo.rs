//! Repository for the `webhooks` table.

use herald_core::types::{DbId, TenantId};
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::webhook::{CreateWebhook, Webhook, WILDCARD_EVENT};

const WEBHOOK_COLUMNS: &str = "\
    id, tenant_id, name, url, secret, event_types, enabled, \
    last_triggered_at, failure_count, created_at, updated_at";

/// Provides CRUD operations for tenant webhooks.
pub struct WebhookRepo;

impl WebhookRepo {
    /// Create a new webhook for `tenant_id`.
    pub async fn create(
        pool: &PgPool,
        tenant_id: TenantId,
        input: &CreateWebhook,
    ) -> Result<Webhook, sqlx::Error> {
        let query = format!(
            "INSERT INTO webhooks (tenant_id, name, url, secret, event_types, enabled) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {WEBHOOK_COLUMNS}"
        );
        sqlx::query_as::<_, Webhook>(&query)
            .bind(tenant_id)
            .bind(&input.name)
            .bind(&input.url)
            .bind(&input.secret)
            .bind(Json(&input.event_types))
            .bind(input.enabled.unwrap_or(true))
            .fetch_one(pool)
            .await
    }

    /// Find a webhook by ID regardless of tenant.
    ///
    /// Only for the delivery worker, which already holds the owning tenant on
    /// the queue entry.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Webhook>, sqlx::Error> {
        let query = format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = $1");
        sqlx::query_as::<_, Webhook>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a webhook owned by `tenant_id`.
    pub async fn find_for_tenant(
        pool: &PgPool,
        tenant_id: TenantId,
        id: DbId,
    ) -> Result<Option<Webhook>, sqlx::Error> {
        let query =
            format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, Webhook>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// List a tenant's webhooks ordered by creation date (newest first).
    pub async fn list_for_tenant(
        pool: &PgPool,
        tenant_id: TenantId,
    ) -> Result<Vec<Webhook>, sqlx::Error> {
        let query = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE tenant_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, Webhook>(&query)
            .bind(tenant_id)
            .fetch_all(pool)
            .await
    }

    /// List the tenant's enabled webhooks subscribed to `event_type`.
    pub async fn list_subscribed(
        pool: &PgPool,
        tenant_id: TenantId,
        event_type: &str,
    ) -> Result<Vec<Webhook>, sqlx::Error> {
        let query = format!(
            "SELECT {WEBHOOK_COLUMNS} FROM webhooks \
             WHERE tenant_id = $1 AND enabled \
               AND (event_types ? $2 OR event_types ? $3) \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, Webhook>(&query)
            .bind(tenant_id)
            .bind(event_type)
            .bind(WILDCARD_EVENT)
            .fetch_all(pool)
            .await
    }

    /// Enable or disable a webhook.
    pub async fn set_enabled(
        pool: &PgPool,
        tenant_id: TenantId,
        id: DbId,
        enabled: bool,
    ) -> Result<Option<Webhook>, sqlx::Error> {
        let query = format!(
            "UPDATE webhooks SET enabled = $3 WHERE id = $1 AND tenant_id = $2 \
             RETURNING {WEBHOOK_COLUMNS}"
        );
        sqlx::query_as::<_, Webhook>(&query)
            .bind(id)
            .bind(tenant_id)
            .bind(enabled)
            .fetch_optional(pool)
            .await
    }

    /// Update `last_triggered_at` on a webhook.
    pub async fn touch_triggered(pool: &PgPool, webhook_id: DbId) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE webhooks SET last_triggered_at = NOW() WHERE id = $1")
            .bind(webhook_id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Increment `failure_count` on a webhook.
    pub async fn increment_failure_count(
        pool: &PgPool,
        webhook_id: DbId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE webhooks SET failure_count = failure_count + 1 WHERE id = $1")
            .bind(webhook_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
