//! Repository for the `delivery_queue` table.
//!
//! Every state transition is a single conditional `UPDATE` guarded on the
//! current status, so concurrent workers never both act on one entry.

use std::time::Duration;

use herald_core::delivery::{DeliveryStatus, RetryDecision, DEFAULT_MAX_ATTEMPTS};
use herald_core::types::{DbId, TenantId};
use sqlx::PgPool;

use crate::models::delivery::{DeliveryQueueEntry, NewDelivery, StatusCount};

const COLUMNS: &str = "\
    id, tenant_id, webhook_id, event_type, payload, attempts, max_attempts, \
    next_retry_at, status, last_error, created_at, updated_at";

/// Upper bound on `last_error` length stored per entry.
const MAX_ERROR_LEN: usize = 2000;

/// Provides enqueue, claim and status transitions for outbound deliveries.
pub struct DeliveryQueueRepo;

impl DeliveryQueueRepo {
    // -----------------------------------------------------------------------
    // Producers
    // -----------------------------------------------------------------------

    /// Insert a new entry: `pending`, zero attempts, due immediately.
    pub async fn enqueue(
        pool: &PgPool,
        input: &NewDelivery,
    ) -> Result<DeliveryQueueEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO delivery_queue \
                 (tenant_id, webhook_id, event_type, payload, attempts, max_attempts, \
                  next_retry_at, status) \
             VALUES ($1, $2, $3, $4, 0, $5, NOW(), $6) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeliveryQueueEntry>(&query)
            .bind(input.tenant_id)
            .bind(input.webhook_id)
            .bind(&input.event_type)
            .bind(&input.payload)
            .bind(input.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS))
            .bind(DeliveryStatus::Pending.as_str())
            .fetch_one(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Claiming
    // -----------------------------------------------------------------------

    /// Atomically claim up to `limit` due entries, moving them to `processing`.
    ///
    /// Uses `SELECT FOR UPDATE SKIP LOCKED` so concurrent workers pick
    /// disjoint rows, and re-checks `status` in the outer `UPDATE` so a row
    /// is only ever claimed from `pending`.
    pub async fn claim_due(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<DeliveryQueueEntry>, sqlx::Error> {
        let query = format!(
            "UPDATE delivery_queue SET status = $2 \
             WHERE id IN ( \
                 SELECT id FROM delivery_queue \
                 WHERE status = $3 AND next_retry_at <= NOW() \
                 ORDER BY next_retry_at ASC, id ASC \
                 LIMIT $1 \
                 FOR UPDATE SKIP LOCKED \
             ) AND status = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeliveryQueueEntry>(&query)
            .bind(limit)
            .bind(DeliveryStatus::Processing.as_str())
            .bind(DeliveryStatus::Pending.as_str())
            .fetch_all(pool)
            .await
    }

    /// Claim one specific entry if it is still `pending`.
    ///
    /// A compare-and-set on `status`: of several concurrent callers exactly
    /// one receives the row.
    pub async fn claim(pool: &PgPool, id: DbId) -> Result<Option<DeliveryQueueEntry>, sqlx::Error> {
        let query = format!(
            "UPDATE delivery_queue SET status = $2 \
             WHERE id = $1 AND status = $3 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DeliveryQueueEntry>(&query)
            .bind(id)
            .bind(DeliveryStatus::Processing.as_str())
            .bind(DeliveryStatus::Pending.as_str())
            .fetch_optional(pool)
            .await
    }

    /// Return `processing` entries untouched for longer than `older_than`
    /// to `pending`, keeping their attempt count.
    pub async fn release_stale(pool: &PgPool, older_than: Duration) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE delivery_queue SET status = $1, next_retry_at = NOW() \
             WHERE status = $2 AND updated_at < NOW() - make_interval(secs => $3)",
        )
        .bind(DeliveryStatus::Pending.as_str())
        .bind(DeliveryStatus::Processing.as_str())
        .bind(older_than.as_secs_f64())
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    // -----------------------------------------------------------------------
    // Outcomes
    // -----------------------------------------------------------------------

    /// Mark a claimed entry `delivered`. Returns `false` if it was not
    /// `processing`.
    pub async fn mark_delivered(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE delivery_queue SET status = $2, last_error = NULL \
             WHERE id = $1 AND status = $3",
        )
        .bind(id)
        .bind(DeliveryStatus::Delivered.as_str())
        .bind(DeliveryStatus::Processing.as_str())
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Apply the outcome of a failed attempt to a claimed entry.
    ///
    /// [`RetryDecision::Retry`] returns it to `pending` with `next_retry_at`
    /// pushed forward by the delay; [`RetryDecision::GiveUp`] marks it
    /// `failed`. Returns `false` if the entry was not `processing`.
    pub async fn record_failure(
        pool: &PgPool,
        id: DbId,
        decision: &RetryDecision,
        error: &str,
    ) -> Result<bool, sqlx::Error> {
        let error = truncate_error(error);
        let result = match decision {
            RetryDecision::Retry { attempts, delay } => {
                sqlx::query(
                    "UPDATE delivery_queue SET \
                         status = $2, attempts = $3, last_error = $4, \
                         next_retry_at = NOW() + make_interval(secs => $5) \
                     WHERE id = $1 AND status = $6",
                )
                .bind(id)
                .bind(DeliveryStatus::Pending.as_str())
                .bind(*attempts)
                .bind(error)
                .bind(delay.as_secs_f64())
                .bind(DeliveryStatus::Processing.as_str())
                .execute(pool)
                .await?
            }
            RetryDecision::GiveUp { attempts } => {
                sqlx::query(
                    "UPDATE delivery_queue SET \
                         status = $2, attempts = $3, last_error = $4 \
                     WHERE id = $1 AND status = $5",
                )
                .bind(id)
                .bind(DeliveryStatus::Failed.as_str())
                .bind(*attempts)
                .bind(error)
                .bind(DeliveryStatus::Processing.as_str())
                .execute(pool)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Find an entry owned by `tenant_id`.
    pub async fn find_for_tenant(
        pool: &PgPool,
        tenant_id: TenantId,
        id: DbId,
    ) -> Result<Option<DeliveryQueueEntry>, sqlx::Error> {
        let query =
            format!("SELECT {COLUMNS} FROM delivery_queue WHERE id = $1 AND tenant_id = $2");
        sqlx::query_as::<_, DeliveryQueueEntry>(&query)
            .bind(id)
            .bind(tenant_id)
            .fetch_optional(pool)
            .await
    }

    /// List entries for one webhook with pagination, newest first.
    pub async fn list_for_webhook(
        pool: &PgPool,
        tenant_id: TenantId,
        webhook_id: DbId,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<DeliveryQueueEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM delivery_queue \
             WHERE webhook_id = $1 AND tenant_id = $2 \
             ORDER BY created_at DESC, id DESC LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, DeliveryQueueEntry>(&query)
            .bind(webhook_id)
            .bind(tenant_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Count a tenant's entries per status.
    pub async fn count_by_status(
        pool: &PgPool,
        tenant_id: TenantId,
    ) -> Result<Vec<StatusCount>, sqlx::Error> {
        sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM delivery_queue \
             WHERE tenant_id = $1 GROUP BY status ORDER BY status",
        )
        .bind(tenant_id)
        .fetch_all(pool)
        .await
    }
}

/// Cut an error message to [`MAX_ERROR_LEN`] bytes on a char boundary.
fn truncate_error(error: &str) -> &str {
    if error.len() <= MAX_ERROR_LEN {
        return error;
    }
    let mut end = MAX_ERROR_LEN;
    while !error.is_char_boundary(end) {
        end -= 1;
    }
    &error[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_errors_are_kept() {
        assert_eq!(truncate_error("HTTP 502"), "HTTP 502");
    }

    #[test]
    fn long_errors_are_cut_on_char_boundary() {
        let long = "é".repeat(MAX_ERROR_LEN);
        let cut = truncate_error(&long);
        assert!(cut.len() <= MAX_ERROR_LEN);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
