//! Repository for the `metric_samples` table.

use herald_core::alert::Aggregation;
use herald_core::types::{TenantId, Timestamp};
use sqlx::PgPool;

use crate::models::metric::MetricSample;

const COLUMNS: &str = "id, tenant_id, metric_name, value, recorded_at, created_at, updated_at";

/// Stores raw metric samples and aggregates them over time windows.
pub struct MetricSampleRepo;

impl MetricSampleRepo {
    /// Insert one sample. `recorded_at` defaults to now.
    pub async fn record(
        pool: &PgPool,
        tenant_id: TenantId,
        metric_name: &str,
        value: f64,
        recorded_at: Option<Timestamp>,
    ) -> Result<MetricSample, sqlx::Error> {
        let query = format!(
            "INSERT INTO metric_samples (tenant_id, metric_name, value, recorded_at) \
             VALUES ($1, $2, $3, COALESCE($4, NOW())) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, MetricSample>(&query)
            .bind(tenant_id)
            .bind(metric_name)
            .bind(value)
            .bind(recorded_at)
            .fetch_one(pool)
            .await
    }

    /// Reduce a tenant's samples for `metric_name` within
    /// `[window_start, window_end]`. An empty window yields `0`.
    pub async fn aggregate(
        pool: &PgPool,
        tenant_id: TenantId,
        metric_name: &str,
        aggregation: Aggregation,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> Result<f64, sqlx::Error> {
        let query = format!(
            "SELECT COALESCE({}, 0)::DOUBLE PRECISION FROM metric_samples \
             WHERE tenant_id = $1 AND metric_name = $2 \
               AND recorded_at >= $3 AND recorded_at <= $4",
            aggregate_expr(aggregation)
        );
        sqlx::query_scalar::<_, f64>(&query)
            .bind(tenant_id)
            .bind(metric_name)
            .bind(window_start)
            .bind(window_end)
            .fetch_one(pool)
            .await
    }
}

/// SQL aggregate expression for an [`Aggregation`].
fn aggregate_expr(aggregation: Aggregation) -> &'static str {
    match aggregation {
        Aggregation::Avg => "AVG(value)",
        Aggregation::Sum => "SUM(value)",
        Aggregation::Min => "MIN(value)",
        Aggregation::Max => "MAX(value)",
        Aggregation::Count => "COUNT(*)",
    }
}
