//! Postgres-backed [`MetricsSource`].

use async_trait::async_trait;
use herald_core::alert::Aggregation;
use herald_core::alert_engine::{MetricError, MetricsSource};
use herald_core::types::{TenantId, Timestamp};

use crate::repositories::MetricSampleRepo;
use crate::DbPool;

/// Answers metric lookups by aggregating `metric_samples`.
#[derive(Clone)]
pub struct PgMetricsSource {
    pool: DbPool,
}

impl PgMetricsSource {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetricsSource for PgMetricsSource {
    async fn get_metric_value(
        &self,
        tenant_id: TenantId,
        metric_name: &str,
        aggregation: Aggregation,
        window_start: Timestamp,
        window_end: Timestamp,
    ) -> Result<f64, MetricError> {
        MetricSampleRepo::aggregate(
            &self.pool,
            tenant_id,
            metric_name,
            aggregation,
            window_start,
            window_end,
        )
        .await
        .map_err(|e| MetricError::new(metric_name, e))
    }
}
