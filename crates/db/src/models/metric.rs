//! Metric sample model.

use herald_core::types::{DbId, TenantId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `metric_samples` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MetricSample {
    pub id: DbId,
    pub tenant_id: TenantId,
    pub metric_name: String,
    pub value: f64,
    pub recorded_at: Timestamp,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}
