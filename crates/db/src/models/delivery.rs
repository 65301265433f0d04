//! Delivery queue models.

use herald_core::delivery::DeliveryStatus;
use herald_core::error::CoreError;
use herald_core::types::{DbId, TenantId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `delivery_queue` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DeliveryQueueEntry {
    pub id: DbId,
    pub tenant_id: TenantId,
    pub webhook_id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub attempts: i16,
    pub max_attempts: i16,
    pub next_retry_at: Timestamp,
    pub status: String,
    pub last_error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl DeliveryQueueEntry {
    pub fn status(&self) -> Result<DeliveryStatus, CoreError> {
        self.status.parse()
    }
}

/// Insert payload for a new queue entry.
#[derive(Debug, Clone)]
pub struct NewDelivery {
    pub tenant_id: TenantId,
    pub webhook_id: DbId,
    pub event_type: String,
    pub payload: serde_json::Value,
    /// Defaults to [`herald_core::delivery::DEFAULT_MAX_ATTEMPTS`].
    pub max_attempts: Option<i16>,
}

/// Row count per status, for operator tooling.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}
