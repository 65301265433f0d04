//! Direct tenant events.
//!
//! A [`TenantEvent`] is fanned out by [`EventEmitter::emit`] to every enabled
//! webhook of the tenant subscribed to its type. Nothing is sent inline: each
//! subscriber gets its own delivery queue entry.

use chrono::Utc;
use herald_core::types::{DbId, TenantId, Timestamp};
use herald_db::models::delivery::NewDelivery;
use herald_db::repositories::{DeliveryQueueRepo, WebhookRepo};
use herald_db::DbPool;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// TenantEvent
// ---------------------------------------------------------------------------

/// The JSON envelope POSTed to webhooks.
///
/// Alerts use the same envelope with `type = "alert.triggered"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TenantEvent {
    /// Dot-separated event name, e.g. `"report.ready"`.
    #[serde(rename = "type")]
    pub event_type: String,

    pub tenant_id: TenantId,

    /// Event-specific body.
    pub data: serde_json::Value,

    /// When the event was created (UTC).
    pub timestamp: Timestamp,
}

impl TenantEvent {
    /// Create an event with an empty `data` object, stamped now.
    pub fn new(event_type: impl Into<String>, tenant_id: TenantId) -> Self {
        Self {
            event_type: event_type.into(),
            tenant_id,
            data: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    /// Set the event body.
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Override the creation time.
    pub fn at(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// The stored queue payload.
    pub fn to_payload(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

// ---------------------------------------------------------------------------
// EventEmitter
// ---------------------------------------------------------------------------

/// Error type for [`EventEmitter::emit`].
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    #[error("event type must not be empty")]
    EmptyEventType,

    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Queues tenant events for every subscribed webhook.
#[derive(Clone)]
pub struct EventEmitter {
    pool: DbPool,
    max_attempts: Option<i16>,
}

impl EventEmitter {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            max_attempts: None,
        }
    }

    /// Override the per-entry attempt limit (queue default otherwise).
    pub fn with_max_attempts(mut self, max_attempts: i16) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Enqueue `event` once per enabled webhook subscribed to its type.
    ///
    /// Returns the ids of the created queue entries; empty when nobody is
    /// subscribed.
    pub async fn emit(&self, event: &TenantEvent) -> Result<Vec<DbId>, EmitError> {
        if event.event_type.trim().is_empty() {
            return Err(EmitError::EmptyEventType);
        }
        let payload = event.to_payload()?;

        let webhooks =
            WebhookRepo::list_subscribed(&self.pool, event.tenant_id, &event.event_type).await?;

        let mut queued = Vec::with_capacity(webhooks.len());
        for webhook in &webhooks {
            let entry = DeliveryQueueRepo::enqueue(
                &self.pool,
                &NewDelivery {
                    tenant_id: event.tenant_id,
                    webhook_id: webhook.id,
                    event_type: event.event_type.clone(),
                    payload: payload.clone(),
                    max_attempts: self.max_attempts,
                },
            )
            .await?;
            queued.push(entry.id);
        }

        tracing::debug!(
            tenant_id = event.tenant_id,
            event_type = %event.event_type,
            subscribers = queued.len(),
            "Tenant event queued"
        );

        Ok(queued)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
