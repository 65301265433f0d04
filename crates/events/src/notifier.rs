//! Alert notification fan-out.
//!
//! [`Notifier::send`] turns one triggered alert into one delivery queue entry
//! per webhook channel. Every channel is attempted; failures are collected
//! and reported together.

use herald_core::alert::Channel;
use herald_core::types::{DbId, Timestamp};
use herald_db::models::alert::Alert;
use herald_db::models::delivery::NewDelivery;
use herald_db::repositories::{DeliveryQueueRepo, WebhookRepo};
use herald_db::DbPool;
use serde_json::json;

use crate::emitter::TenantEvent;

/// Event type of alert notifications.
pub const ALERT_TRIGGERED: &str = "alert.triggered";

// ---------------------------------------------------------------------------
// Trigger record
// ---------------------------------------------------------------------------

/// The trigger being announced.
///
/// `history_id` is `None` when the history row could not be saved; the
/// notification still goes out.
#[derive(Debug, Clone, Copy)]
pub struct TriggerRecord<'a> {
    pub history_id: Option<DbId>,
    pub triggered_at: Timestamp,
    pub metadata: &'a serde_json::Value,
}

/// Build the `alert.triggered` envelope for `alert`.
pub fn alert_event(alert: &Alert, trigger: &TriggerRecord<'_>) -> TenantEvent {
    TenantEvent::new(ALERT_TRIGGERED, alert.tenant_id)
        .with_data(json!({
            "alert": {
                "id": alert.id,
                "name": alert.name,
                "severity": alert.severity,
            },
            "history": {
                "id": trigger.history_id,
                "triggered_at": trigger.triggered_at,
                "metadata": trigger.metadata,
            },
        }))
        .at(trigger.triggered_at)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single channel could not be queued.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("webhook {0} not found")]
    WebhookNotFound(DbId),

    #[error("webhook {0} is disabled")]
    WebhookDisabled(DbId),

    #[error("unsupported channel type")]
    Unsupported,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Error type for [`Notifier::send`].
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// The alert's `channels` column could not be decoded.
    #[error("invalid channels: {0}")]
    InvalidChannels(#[from] herald_core::error::CoreError),

    /// The payload could not be encoded.
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    /// Some channels failed. The others were queued.
    #[error("{failed} of {total} channels failed")]
    ChannelsFailed {
        failed: usize,
        total: usize,
        failures: Vec<(Channel, ChannelError)>,
    },
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// Queues alert notifications on the alert's channels.
#[derive(Clone)]
pub struct Notifier {
    pool: DbPool,
}

impl Notifier {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Queue one delivery per channel of `alert`.
    ///
    /// Returns the ids of the queued entries when every channel succeeded.
    /// Otherwise the successful channels stay queued and the error lists the
    /// ones that failed.
    pub async fn send(
        &self,
        alert: &Alert,
        trigger: &TriggerRecord<'_>,
    ) -> Result<Vec<DbId>, NotifyError> {
        let channels = alert.channels()?;
        let payload = alert_event(alert, trigger).to_payload()?;

        let mut queued = Vec::with_capacity(channels.len());
        let mut failures = Vec::new();

        for channel in &channels {
            match self.dispatch(alert, channel, &payload).await {
                Ok(id) => queued.push(id),
                Err(e) => {
                    tracing::warn!(
                        alert_id = alert.id,
                        channel = channel.kind(),
                        error = %e,
                        "Alert channel skipped"
                    );
                    failures.push((channel.clone(), e));
                }
            }
        }

        if !failures.is_empty() {
            return Err(NotifyError::ChannelsFailed {
                failed: failures.len(),
                total: channels.len(),
                failures,
            });
        }
        Ok(queued)
    }

    async fn dispatch(
        &self,
        alert: &Alert,
        channel: &Channel,
        payload: &serde_json::Value,
    ) -> Result<DbId, ChannelError> {
        let webhook_id = match channel {
            Channel::Webhook { webhook_id } => *webhook_id,
            Channel::Unsupported => return Err(ChannelError::Unsupported),
        };

        let webhook = WebhookRepo::find_for_tenant(&self.pool, alert.tenant_id, webhook_id)
            .await?
            .ok_or(ChannelError::WebhookNotFound(webhook_id))?;
        if !webhook.enabled {
            return Err(ChannelError::WebhookDisabled(webhook_id));
        }

        let entry = DeliveryQueueRepo::enqueue(
            &self.pool,
            &NewDelivery {
                tenant_id: alert.tenant_id,
                webhook_id,
                event_type: ALERT_TRIGGERED.to_string(),
                payload: payload.clone(),
                max_attempts: None,
            },
        )
        .await?;
        Ok(entry.id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
