//! Background loop draining the delivery queue.
//!
//! Each tick releases stale claims, claims a batch of due entries and
//! attempts each one once. Outcomes are written back with status-guarded
//! updates, so a second worker on the same queue never double-applies one.

use std::time::Duration;

use herald_core::delivery::{RetryDecision, RetryPolicy};
use herald_core::types::DbId;
use herald_db::models::delivery::DeliveryQueueEntry;
use herald_db::repositories::{DeliveryQueueRepo, WebhookRepo};
use herald_db::DbPool;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::webhook::{OutboundRequest, WebhookError, WebhookSender, DEFAULT_REQUEST_TIMEOUT};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Tuning for [`DeliveryWorker`].
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    pub tick_interval: Duration,
    pub batch_size: i64,
    pub request_timeout: Duration,
    pub retry_policy: RetryPolicy,
    /// `processing` entries untouched this long are handed back to `pending`.
    pub stale_after: Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            batch_size: 10,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry_policy: RetryPolicy::default(),
            stale_after: Duration::from_secs(300),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Why one delivery attempt failed. Always counted against the entry.
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    #[error("webhook {0} no longer exists")]
    WebhookMissing(DbId),

    #[error("webhook {0} is disabled")]
    WebhookDisabled(DbId),

    #[error("failed to encode payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Counts for one worker tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickSummary {
    pub released: u64,
    pub claimed: usize,
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
    /// Entries whose claim was released before the outcome was written.
    pub claim_lost: usize,
}

// ---------------------------------------------------------------------------
// DeliveryWorker
// ---------------------------------------------------------------------------

/// Drains the delivery queue, one signed POST per claimed entry.
pub struct DeliveryWorker {
    pool: DbPool,
    sender: WebhookSender,
    config: DeliveryConfig,
}

impl DeliveryWorker {
    pub fn new(pool: DbPool, config: DeliveryConfig) -> Result<Self, WebhookError> {
        let sender = WebhookSender::new(config.request_timeout)?;
        Ok(Self {
            pool,
            sender,
            config,
        })
    }

    /// Run the worker loop until `cancel` fires.
    ///
    /// A tick in progress is always finished before the loop exits. A tick
    /// running longer than the interval delays the next one.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            interval_secs = self.config.tick_interval.as_secs(),
            batch_size = self.config.batch_size,
            "Delivery worker started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Delivery worker cancelled");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        tracing::error!(error = %e, "Delivery tick failed");
                    }
                }
            }
        }
    }

    /// One pass over the queue.
    pub async fn tick(&self) -> Result<TickSummary, sqlx::Error> {
        let mut summary = TickSummary {
            released: DeliveryQueueRepo::release_stale(&self.pool, self.config.stale_after)
                .await?,
            ..Default::default()
        };
        if summary.released > 0 {
            tracing::warn!(count = summary.released, "Released stale delivery claims");
        }

        let entries = DeliveryQueueRepo::claim_due(&self.pool, self.config.batch_size).await?;
        summary.claimed = entries.len();

        for entry in &entries {
            match self.process(entry).await {
                Ok(Outcome::Delivered) => summary.delivered += 1,
                Ok(Outcome::Retrying) => summary.retried += 1,
                Ok(Outcome::Failed) => summary.failed += 1,
                Ok(Outcome::ClaimLost) => summary.claim_lost += 1,
                Err(e) => {
                    // Outcome unknown; a claim left in `processing` goes
                    // back to `pending` through stale release.
                    tracing::error!(
                        delivery_id = entry.id,
                        error = %e,
                        "Failed to record delivery outcome"
                    );
                }
            }
        }

        if summary.claimed > 0 {
            tracing::info!(
                claimed = summary.claimed,
                delivered = summary.delivered,
                retried = summary.retried,
                failed = summary.failed,
                claim_lost = summary.claim_lost,
                "Delivery tick complete"
            );
        } else {
            tracing::debug!("No deliveries due");
        }
        Ok(summary)
    }

    /// Attempt one claimed entry and persist the outcome.
    async fn process(&self, entry: &DeliveryQueueEntry) -> Result<Outcome, sqlx::Error> {
        let error = match self.attempt(entry).await {
            Ok(status) => {
                if !DeliveryQueueRepo::mark_delivered(&self.pool, entry.id).await? {
                    tracing::warn!(
                        delivery_id = entry.id,
                        webhook_id = entry.webhook_id,
                        status,
                        "Delivered entry was no longer claimed"
                    );
                    return Ok(Outcome::ClaimLost);
                }
                if let Err(e) = WebhookRepo::touch_triggered(&self.pool, entry.webhook_id).await {
                    tracing::warn!(
                        delivery_id = entry.id,
                        webhook_id = entry.webhook_id,
                        error = %e,
                        "Failed to update webhook last_triggered_at"
                    );
                }
                tracing::info!(
                    delivery_id = entry.id,
                    webhook_id = entry.webhook_id,
                    status,
                    "Webhook delivered"
                );
                return Ok(Outcome::Delivered);
            }
            Err(e) => e,
        };

        let decision = self
            .config
            .retry_policy
            .after_failure(entry.attempts, entry.max_attempts);
        let message = error.to_string();
        if !DeliveryQueueRepo::record_failure(&self.pool, entry.id, &decision, &message).await? {
            tracing::warn!(
                delivery_id = entry.id,
                webhook_id = entry.webhook_id,
                error = %message,
                "Failed entry was no longer claimed"
            );
            return Ok(Outcome::ClaimLost);
        }

        match decision {
            RetryDecision::Retry { attempts, delay } => {
                tracing::warn!(
                    delivery_id = entry.id,
                    webhook_id = entry.webhook_id,
                    attempts,
                    retry_in_secs = delay.as_secs(),
                    error = %message,
                    "Webhook delivery failed, will retry"
                );
                Ok(Outcome::Retrying)
            }
            RetryDecision::GiveUp { attempts } => {
                WebhookRepo::increment_failure_count(&self.pool, entry.webhook_id).await?;
                tracing::error!(
                    delivery_id = entry.id,
                    webhook_id = entry.webhook_id,
                    attempts,
                    error = %message,
                    "Webhook delivery failed permanently"
                );
                Ok(Outcome::Failed)
            }
        }
    }

    async fn attempt(&self, entry: &DeliveryQueueEntry) -> Result<u16, AttemptError> {
        let webhook = WebhookRepo::find_by_id(&self.pool, entry.webhook_id)
            .await?
            .filter(|w| w.tenant_id == entry.tenant_id)
            .ok_or(AttemptError::WebhookMissing(entry.webhook_id))?;
        if !webhook.enabled {
            return Err(AttemptError::WebhookDisabled(webhook.id));
        }

        let body = serde_json::to_vec(&entry.payload)?;
        let status = self
            .sender
            .send(&OutboundRequest {
                url: &webhook.url,
                secret: &webhook.secret,
                event_type: &entry.event_type,
                delivery_id: entry.id,
                body: &body,
            })
            .await?;
        Ok(status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Delivered,
    Retrying,
    Failed,
    /// The entry left `processing` mid-attempt; nothing was written.
    ClaimLost,
}
