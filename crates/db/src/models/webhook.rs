//! Webhook target models.

use herald_core::types::{DbId, TenantId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Event-type subscription that matches every event.
pub const WILDCARD_EVENT: &str = "*";

/// A row from the `webhooks` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Webhook {
    pub id: DbId,
    pub tenant_id: TenantId,
    pub name: String,
    pub url: String,
    #[serde(skip_serializing)]
    pub secret: String,
    pub event_types: serde_json::Value,
    pub enabled: bool,
    pub last_triggered_at: Option<Timestamp>,
    pub failure_count: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Webhook {
    /// Whether this webhook subscribed to `event_type` (directly or via `*`).
    pub fn is_subscribed_to(&self, event_type: &str) -> bool {
        self.event_types
            .as_array()
            .is_some_and(|types| {
                types
                    .iter()
                    .filter_map(|t| t.as_str())
                    .any(|t| t == event_type || t == WILDCARD_EVENT)
            })
    }
}

/// DTO for creating a new webhook.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateWebhook {
    pub name: String,
    pub url: String,
    pub secret: String,
    /// Event type names to subscribe to; `"*"` subscribes to all.
    pub event_types: Vec<String>,
    pub enabled: Option<bool>,
}
